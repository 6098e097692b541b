//! `keymig convert`: legacy record → validated document on disk.
//!
//! The legacy snapshot `{target}/{key}-old.json` is written before the record
//! is parsed, so it survives shape, transformation and validation failures. The
//! document `{target}/{key}-new.json` is written only once it validates.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use serde_json::Value;

use key_migrate_core::transform::{convert_to_document, parse_legacy_key, ConvertOptions};

use crate::config::{Config, KeyEntry};
use crate::error::{batch_exit_code, MigrationError};
use crate::legacy::LegacyClient;
use crate::validate::ValidationGate;

/// `{target}/{key}-old.json`, lower-cased.
pub fn legacy_snapshot_path(target: &Path, key_web: &str) -> PathBuf {
    target.join(format!("{}-old.json", key_web.to_lowercase()))
}

/// `{target}/{key}-new.json`, lower-cased.
pub fn document_path(target: &Path, key_web: &str) -> PathBuf {
    target.join(format!("{}-new.json", key_web.to_lowercase()))
}

async fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<(), MigrationError> {
    let body = serde_json::to_string_pretty(value)
        .context("Failed to serialize JSON")
        .map_err(MigrationError::Io)?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
        .map_err(MigrationError::Io)
}

/// Fetch one key from the legacy API and convert it.
pub async fn convert_key(
    config: &Config,
    gate: &ValidationGate,
    client: &LegacyClient,
    entry: &KeyEntry,
) -> Result<PathBuf, MigrationError> {
    info!(stage = "convert", key_web = %entry.key_web, "fetching legacy record");
    let raw = client
        .fetch(&entry.key_web)
        .await
        .map_err(|reason| MigrationError::LegacyFetch {
            key_web: entry.key_web.clone(),
            reason,
        })?;
    convert_record(config, gate, entry, raw).await
}

/// Convert an already fetched legacy record and write both artifacts.
pub async fn convert_record(
    config: &Config,
    gate: &ValidationGate,
    entry: &KeyEntry,
    raw: Value,
) -> Result<PathBuf, MigrationError> {
    let target = &config.paths.target;
    tokio::fs::create_dir_all(target)
        .await
        .with_context(|| format!("Failed to create {}", target.display()))
        .map_err(MigrationError::Io)?;

    write_json(&legacy_snapshot_path(target, &entry.key_web), &raw).await?;

    let transformation = |source| MigrationError::Transformation {
        key_web: entry.key_web.clone(),
        source,
    };
    let key = parse_legacy_key(&raw).map_err(transformation)?;

    let options = ConvertOptions::new(
        &entry.language,
        &config.defaults.license,
        &config.defaults.creator,
        gate.schema_uri().map(str::to_string),
    );
    let document = convert_to_document(&key, &options).map_err(transformation)?;

    let value = serde_json::to_value(&document)
        .context("Failed to serialize document")
        .map_err(MigrationError::Io)?;
    gate.validate(&entry.key_web, &value)
        .map_err(|errors| MigrationError::Validation {
            key_web: entry.key_web.clone(),
            errors,
        })?;

    let path = document_path(target, &entry.key_web);
    write_json(&path, &value).await?;
    info!(
        stage = "convert",
        key_web = %entry.key_web,
        taxa = document.taxa.len(),
        characters = document.characters.len(),
        statements = document.statements.len(),
        media = document.media_elements.len(),
        path = %path.display(),
        "document written"
    );
    Ok(path)
}

/// CLI entry point: converts the selected keys one after another.
///
/// Returns the batch exit code; a failing key never stops its siblings.
pub async fn run_convert(config: &Config, selector: Option<&str>) -> Result<i32, MigrationError> {
    let keys = config.select_keys(selector).map_err(MigrationError::Config)?;
    let gate = ValidationGate::from_file(&config.paths.schema).map_err(MigrationError::Config)?;
    let client = LegacyClient::new(&config.legacy).map_err(MigrationError::Config)?;

    let mut results = Vec::with_capacity(keys.len());
    for entry in &keys {
        let result = convert_key(config, &gate, &client, entry).await;
        match &result {
            Ok(path) => println!("{:<24} OK      {}", entry.key_web, path.display()),
            Err(e) => {
                error!(stage = e.stage(), key_web = %entry.key_web, error = %e, "conversion failed");
                println!("{:<24} FAILED  {}", entry.key_web, e);
            }
        }
        results.push(result);
    }
    Ok(batch_exit_code(&results))
}
