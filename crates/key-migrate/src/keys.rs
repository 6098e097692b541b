use anyhow::Result;

use crate::config::Config;
use crate::convert::{document_path, legacy_snapshot_path};

/// Status of one configured key's artifacts on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStatus {
    pub key_web: String,
    pub language: String,
    pub legacy_snapshot: bool,
    pub document: bool,
}

pub fn key_statuses(config: &Config) -> Vec<KeyStatus> {
    let target = &config.paths.target;
    config
        .keys
        .iter()
        .map(|k| KeyStatus {
            key_web: k.key_web.clone(),
            language: k.language.clone(),
            legacy_snapshot: legacy_snapshot_path(target, &k.key_web).exists(),
            document: document_path(target, &k.key_web).exists(),
        })
        .collect()
}

pub fn list_keys(config: &Config) -> Result<()> {
    println!("{:<24} {:<6} {:<8} NEW", "KEY", "LANG", "OLD");
    for status in key_statuses(config) {
        println!(
            "{:<24} {:<6} {:<8} {}",
            status.key_web,
            status.language,
            yes_no(status.legacy_snapshot),
            yes_no(status.document)
        );
    }
    Ok(())
}

fn yes_no(present: bool) -> &'static str {
    if present {
        "yes"
    } else {
        "no"
    }
}
