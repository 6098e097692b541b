//! `keymig insert`: validated document → persisted key with media.
//!
//! Order of operations for one key:
//!
//! 1. Read `{target}/{key}-new.json` and validate it again.
//! 2. Create the Revision, the Key and their link.
//! 3. Materialize taxa, characters and states; remap ids.
//! 4. Run the key, taxon and state media pipelines concurrently.
//! 5. Create KeyInfo and the key language for the primary language.
//! 6. Store `{taxa, characters, statements}` and the media manifest on the
//!    Revision.
//!
//! Every create is recorded in a [`Ledger`]. If any step fails, the ledger
//! is rolled back newest first and `{media_root}/keys/{keyId}` is removed.

use anyhow::Context;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use key_migrate_core::error::MaterializeError;
use key_migrate_core::ledger::Ledger;
use key_migrate_core::materialize::materialize;
use key_migrate_core::models::{flatten_taxa, Document};
use key_migrate_core::store::{EntityRef, EntityStore, KeyInfo, NewKey, NewRevision};

use crate::config::Config;
use crate::convert::document_path;
use crate::db;
use crate::error::{batch_exit_code, MigrationError};
use crate::fetch::{HttpMediaSource, MediaSource, RetryingFetcher};
use crate::media::{
    apply_outcomes, key_media_dir, summarize, MediaOwner, MediaPipeline, SkippedMedia,
};
use crate::sqlite_store::SqliteStore;
use crate::thumbnail::ThumbnailSpec;
use crate::validate::ValidationGate;

pub const KEY_STATUS: &str = "PRIVATE";
pub const REVISION_STATUS: &str = "ACCEPTED";

/// Summary of one successful insert.
#[derive(Debug, Clone)]
pub struct InsertReport {
    pub key_id: i64,
    pub revision_id: i64,
    pub taxa: usize,
    pub characters: usize,
    pub statements: usize,
    pub media_linked: usize,
    /// Media that could not be fetched; the key was inserted without them.
    pub skipped_media: Vec<SkippedMedia>,
}

/// Collaborators of an insert run.
pub struct Inserter<'a> {
    pub config: &'a Config,
    pub gate: &'a ValidationGate,
    pub store: &'a dyn EntityStore,
    pub source: &'a dyn MediaSource,
}

fn store_error(stage: &'static str) -> impl FnOnce(anyhow::Error) -> MigrationError {
    move |first| {
        MigrationError::Materialization(MaterializeError::Store {
            stage,
            attempted: 1,
            failed: 1,
            first,
        })
    }
}

fn version_string(version: &Value) -> Option<String> {
    match version {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl<'a> Inserter<'a> {
    /// Load and re-validate the persisted document of `key_web`.
    pub async fn load_document(&self, key_web: &str) -> Result<Document, MigrationError> {
        let path = document_path(&self.config.paths.target, key_web);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Could not find document for key '{}': {}", key_web, path.display()))
            .map_err(MigrationError::Io)?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
            .map_err(MigrationError::Io)?;

        self.gate
            .validate(key_web, &value)
            .map_err(|errors| MigrationError::Validation {
                key_web: key_web.to_string(),
                errors,
            })?;

        serde_json::from_value(value).map_err(|e| MigrationError::Validation {
            key_web: key_web.to_string(),
            errors: vec![e.to_string()],
        })
    }

    /// Insert one key. Nothing is left behind on failure.
    pub async fn insert_key(&self, key_web: &str) -> Result<InsertReport, MigrationError> {
        let document = self.load_document(key_web).await?;
        self.insert_document(key_web, document).await
    }

    pub async fn insert_document(
        &self,
        key_web: &str,
        mut document: Document,
    ) -> Result<InsertReport, MigrationError> {
        let ledger = Ledger::new();
        let mut key_id = None;

        match self.persist(&ledger, &mut key_id, &mut document).await {
            Ok(report) => {
                info!(
                    stage = "insert",
                    key_web,
                    key_id = report.key_id,
                    skipped_media = report.skipped_media.len(),
                    "key inserted"
                );
                Ok(report)
            }
            Err(e) => {
                error!(stage = e.stage(), key_web, ?key_id, error = %e, "insert failed, rolling back");
                ledger.rollback(self.store).await;
                if let Some(key_id) = key_id {
                    let dir = key_media_dir(&self.config.paths.media_root, key_id);
                    match tokio::fs::remove_dir_all(&dir).await {
                        Ok(()) => {}
                        Err(io) if io.kind() == std::io::ErrorKind::NotFound => {}
                        Err(io) => {
                            warn!(stage = "rollback", key_id, dir = %dir.display(), error = %io, "could not remove media directory")
                        }
                    }
                }
                Err(e)
            }
        }
    }

    async fn persist(
        &self,
        ledger: &Ledger,
        key_slot: &mut Option<i64>,
        document: &mut Document,
    ) -> Result<InsertReport, MigrationError> {
        let defaults = &self.config.defaults;
        let store = self.store;

        let revision_id = store
            .create_revision(&NewRevision {
                note: defaults.revision_note.clone(),
                created_by: defaults.created_by.clone(),
                status: REVISION_STATUS.to_string(),
            })
            .await
            .map_err(store_error("revision"))?;
        ledger.record(EntityRef::Revision(revision_id));

        let key_id = store
            .create_key(&NewKey {
                revision_id,
                workgroup_id: defaults.workgroup_id,
                created_by: defaults.created_by.clone(),
                status: KEY_STATUS.to_string(),
                version: version_string(&document.version),
            })
            .await
            .map_err(store_error("key"))?;
        ledger.record(EntityRef::Key(key_id));
        *key_slot = Some(key_id);

        store
            .link_revision(key_id, revision_id)
            .await
            .map_err(store_error("key_revision"))?;
        ledger.record(EntityRef::KeyRevision {
            key_id,
            revision_id,
        });

        let materialized = materialize(
            store,
            ledger,
            key_id,
            document,
            self.config.materialize.concurrency,
        )
        .await?;

        let media = &self.config.media;
        let fetcher = RetryingFetcher::new(
            self.source,
            store,
            ThumbnailSpec {
                width: media.thumbnail_width,
                height: media.thumbnail_height,
                quality: media.thumbnail_quality,
            },
        );
        let pipeline = MediaPipeline::new(
            store,
            ledger,
            fetcher,
            &self.config.paths.media_root,
            &defaults.created_by,
            media.concurrency,
        );
        let elements = document.media_elements.clone();
        let (key_media, taxa_media, state_media) = futures::join!(
            pipeline.run(key_id, MediaOwner::Key, &materialized.key_media, &elements),
            pipeline.run(key_id, MediaOwner::Taxon, &materialized.taxa_media, &elements),
            pipeline.run(key_id, MediaOwner::State, &materialized.state_media, &elements),
        );
        let (key_media, taxa_media, state_media) = (key_media?, taxa_media?, state_media?);

        let mut skipped_media = summarize(key_id, MediaOwner::Key, &key_media);
        skipped_media.extend(summarize(key_id, MediaOwner::Taxon, &taxa_media));
        skipped_media.extend(summarize(key_id, MediaOwner::State, &state_media));
        let media_linked = key_media.len() + taxa_media.len() + state_media.len() - skipped_media.len();

        let entity_outcomes: Vec<_> = taxa_media.into_iter().chain(state_media).collect();
        let manifest = apply_outcomes(document, &materialized.revision_media, &entity_outcomes);

        let language = document.primary_language().unwrap_or_default().to_string();
        store
            .create_key_info(&KeyInfo {
                key_id,
                language_code: language.clone(),
                title: document.title.get(&language).cloned(),
                description: document.description.get(&language).cloned(),
            })
            .await
            .map_err(store_error("key_info"))?;
        ledger.record(EntityRef::KeyInfo {
            key_id,
            language_code: language.clone(),
        });
        store
            .create_key_language(key_id, &language)
            .await
            .map_err(store_error("key_language"))?;
        ledger.record(EntityRef::KeyLanguage {
            key_id,
            language_code: language,
        });

        let content = json!({
            "taxa": document.taxa,
            "characters": document.characters,
            "statements": document.statements,
        });
        store
            .update_revision(revision_id, &content, &json!({ "mediaElements": manifest }))
            .await
            .map_err(store_error("revision"))?;

        Ok(InsertReport {
            key_id,
            revision_id,
            taxa: flatten_taxa(&document.taxa).len(),
            characters: document.characters.len(),
            statements: document.statements.len(),
            media_linked,
            skipped_media,
        })
    }
}

/// CLI entry point: inserts the selected keys one after another.
pub async fn run_insert(config: &Config, selector: Option<&str>) -> Result<i32, MigrationError> {
    let keys = config.select_keys(selector).map_err(MigrationError::Config)?;
    let gate = ValidationGate::from_file(&config.paths.schema).map_err(MigrationError::Config)?;
    let source = HttpMediaSource::new(std::time::Duration::from_secs(config.media.fetch_timeout_secs))
        .map_err(MigrationError::Config)?;
    let pool = db::connect(config).await.map_err(MigrationError::Io)?;
    let store = SqliteStore::new(pool);

    let inserter = Inserter {
        config,
        gate: &gate,
        store: &store,
        source: &source,
    };

    let mut results = Vec::with_capacity(keys.len());
    for entry in &keys {
        let result = inserter.insert_key(&entry.key_web).await;
        match &result {
            Ok(report) => {
                println!(
                    "{:<24} OK      key {} (taxa {}, characters {}, statements {}, media {})",
                    entry.key_web,
                    report.key_id,
                    report.taxa,
                    report.characters,
                    report.statements,
                    report.media_linked
                );
                if !report.skipped_media.is_empty() {
                    println!("{:<24}         skipped media: {}", "", report.skipped_media.len());
                }
                for skipped in &report.skipped_media {
                    warn!(
                        stage = "media",
                        key_web = %entry.key_web,
                        owner = %skipped.owner,
                        entity_id = %skipped.entity_id,
                        media_id = %skipped.media_id,
                        url = skipped.url.as_deref().unwrap_or("-"),
                        reason = %skipped.reason,
                        "media skipped"
                    );
                }
            }
            Err(e) => println!("{:<24} FAILED  {}", entry.key_web, e),
        }
        results.push(result);
    }

    store.pool().close().await;
    Ok(batch_exit_code(&results))
}
