//! Media pipeline: one persisted Media row, file and thumbnail per
//! media association of a materialized key.
//!
//! Destinations under the media root:
//!
//! | Owner | Directory |
//! |-------|-----------|
//! | key | `keys/{keyId}` |
//! | taxon | `keys/{keyId}/taxa/{taxonId}` |
//! | character state | `keys/{keyId}/characters/{characterId}/states/{stateId}` |
//!
//! Files are named `{mediaId}.{ext}` and `{mediaId}-thumbnail.{ext}`.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use key_migrate_core::error::MaterializeError;
use key_migrate_core::ledger::Ledger;
use key_migrate_core::materialize::{join_results, MediaAssociation, RevisionMedia};
use key_migrate_core::models::{for_each_taxon_mut, Document, MediaElement, MediaLinks, Taxon};
use key_migrate_core::store::{EntityRef, EntityStore, MediaFiles, NewMedia};

use crate::fetch::{FetchOutcome, RetryingFetcher};
use crate::thumbnail::ImageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaOwner {
    Key,
    Taxon,
    State,
}

impl fmt::Display for MediaOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaOwner::Key => "key",
            MediaOwner::Taxon => "taxon",
            MediaOwner::State => "state",
        })
    }
}

/// A media association that produced no persisted Media row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMedia {
    pub owner: MediaOwner,
    pub entity_id: String,
    pub media_id: String,
    pub url: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    Linked {
        owner: MediaOwner,
        association: MediaAssociation,
        media_id: i64,
    },
    Skipped(SkippedMedia),
}

/// `{media_root}/keys/{key_id}`.
pub fn key_media_dir(media_root: &Path, key_id: i64) -> PathBuf {
    media_root.join("keys").join(key_id.to_string())
}

pub fn destination(media_root: &Path, key_id: i64, owner: MediaOwner, association: &MediaAssociation) -> PathBuf {
    let key_dir = key_media_dir(media_root, key_id);
    match owner {
        MediaOwner::Key => key_dir,
        MediaOwner::Taxon => key_dir.join("taxa").join(&association.entity_id),
        MediaOwner::State => key_dir
            .join("characters")
            .join(association.character_id.as_deref().unwrap_or_default())
            .join("states")
            .join(&association.entity_id),
    }
}

pub struct MediaPipeline<'a> {
    store: &'a dyn EntityStore,
    ledger: &'a Ledger,
    fetcher: RetryingFetcher<'a>,
    media_root: &'a Path,
    created_by: &'a str,
    concurrency: usize,
}

impl<'a> MediaPipeline<'a> {
    pub fn new(
        store: &'a dyn EntityStore,
        ledger: &'a Ledger,
        fetcher: RetryingFetcher<'a>,
        media_root: &'a Path,
        created_by: &'a str,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            ledger,
            fetcher,
            media_root,
            created_by,
            concurrency: concurrency.max(1),
        }
    }

    /// Process every association of one owner kind.
    ///
    /// All associations run to completion; any non-network failure fails
    /// the whole call.
    pub async fn run(
        &self,
        key_id: i64,
        owner: MediaOwner,
        associations: &[MediaAssociation],
        elements: &[MediaElement],
    ) -> Result<Vec<MediaOutcome>, MaterializeError> {
        let results = stream::iter(associations)
            .map(|association| self.process(key_id, owner, association, elements))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;
        join_results("media", results)
    }

    async fn process(
        &self,
        key_id: i64,
        owner: MediaOwner,
        association: &MediaAssociation,
        elements: &[MediaElement],
    ) -> Result<MediaOutcome> {
        let Some(element) = elements.iter().find(|e| e.id == association.media_id) else {
            warn!(
                stage = "media",
                key_id,
                %owner,
                media_id = %association.media_id,
                "no media element for reference, skipping"
            );
            return Ok(MediaOutcome::Skipped(SkippedMedia {
                owner,
                entity_id: association.entity_id.clone(),
                media_id: association.media_id.clone(),
                url: None,
                reason: "no matching media element".to_string(),
            }));
        };

        let url = element.url();
        let kind = ImageKind::from_url(url);
        let dir = destination(self.media_root, key_id, owner, association);

        let media_id = self
            .store
            .create_media(&NewMedia {
                mime_type: kind.mime().to_string(),
                created_by: self.created_by.to_string(),
            })
            .await?;
        self.ledger.record(EntityRef::Media(media_id));

        let file_name = format!("{}.{}", media_id, kind.extension());
        let thumbnail_name = format!("{}-thumbnail.{}", media_id, kind.extension());
        self.store
            .update_media_files(
                media_id,
                &MediaFiles {
                    file_path: dir.join(&file_name).display().to_string(),
                    thumbnail_path: dir.join(&thumbnail_name).display().to_string(),
                    file_name: file_name.clone(),
                    thumbnail_name,
                },
            )
            .await?;

        match self
            .fetcher
            .fetch(media_id, url, &file_name, &dir)
            .await
            .with_context(|| format!("media {} ({})", association.media_id, url))?
        {
            FetchOutcome::Skipped { reason } => {
                return Ok(MediaOutcome::Skipped(SkippedMedia {
                    owner,
                    entity_id: association.entity_id.clone(),
                    media_id: association.media_id.clone(),
                    url: Some(url.to_string()),
                    reason,
                }));
            }
            FetchOutcome::Fetched => {}
        }

        if owner == MediaOwner::Key {
            self.store.create_key_media(key_id, media_id).await?;
            self.ledger.record(EntityRef::KeyMedia { key_id, media_id });
        }

        Ok(MediaOutcome::Linked {
            owner,
            association: association.clone(),
            media_id,
        })
    }
}

/// Add `media_id` to an entity's links.
///
/// Materialization clears legacy links, so an entity with one association
/// ends up with a one-element list. An entity with several associations
/// collects all of them instead of keeping only the last.
fn attach(links: &mut Option<MediaLinks>, media_id: String) {
    let mut ids = links.take().map(|l| l.to_vec()).unwrap_or_default();
    ids.push(media_id);
    *links = Some(MediaLinks::Many(ids));
}

/// Rewire a materialized document and its revision media log with the
/// outcome of the pipeline runs.
///
/// Linked taxa and states get the new Media id appended to their `media`
/// list. Each revision media entry is matched to one outcome by its legacy
/// id: linked entries take the new id, skipped entries are dropped.
pub fn apply_outcomes(
    document: &mut Document,
    revision_media: &[RevisionMedia],
    outcomes: &[MediaOutcome],
) -> Vec<RevisionMedia> {
    let mut resolved: Vec<Option<Option<String>>> = vec![None; revision_media.len()];
    let mut consumed = HashSet::new();

    for outcome in outcomes {
        let (owner, legacy_id, new_id) = match outcome {
            MediaOutcome::Linked {
                owner,
                association,
                media_id,
            } => (*owner, &association.media_id, Some(media_id.to_string())),
            MediaOutcome::Skipped(skipped) => (skipped.owner, &skipped.media_id, None),
        };
        if owner == MediaOwner::Key {
            continue;
        }
        if let Some(index) = revision_media
            .iter()
            .enumerate()
            .position(|(i, r)| !consumed.contains(&i) && &r.id == legacy_id)
        {
            consumed.insert(index);
            resolved[index] = Some(new_id.clone());
        }

        let (MediaOutcome::Linked {
            association,
            ..
        }, Some(new_id)) = (outcome, new_id)
        else {
            continue;
        };
        match owner {
            MediaOwner::Taxon => for_each_taxon_mut(&mut document.taxa, &mut |taxon| {
                if let Taxon::Leaf(leaf) = taxon {
                    if leaf.id == association.entity_id {
                        attach(&mut leaf.media, new_id.clone());
                    }
                }
            }),
            MediaOwner::State => {
                let state = document
                    .characters
                    .iter_mut()
                    .filter(|c| Some(c.id.as_str()) == association.character_id.as_deref())
                    .flat_map(|c| c.states.iter_mut())
                    .find(|s| s.id == association.entity_id);
                if let Some(state) = state {
                    attach(&mut state.media, new_id);
                }
            }
            MediaOwner::Key => {}
        }
    }

    revision_media
        .iter()
        .zip(resolved)
        .filter_map(|(entry, resolution)| match resolution {
            None => Some(entry.clone()),
            Some(Some(id)) => Some(RevisionMedia { id }),
            Some(None) => None,
        })
        .collect()
}

/// Log and count the outcomes of one run.
pub fn summarize(key_id: i64, owner: MediaOwner, outcomes: &[MediaOutcome]) -> Vec<SkippedMedia> {
    let skipped: Vec<SkippedMedia> = outcomes
        .iter()
        .filter_map(|o| match o {
            MediaOutcome::Skipped(s) => Some(s.clone()),
            MediaOutcome::Linked { .. } => None,
        })
        .collect();
    info!(
        stage = "media",
        key_id,
        %owner,
        linked = outcomes.len() - skipped.len(),
        skipped = skipped.len(),
        "media processed"
    );
    skipped
}
