//! Document → store entities, with id remapping.
//!
//! # Algorithm
//!
//! 1. Plan: flatten the taxon forest depth-first (group nodes included).
//! 2. Create one taxon row per planned node and, independently, one
//!    character row per character followed by its state rows. Both fan-outs
//!    are bounded by `concurrency` and every future is driven to completion
//!    before errors are looked at.
//! 3. Record `oldId → newId` pairs in an [`IdRemap`].
//! 4. Rewrite node ids in plan order and statements in a single pass.
//! 5. Collect media associations for the media pipeline and strip the
//!    legacy media links from the entities; the pipeline re-attaches the
//!    persisted media ids.
//!
//! The document is only modified once every step has succeeded. Created
//! rows are recorded in the caller's [`Ledger`] so a failed run can be
//! compensated.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::MaterializeError;
use crate::ledger::Ledger;
use crate::models::{flatten_taxa, for_each_taxon_mut, Document, Taxon};
use crate::remap::IdRemap;
use crate::store::{EntityRef, EntityStore};

/// Default bound on in-flight store operations per fan-out.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// A media id referenced by one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAssociation {
    /// Document-level media element id (pre-materialization).
    pub media_id: String,
    /// New id of the owning entity (the key id for key media).
    pub entity_id: String,
    /// New id of the owning character, for character-state media.
    pub character_id: Option<String>,
}

/// One entry of a revision's media manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionMedia {
    pub id: String,
}

/// Result of a successful materialization.
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    pub remap: IdRemap,
    pub key_media: Vec<MediaAssociation>,
    pub taxa_media: Vec<MediaAssociation>,
    pub state_media: Vec<MediaAssociation>,
    /// Every media id touched by a taxon or state, pre-remap.
    pub revision_media: Vec<RevisionMedia>,
}

/// Join the results of one fan-out, reporting how many failed.
pub fn join_results<T>(
    stage: &'static str,
    results: Vec<Result<T>>,
) -> Result<Vec<T>, MaterializeError> {
    let attempted = results.len();
    let mut ok = Vec::with_capacity(attempted);
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(v) => ok.push(v),
            Err(e) => errors.push(e),
        }
    }
    match errors.len() {
        0 => Ok(ok),
        failed => Err(MaterializeError::Store {
            stage,
            attempted,
            failed,
            first: errors.swap_remove(0),
        }),
    }
}

/// Create the entities of `document` under `key_id` and remap its ids.
pub async fn materialize(
    store: &dyn EntityStore,
    ledger: &Ledger,
    key_id: i64,
    document: &mut Document,
    concurrency: usize,
) -> Result<Materialized, MaterializeError> {
    let n = concurrency.max(1);

    let key_media: Vec<MediaAssociation> = document
        .media_elements
        .iter()
        .filter(|e| document.media.contains(&e.id))
        .map(|e| MediaAssociation {
            media_id: e.id.clone(),
            entity_id: key_id.to_string(),
            character_id: None,
        })
        .collect();

    let plan: Vec<&Taxon> = flatten_taxa(&document.taxa);
    debug!(key_id, taxa = plan.len(), characters = document.characters.len(), "materialize plan");

    let taxa_fut = stream::iter(0..plan.len())
        .map(|_| async move {
            let id = store.create_taxon(key_id).await?;
            ledger.record(EntityRef::Taxon(id));
            Ok::<i64, anyhow::Error>(id)
        })
        .buffered(n)
        .collect::<Vec<_>>();

    let characters_fut = stream::iter(document.characters.iter())
        .map(|character| async move {
            let kind = character.kind.to_uppercase();
            let id = store.create_character(key_id, &kind).await?;
            ledger.record(EntityRef::Character(id));

            let states = stream::iter(0..character.states.len())
                .map(|_| async move {
                    let state_id = store.create_character_state(id).await?;
                    ledger.record(EntityRef::CharacterState(state_id));
                    Ok::<i64, anyhow::Error>(state_id)
                })
                .buffered(n)
                .collect::<Vec<_>>()
                .await;
            let states = states.into_iter().collect::<Result<Vec<i64>>>()?;
            Ok::<(i64, Vec<i64>), anyhow::Error>((id, states))
        })
        .buffered(n)
        .collect::<Vec<_>>();

    let (taxa_results, character_results) = futures::join!(taxa_fut, characters_fut);
    let taxon_ids = join_results("taxon", taxa_results)?;
    let character_ids = join_results("character", character_results)?;

    let mut remap = IdRemap::new();
    for (taxon, new_id) in plan.iter().zip(&taxon_ids) {
        remap.insert_taxon(taxon.id(), &new_id.to_string());
    }
    for (character, (new_id, state_ids)) in document.characters.iter().zip(&character_ids) {
        remap.insert_character(&character.id, &new_id.to_string());
        for (state, state_id) in character.states.iter().zip(state_ids) {
            remap.insert_state(&state.id, &state_id.to_string());
        }
    }

    let statements = remap.rewrite_statements(&document.statements)?;

    let mut taxa_media = Vec::new();
    let mut state_media = Vec::new();
    let mut revision_media = Vec::new();

    let mut taxa = document.taxa.clone();
    let mut new_ids = taxon_ids.iter();
    for_each_taxon_mut(&mut taxa, &mut |taxon| {
        let Some(new_id) = new_ids.next() else {
            return;
        };
        let new_id = new_id.to_string();
        match taxon {
            Taxon::Group(group) => group.id = new_id,
            Taxon::Leaf(leaf) => {
                for media_id in leaf.media.take().map(|m| m.to_vec()).unwrap_or_default() {
                    revision_media.push(RevisionMedia { id: media_id.clone() });
                    taxa_media.push(MediaAssociation {
                        media_id,
                        entity_id: new_id.clone(),
                        character_id: None,
                    });
                }
                leaf.id = new_id;
            }
        }
    });

    let mut characters = document.characters.clone();
    for (character, (new_id, state_ids)) in characters.iter_mut().zip(&character_ids) {
        character.id = new_id.to_string();
        for (state, state_id) in character.states.iter_mut().zip(state_ids) {
            state.id = state_id.to_string();
            for media_id in state.media.take().map(|m| m.to_vec()).unwrap_or_default() {
                revision_media.push(RevisionMedia { id: media_id.clone() });
                state_media.push(MediaAssociation {
                    media_id,
                    entity_id: state.id.clone(),
                    character_id: Some(character.id.clone()),
                });
            }
        }
    }

    document.taxa = taxa;
    document.characters = characters;
    document.statements = statements;

    info!(
        stage = "materialize",
        key_id,
        taxa = taxon_ids.len(),
        characters = character_ids.len(),
        statements = document.statements.len(),
        media = revision_media.len() + key_media.len(),
        "entities created"
    );

    Ok(Materialized {
        remap,
        key_media,
        taxa_media,
        state_media,
        revision_media,
    })
}
