//! In-memory [`EntityStore`] implementation for tests.
//!
//! All tables live behind one `std::sync::RwLock`. Ids are allocated from a
//! single counter so ids of different kinds never coincide. Creates of a
//! given [`EntityKind`] can be made to fail with [`InMemoryStore::fail_creates`].

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    EntityKind, EntityRef, EntityStore, KeyInfo, KeyRecord, Media, MediaFiles, NewKey, NewMedia,
    NewRevision,
};

struct StoredRevision {
    revision: NewRevision,
    content: Value,
    media: Value,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    revisions: HashMap<i64, StoredRevision>,
    keys: HashMap<i64, NewKey>,
    key_revisions: Vec<(i64, i64)>,
    key_info: Vec<KeyInfo>,
    key_languages: Vec<(i64, String)>,
    taxa: HashMap<i64, i64>,
    characters: HashMap<i64, (i64, String)>,
    states: HashMap<i64, i64>,
    media: HashMap<i64, Media>,
    key_media: Vec<(i64, i64)>,
}

impl Tables {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    failing: RwLock<HashSet<EntityKind>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent create of `kind` fail.
    pub fn fail_creates(&self, kind: EntityKind) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(kind);
        }
    }

    fn check(&self, kind: EntityKind) -> Result<()> {
        let failing = self
            .failing
            .read()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        if failing.contains(&kind) {
            bail!("injected failure creating {}", kind.as_str());
        }
        Ok(())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| anyhow!("store lock poisoned"))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| anyhow!("store lock poisoned"))
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn create_revision(&self, revision: &NewRevision) -> Result<i64> {
        self.check(EntityKind::Revision)?;
        let mut t = self.write()?;
        let id = t.allocate();
        t.revisions.insert(
            id,
            StoredRevision {
                revision: revision.clone(),
                content: json!({}),
                media: json!({}),
            },
        );
        Ok(id)
    }

    async fn create_key(&self, key: &NewKey) -> Result<i64> {
        self.check(EntityKind::Key)?;
        let mut t = self.write()?;
        let id = t.allocate();
        t.keys.insert(id, key.clone());
        Ok(id)
    }

    async fn link_revision(&self, key_id: i64, revision_id: i64) -> Result<()> {
        self.check(EntityKind::KeyRevision)?;
        self.write()?.key_revisions.push((key_id, revision_id));
        Ok(())
    }

    async fn create_key_info(&self, info: &KeyInfo) -> Result<()> {
        self.check(EntityKind::KeyInfo)?;
        self.write()?.key_info.push(info.clone());
        Ok(())
    }

    async fn create_key_language(&self, key_id: i64, language_code: &str) -> Result<()> {
        self.check(EntityKind::KeyLanguage)?;
        self.write()?
            .key_languages
            .push((key_id, language_code.to_string()));
        Ok(())
    }

    async fn create_taxon(&self, key_id: i64) -> Result<i64> {
        self.check(EntityKind::Taxon)?;
        let mut t = self.write()?;
        let id = t.allocate();
        t.taxa.insert(id, key_id);
        Ok(id)
    }

    async fn create_character(&self, key_id: i64, kind: &str) -> Result<i64> {
        self.check(EntityKind::Character)?;
        let mut t = self.write()?;
        let id = t.allocate();
        t.characters.insert(id, (key_id, kind.to_string()));
        Ok(id)
    }

    async fn create_character_state(&self, character_id: i64) -> Result<i64> {
        self.check(EntityKind::CharacterState)?;
        let mut t = self.write()?;
        let id = t.allocate();
        t.states.insert(id, character_id);
        Ok(id)
    }

    async fn create_media(&self, media: &NewMedia) -> Result<i64> {
        self.check(EntityKind::Media)?;
        let mut t = self.write()?;
        let id = t.allocate();
        t.media.insert(
            id,
            Media {
                id,
                mime_type: media.mime_type.clone(),
                files: None,
            },
        );
        Ok(id)
    }

    async fn update_media_files(&self, media_id: i64, files: &MediaFiles) -> Result<()> {
        let mut t = self.write()?;
        let media = t
            .media
            .get_mut(&media_id)
            .ok_or_else(|| anyhow!("media {} not found", media_id))?;
        media.files = Some(files.clone());
        Ok(())
    }

    async fn find_media(&self, media_id: i64) -> Result<Option<Media>> {
        Ok(self.read()?.media.get(&media_id).cloned())
    }

    async fn create_key_media(&self, key_id: i64, media_id: i64) -> Result<()> {
        self.check(EntityKind::KeyMedia)?;
        self.write()?.key_media.push((key_id, media_id));
        Ok(())
    }

    async fn update_revision(
        &self,
        revision_id: i64,
        content: &Value,
        media: &Value,
    ) -> Result<()> {
        let mut t = self.write()?;
        let revision = t
            .revisions
            .get_mut(&revision_id)
            .ok_or_else(|| anyhow!("revision {} not found", revision_id))?;
        revision.content = content.clone();
        revision.media = media.clone();
        Ok(())
    }

    async fn find_key(&self, key_id: i64) -> Result<Option<KeyRecord>> {
        let t = self.read()?;
        let Some(key) = t.keys.get(&key_id) else {
            return Ok(None);
        };
        let revision = t.revisions.get(&key.revision_id);
        let title = t
            .key_info
            .iter()
            .find(|info| info.key_id == key_id)
            .and_then(|info| info.title.clone());
        Ok(Some(KeyRecord {
            id: key_id,
            revision_id: key.revision_id,
            status: key.status.clone(),
            version: key.version.clone(),
            created_by: key.created_by.clone(),
            title,
            content: revision.map(|r| r.content.clone()).unwrap_or(Value::Null),
            media: revision.map(|r| r.media.clone()).unwrap_or(Value::Null),
        }))
    }

    async fn count(&self, kind: EntityKind) -> Result<i64> {
        let t = self.read()?;
        let n = match kind {
            EntityKind::Revision => t.revisions.len(),
            EntityKind::Key => t.keys.len(),
            EntityKind::KeyRevision => t.key_revisions.len(),
            EntityKind::KeyInfo => t.key_info.len(),
            EntityKind::KeyLanguage => t.key_languages.len(),
            EntityKind::Taxon => t.taxa.len(),
            EntityKind::Character => t.characters.len(),
            EntityKind::CharacterState => t.states.len(),
            EntityKind::Media => t.media.len(),
            EntityKind::KeyMedia => t.key_media.len(),
        };
        Ok(n as i64)
    }

    async fn destroy(&self, entity: &EntityRef) -> Result<()> {
        let mut t = self.write()?;
        match entity {
            EntityRef::Revision(id) => {
                t.revisions.remove(id);
            }
            EntityRef::Key(id) => {
                t.keys.remove(id);
            }
            EntityRef::KeyRevision {
                key_id,
                revision_id,
            } => t
                .key_revisions
                .retain(|(k, r)| !(k == key_id && r == revision_id)),
            EntityRef::KeyInfo {
                key_id,
                language_code,
            } => t
                .key_info
                .retain(|i| !(i.key_id == *key_id && &i.language_code == language_code)),
            EntityRef::KeyLanguage {
                key_id,
                language_code,
            } => t
                .key_languages
                .retain(|(k, l)| !(k == key_id && l == language_code)),
            EntityRef::Taxon(id) => {
                t.taxa.remove(id);
            }
            EntityRef::Character(id) => {
                t.characters.remove(id);
            }
            EntityRef::CharacterState(id) => {
                t.states.remove(id);
            }
            EntityRef::Media(id) => {
                t.media.remove(id);
            }
            EntityRef::KeyMedia { key_id, media_id } => t
                .key_media
                .retain(|(k, m)| !(k == key_id && m == media_id)),
        }
        Ok(())
    }
}
