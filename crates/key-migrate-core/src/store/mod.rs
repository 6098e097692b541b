//! Storage abstraction for materialized keys.
//!
//! The [`EntityStore`] trait covers every persistence operation the
//! materializer and the media pipeline need, so the same orchestration runs
//! against SQLite in production and [`memory::InMemoryStore`] in tests.
//!
//! Surrogate ids are allocated by the store and returned as `i64`.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create_revision`](EntityStore::create_revision) | Empty revision for a new key |
//! | [`create_key`](EntityStore::create_key) | Key pointing at its current revision |
//! | [`create_taxon`](EntityStore::create_taxon) | Allocate a taxon id |
//! | [`create_character`](EntityStore::create_character) | Allocate a character id |
//! | [`create_character_state`](EntityStore::create_character_state) | Allocate a state id |
//! | [`create_media`](EntityStore::create_media) | Media row, before its files exist |
//! | [`update_media_files`](EntityStore::update_media_files) | Record file and thumbnail paths |
//! | [`update_revision`](EntityStore::update_revision) | Store the content and media snapshot |
//! | [`destroy`](EntityStore::destroy) | Remove one entity (compensation) |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Attributes of a new revision.
#[derive(Debug, Clone)]
pub struct NewRevision {
    pub note: String,
    pub created_by: String,
    pub status: String,
}

/// Attributes of a new key.
#[derive(Debug, Clone)]
pub struct NewKey {
    pub revision_id: i64,
    pub workgroup_id: i64,
    pub created_by: String,
    pub status: String,
    pub version: Option<String>,
}

/// Localized title and description of a key.
#[derive(Debug, Clone)]
pub struct KeyInfo {
    pub key_id: i64,
    pub language_code: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Attributes of a new media row.
#[derive(Debug, Clone)]
pub struct NewMedia {
    /// MIME type, `image/jpeg` or `image/png`.
    pub mime_type: String,
    pub created_by: String,
}

/// File locations of a media row and its thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFiles {
    pub file_name: String,
    pub file_path: String,
    pub thumbnail_name: String,
    pub thumbnail_path: String,
}

/// A persisted media row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub id: i64,
    pub mime_type: String,
    pub files: Option<MediaFiles>,
}

/// A persisted key with its current revision.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub id: i64,
    pub revision_id: i64,
    pub status: String,
    pub version: Option<String>,
    pub created_by: String,
    pub title: Option<String>,
    pub content: Value,
    pub media: Value,
}

/// Entity kinds, used for counting rows and injecting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Revision,
    Key,
    KeyRevision,
    KeyInfo,
    KeyLanguage,
    Taxon,
    Character,
    CharacterState,
    Media,
    KeyMedia,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Revision => "revision",
            EntityKind::Key => "key",
            EntityKind::KeyRevision => "key_revision",
            EntityKind::KeyInfo => "key_info",
            EntityKind::KeyLanguage => "key_language",
            EntityKind::Taxon => "taxon",
            EntityKind::Character => "character",
            EntityKind::CharacterState => "character_state",
            EntityKind::Media => "media",
            EntityKind::KeyMedia => "key_media",
        }
    }
}

/// A reference to one created entity, sufficient to destroy it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Revision(i64),
    Key(i64),
    KeyRevision { key_id: i64, revision_id: i64 },
    KeyInfo { key_id: i64, language_code: String },
    KeyLanguage { key_id: i64, language_code: String },
    Taxon(i64),
    Character(i64),
    CharacterState(i64),
    Media(i64),
    KeyMedia { key_id: i64, media_id: i64 },
}

impl EntityRef {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Revision(_) => EntityKind::Revision,
            EntityRef::Key(_) => EntityKind::Key,
            EntityRef::KeyRevision { .. } => EntityKind::KeyRevision,
            EntityRef::KeyInfo { .. } => EntityKind::KeyInfo,
            EntityRef::KeyLanguage { .. } => EntityKind::KeyLanguage,
            EntityRef::Taxon(_) => EntityKind::Taxon,
            EntityRef::Character(_) => EntityKind::Character,
            EntityRef::CharacterState(_) => EntityKind::CharacterState,
            EntityRef::Media(_) => EntityKind::Media,
            EntityRef::KeyMedia { .. } => EntityKind::KeyMedia,
        }
    }
}

/// Abstract entity store.
///
/// All operations are async and may fail with a backend-defined error.
/// Destroying an entity that no longer exists is not an error.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn create_revision(&self, revision: &NewRevision) -> Result<i64>;

    async fn create_key(&self, key: &NewKey) -> Result<i64>;

    async fn link_revision(&self, key_id: i64, revision_id: i64) -> Result<()>;

    async fn create_key_info(&self, info: &KeyInfo) -> Result<()>;

    async fn create_key_language(&self, key_id: i64, language_code: &str) -> Result<()>;

    async fn create_taxon(&self, key_id: i64) -> Result<i64>;

    async fn create_character(&self, key_id: i64, kind: &str) -> Result<i64>;

    async fn create_character_state(&self, character_id: i64) -> Result<i64>;

    async fn create_media(&self, media: &NewMedia) -> Result<i64>;

    async fn update_media_files(&self, media_id: i64, files: &MediaFiles) -> Result<()>;

    async fn find_media(&self, media_id: i64) -> Result<Option<Media>>;

    async fn create_key_media(&self, key_id: i64, media_id: i64) -> Result<()>;

    /// Replace the revision's content and media snapshot.
    async fn update_revision(&self, revision_id: i64, content: &Value, media: &Value)
        -> Result<()>;

    async fn find_key(&self, key_id: i64) -> Result<Option<KeyRecord>>;

    async fn count(&self, kind: EntityKind) -> Result<i64>;

    async fn destroy(&self, entity: &EntityRef) -> Result<()>;
}
