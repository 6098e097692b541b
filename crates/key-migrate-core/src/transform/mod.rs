//! Legacy record → target document.
//!
//! The transformer is pure: the caller supplies the document identifier and
//! the capture of "now", so the same inputs always produce the same
//! document. Each sub-mapper lives in its own module and is independently
//! testable.
//!
//! | Module | Produces |
//! |--------|----------|
//! | [`characters`] | `characters` with their states |
//! | [`taxa`] | the `taxa` forest |
//! | [`statements`] | `statements` |
//! | [`media`] | `mediaElements` and key-owned `media` |

pub mod characters;
pub mod media;
pub mod statements;
pub mod taxa;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::TransformError;
use crate::models::{localized, Document, LegacyKey};

/// Timestamp layout used for `created` and `lastModified`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Per-conversion inputs that do not come from the legacy record.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub language: String,
    pub license: String,
    pub creator: String,
    /// Copied from the target schema's `$schema`, when present.
    pub schema_uri: Option<String>,
    pub identifier: String,
    pub now: DateTime<Utc>,
}

impl ConvertOptions {
    /// Options with a fresh v4 identifier and the current time.
    pub fn new(language: &str, license: &str, creator: &str, schema_uri: Option<String>) -> Self {
        Self {
            language: language.to_string(),
            license: license.to_string(),
            creator: creator.to_string(),
            schema_uri,
            identifier: Uuid::new_v4().to_string(),
            now: Utc::now(),
        }
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a raw legacy record.
///
/// A record that does not match the legacy shape is a transformation
/// failure for that key, like a broken cross-reference.
pub fn parse_legacy_key(raw: &Value) -> Result<LegacyKey, TransformError> {
    LegacyKey::deserialize(raw).map_err(TransformError::Shape)
}

/// Convert one legacy record into a target document.
///
/// Fails only when a cross-reference inside the record is broken; schema
/// conformance is checked separately by the caller.
pub fn convert_to_document(
    key: &LegacyKey,
    options: &ConvertOptions,
) -> Result<Document, TransformError> {
    let language = options.language.as_str();
    let stamp = format_timestamp(options.now);

    let mut media_elements = media::map_media_elements(&key.image);
    let key_media =
        media::map_key_media(&[key.key_image.as_deref(), key.key_image_info.as_deref()]);
    // Key-level elements are unshifted one by one, so they land reversed.
    for element in &key_media {
        media_elements.insert(0, element.clone());
    }

    Ok(Document {
        schema: options.schema_uri.clone(),
        identifier: options.identifier.clone(),
        title: localized(language, key.name.clone()),
        description: localized(language, key.key_info.clone().unwrap_or_default()),
        language: vec![language.to_string()],
        license: options.license.clone(),
        creator: options.creator.clone(),
        created: stamp.clone(),
        version: key.version.clone(),
        status: key.key_status.to_uppercase(),
        last_modified: stamp,
        media_elements,
        media: key_media.into_iter().map(|e| e.id).collect(),
        characters: characters::map_characters(&key.traits, &key.values, &key.image, language),
        taxa: taxa::map_taxa(&key.species, &key.image, language),
        statements: statements::map_statements(&key.values, &key.sp_has_value)?,
    })
}
