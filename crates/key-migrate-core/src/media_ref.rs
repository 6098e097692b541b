//! Stable media identifiers derived from source URLs.
//!
//! The id is the last path segment up to its first `.`, lower-cased, with
//! spaces, a small punctuation set, underscores, hyphens and the Norwegian
//! letters `æ ø å` removed. The same URL always yields the same id, and the
//! function is idempotent on its own output.

/// Characters removed from the lower-cased file stem.
const STRIPPED: &[char] = &[
    ' ', ',', '(', ')', '!', '?', '_', '-', 'Æ', 'æ', 'Ø', 'ø', 'Å', 'å',
];

/// Derive the media id for a source URL.
///
/// ```rust
/// use key_migrate_core::media_ref::media_id_from_url;
///
/// assert_eq!(media_id_from_url("https://host/img/Carex_Nigra (1).JPG"), "carexnigra1");
/// ```
pub fn media_id_from_url(url: &str) -> String {
    let file_name = url.rsplit('/').next().unwrap_or(url);
    let stem = file_name.split('.').next().unwrap_or(file_name);
    stem.to_lowercase()
        .chars()
        .filter(|c| !STRIPPED.contains(c))
        .collect()
}

/// Like [`media_id_from_url`], but absent or empty URLs have no id.
pub fn media_id_for(url: Option<&str>) -> Option<String> {
    url.filter(|u| !u.is_empty()).map(media_id_from_url)
}
