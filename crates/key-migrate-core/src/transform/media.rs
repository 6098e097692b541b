//! Legacy image URLs → document media elements.

use crate::media_ref::media_id_from_url;
use crate::models::{LegacyImage, MediaElement};

/// One element per legacy species/state image, in legacy order.
///
/// Images with a missing or empty URL produce no element.
pub fn map_media_elements(images: &[LegacyImage]) -> Vec<MediaElement> {
    images
        .iter()
        .filter_map(|img| img.image.as_deref())
        .filter(|url| !url.is_empty())
        .map(|url| MediaElement::new(media_id_from_url(url), url))
        .collect()
}

/// One element per present key-level image URL (`keyImage`, `keyImageInfo`).
pub fn map_key_media(urls: &[Option<&str>]) -> Vec<MediaElement> {
    urls.iter()
        .flatten()
        .filter(|url| !url.is_empty())
        .map(|url| MediaElement::new(media_id_from_url(url), *url))
        .collect()
}
