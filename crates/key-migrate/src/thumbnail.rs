//! Image kinds and thumbnail derivation.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, ImageFormat};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Supported media formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// Inferred from the URL alone: a final `.png` segment is PNG,
    /// everything else JPEG.
    pub fn from_url(url: &str) -> Self {
        match url.rsplit('.').next() {
            Some("png") if url.contains('.') => ImageKind::Png,
            _ => ImageKind::Jpeg,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(ImageKind::Jpeg),
            "image/png" => Some(ImageKind::Png),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpeg",
            ImageKind::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThumbnailSpec {
    pub width: u32,
    pub height: u32,
    /// JPEG quality, 1..=100. PNG output is lossless.
    pub quality: u8,
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            quality: 90,
        }
    }
}

/// `{stem}-thumbnail.{ext}` next to `source`.
pub fn thumbnail_path(source: &Path, kind: ImageKind) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{}-thumbnail.{}", stem, kind.extension()))
}

/// Resize `source` to cover `spec.width × spec.height` and write it to
/// `dest` in the format `kind`. Blocking.
pub fn derive_thumbnail(source: &Path, dest: &Path, kind: ImageKind, spec: ThumbnailSpec) -> Result<()> {
    let img = image::io::Reader::open(source)
        .with_context(|| format!("Failed to open {}", source.display()))?
        .with_guessed_format()?
        .decode()
        .with_context(|| format!("Failed to decode {}", source.display()))?;
    let thumb = img.resize_to_fill(spec.width, spec.height, FilterType::Triangle);

    match kind {
        ImageKind::Jpeg => {
            let rgb = thumb.to_rgb8();
            let file = std::fs::File::create(dest)
                .with_context(|| format!("Failed to create {}", dest.display()))?;
            let mut writer = BufWriter::new(file);
            JpegEncoder::new_with_quality(&mut writer, spec.quality).encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ColorType::Rgb8,
            )?;
            writer.flush()?;
        }
        ImageKind::Png => {
            thumb
                .save_with_format(dest, ImageFormat::Png)
                .with_context(|| format!("Failed to write {}", dest.display()))?;
        }
    }
    Ok(())
}

/// [`derive_thumbnail`] on the blocking pool.
pub async fn derive_thumbnail_async(
    source: PathBuf,
    dest: PathBuf,
    kind: ImageKind,
    spec: ThumbnailSpec,
) -> Result<()> {
    tokio::task::spawn_blocking(move || derive_thumbnail(&source, &dest, kind, spec))
        .await
        .context("Thumbnail task panicked")?
}
