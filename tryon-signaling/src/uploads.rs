//! On-disk store for uploaded reference images

use std::path::{Path, PathBuf};
use tracing::debug;
use tryon_core::{TryOnError, TryOnResult};
use tryon_media::{encode_jpeg, ImageBuffer, DEFAULT_JPEG_QUALITY};
use uuid::Uuid;

/// Writes each upload as `<uuid>.jpg` under a directory
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: Option<PathBuf>,
    quality: u8,
}

impl UploadStore {
    /// Store uploads under `dir`, created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Store that keeps nothing
    pub fn disabled() -> Self {
        Self {
            dir: None,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Override the JPEG quality
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Target directory, if enabled
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Persist `image`; returns the written path, or `None` when disabled
    pub async fn save(&self, image: &ImageBuffer) -> TryOnResult<Option<PathBuf>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };

        let jpeg = encode_jpeg(image, self.quality).map_err(TryOnError::from)?;
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(format!("{}.jpg", Uuid::new_v4()));
        tokio::fs::write(&path, &jpeg).await?;
        debug!(path = %path.display(), bytes = jpeg.len(), "Upload stored");
        Ok(Some(path))
    }
}
