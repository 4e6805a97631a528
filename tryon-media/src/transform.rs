//! Pluggable per-frame transforms
//!
//! The processor treats a transform as a black box. The implementations here
//! are the placeholders the demo servers ship with: a corner badge standing in
//! for a text overlay, a mirror, and the two combined for the try-on preview.

use crate::error::{MediaError, MediaResult};
use crate::tracks::{ImageBuffer, BGR_CHANNELS};
use bytes::Bytes;

/// Maps one image buffer to another
pub trait Transform: Send + Sync + std::fmt::Debug {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Apply the transform
    ///
    /// `reference` is the session's reference image snapshot, if one is set.
    fn apply(&self, frame: &ImageBuffer, reference: Option<&ImageBuffer>)
        -> MediaResult<ImageBuffer>;
}

/// Green marker block in the top-left corner
#[derive(Debug, Clone)]
pub struct ProcessedBadge {
    /// Left edge in pixels
    pub x: u32,
    /// Top edge in pixels
    pub y: u32,
    /// Badge width
    pub width: u32,
    /// Badge height
    pub height: u32,
    /// Badge colour (BGR)
    pub color: [u8; 3],
}

impl Default for ProcessedBadge {
    fn default() -> Self {
        Self {
            x: 20,
            y: 20,
            width: 120,
            height: 24,
            color: [0, 255, 0],
        }
    }
}

impl ProcessedBadge {
    fn stamp(&self, data: &mut [u8], width: u32, height: u32) {
        let x_end = self.x.saturating_add(self.width).min(width);
        let y_end = self.y.saturating_add(self.height).min(height);
        for y in self.y..y_end {
            for x in self.x..x_end {
                let offset = (y as usize * width as usize + x as usize) * BGR_CHANNELS;
                data[offset..offset + BGR_CHANNELS].copy_from_slice(&self.color);
            }
        }
    }
}

impl Transform for ProcessedBadge {
    fn name(&self) -> &str {
        "processed-badge"
    }

    fn apply(
        &self,
        frame: &ImageBuffer,
        _reference: Option<&ImageBuffer>,
    ) -> MediaResult<ImageBuffer> {
        frame.validate()?;
        let mut data = frame.data.to_vec();
        self.stamp(&mut data, frame.width, frame.height);
        Ok(ImageBuffer {
            width: frame.width,
            height: frame.height,
            data: Bytes::from(data),
        })
    }
}

/// Mirror every row
#[derive(Debug, Clone, Default)]
pub struct HorizontalFlip;

impl HorizontalFlip {
    fn flip(frame: &ImageBuffer) -> Vec<u8> {
        let row_len = frame.width as usize * BGR_CHANNELS;
        let mut out = Vec::with_capacity(frame.data.len());
        for row in frame.data.chunks_exact(row_len) {
            for px in row.chunks_exact(BGR_CHANNELS).rev() {
                out.extend_from_slice(px);
            }
        }
        out
    }
}

impl Transform for HorizontalFlip {
    fn name(&self) -> &str {
        "horizontal-flip"
    }

    fn apply(
        &self,
        frame: &ImageBuffer,
        _reference: Option<&ImageBuffer>,
    ) -> MediaResult<ImageBuffer> {
        frame.validate()?;
        Ok(ImageBuffer {
            width: frame.width,
            height: frame.height,
            data: Bytes::from(Self::flip(frame)),
        })
    }
}

/// Mirror plus a result badge and a "clothing applied" badge
///
/// Requires a reference image; without one there is nothing to try on.
#[derive(Debug, Clone)]
pub struct TryOnPreview {
    result_badge: ProcessedBadge,
    clothing_badge: ProcessedBadge,
}

impl Default for TryOnPreview {
    fn default() -> Self {
        Self {
            result_badge: ProcessedBadge {
                x: 10,
                y: 10,
                width: 140,
                height: 20,
                color: [0, 255, 0],
            },
            clothing_badge: ProcessedBadge {
                x: 10,
                y: 40,
                width: 170,
                height: 20,
                color: [0, 200, 255],
            },
        }
    }
}

impl Transform for TryOnPreview {
    fn name(&self) -> &str {
        "try-on-preview"
    }

    fn apply(
        &self,
        frame: &ImageBuffer,
        reference: Option<&ImageBuffer>,
    ) -> MediaResult<ImageBuffer> {
        frame.validate()?;
        let reference = reference.ok_or_else(|| MediaError::TransformFailed {
            transform: self.name().to_string(),
            reason: "no reference image set".to_string(),
        })?;
        reference.validate()?;

        let mut data = HorizontalFlip::flip(frame);
        self.result_badge.stamp(&mut data, frame.width, frame.height);
        self.clothing_badge
            .stamp(&mut data, frame.width, frame.height);
        Ok(ImageBuffer {
            width: frame.width,
            height: frame.height,
            data: Bytes::from(data),
        })
    }
}
