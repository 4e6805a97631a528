//! # Try-On Media
//!
//! Frame-level half of the try-on pipeline: image buffers and video frames,
//! pluggable transforms, the paced [`FrameProcessor`] and the
//! [`TrackAdapter`] that keeps an outbound track fed when frames are skipped.

#![warn(clippy::all)]

pub mod adapter;
pub mod error;
pub mod image_codec;
pub mod processing;
pub mod tracks;
pub mod transform;

// Re-export main types
pub use adapter::{AdapterState, AdapterStats, TrackAdapter};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use image_codec::{
    decode_data_url, decode_image, encode_data_url_jpeg, encode_jpeg, DEFAULT_JPEG_QUALITY,
};
pub use processing::{
    FrameDiagnostics, FrameOutcome, FrameProcessor, FrameProcessorConfig, FrameStats,
    LatencyModel, Pacing, ProcessedFrame, SkipReason,
};
pub use tracks::{
    ChannelFrameSink, ChannelFrameSource, FrameSink, FrameSource, ImageBuffer, PixelFormat,
    TimeBase, VideoFrame,
};
pub use transform::{HorizontalFlip, ProcessedBadge, Transform, TryOnPreview};
