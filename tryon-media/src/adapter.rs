//! Track adapter with fallback delivery
//!
//! Wraps an inbound [`FrameSource`] and produces exactly one outbound frame per
//! pull. Once a frame has been transformed successfully, the adapter never
//! leaves the sink without a frame: skipped or failed frames are replaced by
//! the last good output, re-stamped with the current frame's timing.

use crate::error::{MediaError, MediaResult};
use crate::processing::{FrameOutcome, FrameProcessor, SkipReason};
use crate::tracks::{FrameSink, FrameSource, VideoFrame};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Observable adapter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterState {
    /// The shared processor has a reference image
    pub processing_enabled: bool,
    /// At least one frame was transformed successfully
    pub has_good_frame: bool,
}

/// Delivery counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdapterStats {
    /// Frames returned unchanged because processing is disabled
    pub passed_through: u64,
    /// Freshly transformed frames
    pub transformed: u64,
    /// Skips/failures answered with the last good frame
    pub substituted: u64,
    /// Skips/failures answered with the raw frame (no good frame yet)
    pub cold_fallbacks: u64,
    /// Recoverable source errors masked with the last good frame
    pub masked_source_errors: u64,
}

/// Pull-based adapter between a frame source and the outbound sink
pub struct TrackAdapter {
    source: Box<dyn FrameSource>,
    processor: Arc<FrameProcessor>,
    last_good_frame: Option<VideoFrame>,
    stats: AdapterStats,
}

impl std::fmt::Debug for TrackAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackAdapter")
            .field("processor", &self.processor)
            .field("has_good_frame", &self.last_good_frame.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl TrackAdapter {
    /// Wrap a source; the processor is shared with the session's upload path
    pub fn new(source: Box<dyn FrameSource>, processor: Arc<FrameProcessor>) -> Self {
        Self {
            source,
            processor,
            last_good_frame: None,
            stats: AdapterStats::default(),
        }
    }

    /// Produce the next outbound frame
    ///
    /// Source exhaustion and unrecoverable source errors are returned as-is.
    /// A recoverable source error is masked with the last good frame if there
    /// is one.
    pub async fn next(&mut self) -> MediaResult<VideoFrame> {
        let frame = match self.source.recv().await {
            Ok(frame) => frame,
            Err(e) if e.is_recoverable() => match &self.last_good_frame {
                Some(last) => {
                    warn!("Source pull failed, repeating last good frame: {}", e);
                    self.stats.masked_source_errors += 1;
                    return Ok(last.clone());
                }
                None => return Err(e),
            },
            Err(e) => {
                debug!("Source ended: {}", e);
                return Err(e);
            }
        };

        if !self.processor.is_enabled() {
            self.stats.passed_through += 1;
            return Ok(frame);
        }

        let image = match frame.to_image() {
            Ok(image) => image,
            Err(e) => {
                warn!("Frame conversion failed, falling back: {}", e);
                return Ok(self.fallback(frame));
            }
        };

        match self.processor.process_frame(&image).await {
            FrameOutcome::Transformed(processed) => {
                let output = VideoFrame::from_image(processed.image, &frame);
                self.last_good_frame = Some(output.clone());
                self.stats.transformed += 1;
                Ok(output)
            }
            FrameOutcome::Skipped(reason) => {
                if let SkipReason::TransformFailed(_) = &reason {
                    debug!(?reason, "Transform failed, substituting");
                }
                Ok(self.fallback(frame))
            }
        }
    }

    fn fallback(&mut self, current: VideoFrame) -> VideoFrame {
        match &self.last_good_frame {
            Some(last) => {
                self.stats.substituted += 1;
                last.with_timing_of(&current)
            }
            None => {
                self.stats.cold_fallbacks += 1;
                current
            }
        }
    }

    /// Pump frames into `sink` until the source is exhausted
    ///
    /// Returns the number of frames delivered. Errors other than exhaustion,
    /// including a closed sink, end the pump with that error.
    pub async fn forward_to(&mut self, sink: &mut dyn FrameSink) -> MediaResult<u64> {
        let mut delivered = 0u64;
        loop {
            let frame = match self.next().await {
                Ok(frame) => frame,
                Err(MediaError::UpstreamExhausted { reason }) => {
                    info!(delivered, "Track ended: {}", reason);
                    return Ok(delivered);
                }
                Err(e) => return Err(e),
            };
            sink.send(frame).await?;
            delivered += 1;
        }
    }

    /// Current state
    pub fn state(&self) -> AdapterState {
        AdapterState {
            processing_enabled: self.processor.is_enabled(),
            has_good_frame: self.last_good_frame.is_some(),
        }
    }

    /// Delivery counters
    pub fn stats(&self) -> &AdapterStats {
        &self.stats
    }

    /// Shared processor
    pub fn processor(&self) -> &Arc<FrameProcessor> {
        &self.processor
    }

    /// Last successfully transformed frame
    pub fn last_good_frame(&self) -> Option<&VideoFrame> {
        self.last_good_frame.as_ref()
    }

    /// Release the wrapped source
    pub async fn close(mut self) {
        self.source.close().await;
    }
}
