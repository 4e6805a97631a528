//! Frame types and track endpoints
//!
//! [`VideoFrame`] is what the media transport hands us and expects back;
//! [`ImageBuffer`] is the packed BGR24 representation transforms work on.

use crate::error::{MediaError, MediaResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Bytes per pixel of the processor's buffer representation (BGR24)
pub const BGR_CHANNELS: usize = 3;

/// Packed BGR24 image, the processor's buffer representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Row-major BGR pixels, no padding
    pub data: Bytes,
}

impl ImageBuffer {
    /// Create an image, rejecting malformed buffers
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> MediaResult<Self> {
        let image = Self {
            width,
            height,
            data: data.into(),
        };
        image.validate()?;
        Ok(image)
    }

    /// Create an image filled with one BGR colour
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BGR_CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self {
            width,
            height,
            data: Bytes::from(data),
        }
    }

    /// Expected byte length for the dimensions
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * BGR_CHANNELS
    }

    /// Check dimensions and buffer length
    pub fn validate(&self) -> MediaResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MediaError::invalid_input(format!(
                "image has zero dimension ({}x{})",
                self.width, self.height
            )));
        }

        if self.data.len() != self.expected_len() {
            return Err(MediaError::InvalidInput {
                reason: MediaError::InvalidFrameData {
                    expected: self.expected_len(),
                    actual: self.data.len(),
                }
                .to_string(),
            });
        }

        Ok(())
    }

    /// BGR value at (x, y), if in bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BGR_CHANNELS;
        self.data
            .get(offset..offset + BGR_CHANNELS)
            .map(|p| [p[0], p[1], p[2]])
    }
}

/// Pixel layout of a [`VideoFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed blue, green, red
    Bgr24,
    /// Packed red, green, blue
    Rgb24,
    /// Packed red, green, blue, alpha
    Rgba32,
    /// Planar YUV 4:2:0
    Yuv420p,
}

impl PixelFormat {
    /// Byte length of a frame in this format
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => pixels * 3,
            PixelFormat::Rgba32 => pixels * 4,
            PixelFormat::Yuv420p => {
                let chroma = width.div_ceil(2) as usize * height.div_ceil(2) as usize;
                pixels + 2 * chroma
            }
        }
    }
}

/// Rational time base for presentation timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeBase {
    /// Numerator
    pub num: u32,
    /// Denominator
    pub den: u32,
}

impl TimeBase {
    /// Create a time base
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// The 90 kHz RTP video clock
    pub const VIDEO_90K: Self = Self::new(1, 90_000);

    /// Milliseconds
    pub const MILLIS: Self = Self::new(1, 1_000);

    /// Convert a timestamp in this base to seconds
    pub fn to_seconds(&self, pts: i64) -> Option<f64> {
        if self.den == 0 {
            return None;
        }
        Some(pts as f64 * self.num as f64 / self.den as f64)
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::VIDEO_90K
    }
}

/// Video frame as exchanged with the media transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// Raw pixel data
    pub data: Bytes,
    /// Presentation timestamp in `time_base` units
    pub pts: Option<i64>,
    /// Time base of `pts`
    pub time_base: TimeBase,
    /// Whether this is a keyframe
    pub is_keyframe: bool,
}

impl VideoFrame {
    /// Build a BGR24 frame from a processed image, copying timing from `timing`
    pub fn from_image(image: ImageBuffer, timing: &VideoFrame) -> Self {
        Self {
            width: image.width,
            height: image.height,
            format: PixelFormat::Bgr24,
            data: image.data,
            pts: timing.pts,
            time_base: timing.time_base,
            is_keyframe: timing.is_keyframe,
        }
    }

    /// Same pixels, timing metadata taken from `timing`
    pub fn with_timing_of(&self, timing: &VideoFrame) -> Self {
        Self {
            pts: timing.pts,
            time_base: timing.time_base,
            ..self.clone()
        }
    }

    /// Whether two frames share playout timing
    pub fn same_timing(&self, other: &VideoFrame) -> bool {
        self.pts == other.pts && self.time_base == other.time_base
    }

    /// Convert to the processor's BGR24 buffer representation
    pub fn to_image(&self) -> MediaResult<ImageBuffer> {
        let expected = self.format.frame_len(self.width, self.height);
        if self.data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: self.data.len(),
            });
        }

        let data = match self.format {
            PixelFormat::Bgr24 => self.data.clone(),
            PixelFormat::Rgb24 => {
                let mut bgr = Vec::with_capacity(self.data.len());
                for px in self.data.chunks_exact(3) {
                    bgr.extend_from_slice(&[px[2], px[1], px[0]]);
                }
                Bytes::from(bgr)
            }
            PixelFormat::Rgba32 => {
                let mut bgr = Vec::with_capacity(self.data.len() / 4 * 3);
                for px in self.data.chunks_exact(4) {
                    bgr.extend_from_slice(&[px[2], px[1], px[0]]);
                }
                Bytes::from(bgr)
            }
            PixelFormat::Yuv420p => {
                return Err(MediaError::UnsupportedFormat {
                    format: "yuv420p (decode to bgr24 before processing)".to_string(),
                })
            }
        };

        ImageBuffer::new(self.width, self.height, data)
    }
}

/// Upstream supplier of inbound frames
#[async_trait]
pub trait FrameSource: Send {
    /// Pull the next frame
    ///
    /// [`MediaError::UpstreamExhausted`] ends the stream; a recoverable error
    /// (see [`MediaError::is_recoverable`]) leaves the source usable.
    async fn recv(&mut self) -> MediaResult<VideoFrame>;

    /// Release the source
    async fn close(&mut self) {}
}

/// Outbound consumer of frames
#[async_trait]
pub trait FrameSink: Send {
    /// Deliver one frame
    async fn send(&mut self, frame: VideoFrame) -> MediaResult<()>;
}

/// [`FrameSource`] fed through a tokio channel
///
/// The peer-connection layer pushes decoded frames (or transient errors) into
/// the sender; dropping the sender ends the stream.
#[derive(Debug)]
pub struct ChannelFrameSource {
    rx: mpsc::Receiver<MediaResult<VideoFrame>>,
}

impl ChannelFrameSource {
    /// Create a source with a bounded buffer
    pub fn new(buffer: usize) -> (mpsc::Sender<MediaResult<VideoFrame>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl FrameSource for ChannelFrameSource {
    async fn recv(&mut self) -> MediaResult<VideoFrame> {
        match self.rx.recv().await {
            Some(result) => result,
            None => Err(MediaError::UpstreamExhausted {
                reason: "frame channel closed".to_string(),
            }),
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

/// [`FrameSink`] that forwards into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelFrameSink {
    tx: mpsc::Sender<VideoFrame>,
}

impl ChannelFrameSink {
    /// Create a sink with a bounded buffer
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<VideoFrame>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FrameSink for ChannelFrameSink {
    async fn send(&mut self, frame: VideoFrame) -> MediaResult<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| MediaError::SinkClosed {
                reason: "outbound channel closed".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_frame() -> VideoFrame {
        VideoFrame {
            width: 2,
            height: 1,
            format: PixelFormat::Rgb24,
            data: Bytes::from_static(&[1, 2, 3, 4, 5, 6]),
            pts: Some(3000),
            time_base: TimeBase::VIDEO_90K,
            is_keyframe: false,
        }
    }

    #[test]
    fn test_image_validation() {
        assert!(ImageBuffer::new(2, 2, vec![0u8; 12]).is_ok());
        assert!(ImageBuffer::new(2, 2, vec![0u8; 11]).is_err());
        assert!(ImageBuffer::new(0, 2, Vec::<u8>::new()).is_err());

        let malformed = ImageBuffer {
            width: 4,
            height: 4,
            data: Bytes::from_static(&[0, 0, 0]),
        };
        assert!(matches!(
            malformed.validate(),
            Err(MediaError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_rgb_to_image_swaps_channels() {
        let image = rgb_frame().to_image().unwrap();
        assert_eq!(image.pixel(0, 0), Some([3, 2, 1]));
        assert_eq!(image.pixel(1, 0), Some([6, 5, 4]));
        assert_eq!(image.pixel(2, 0), None);
    }

    #[test]
    fn test_rgba_drops_alpha() {
        let frame = VideoFrame {
            format: PixelFormat::Rgba32,
            data: Bytes::from_static(&[10, 20, 30, 255, 40, 50, 60, 255]),
            ..rgb_frame()
        };
        let image = frame.to_image().unwrap();
        assert_eq!(image.data.as_ref(), &[30, 20, 10, 60, 50, 40]);
    }

    #[test]
    fn test_yuv_is_unsupported() {
        let frame = VideoFrame {
            width: 2,
            height: 2,
            format: PixelFormat::Yuv420p,
            data: Bytes::from(vec![0u8; 6]),
            ..rgb_frame()
        };
        assert!(matches!(
            frame.to_image(),
            Err(MediaError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_from_image_preserves_timing() {
        let source = rgb_frame();
        let image = ImageBuffer::filled(2, 1, [0, 255, 0]);
        let frame = VideoFrame::from_image(image, &source);

        assert_eq!(frame.format, PixelFormat::Bgr24);
        assert!(frame.same_timing(&source));

        let later = VideoFrame {
            pts: Some(6000),
            time_base: TimeBase::MILLIS,
            ..source.clone()
        };
        let restamped = frame.with_timing_of(&later);
        assert_eq!(restamped.pts, Some(6000));
        assert_eq!(restamped.time_base, TimeBase::MILLIS);
        assert_eq!(restamped.data, frame.data);
    }

    #[test]
    fn test_time_base_seconds() {
        assert_eq!(TimeBase::VIDEO_90K.to_seconds(90_000), Some(1.0));
        assert_eq!(TimeBase::new(1, 0).to_seconds(1), None);
    }

    #[tokio::test]
    async fn test_channel_source_ends_when_sender_dropped() {
        let (tx, mut source) = ChannelFrameSource::new(4);
        tx.send(Ok(rgb_frame())).await.unwrap();
        drop(tx);

        assert!(source.recv().await.is_ok());
        assert!(matches!(
            source.recv().await,
            Err(MediaError::UpstreamExhausted { .. })
        ));
    }
}
