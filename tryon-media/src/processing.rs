//! Frame pacing, rate statistics and transform execution
//!
//! A [`FrameProcessor`] is created once per session. It owns the session's
//! reference image and decides, for every inbound frame, whether the transform
//! runs now or the frame is skipped because the previous transform completed
//! too recently. Input arrivals and output completions are counted separately
//! so that `input_fps` and `output_fps` diverge when the transform cannot keep
//! up with the source.

use crate::error::{MediaError, MediaResult};
use crate::image_codec::{self, DEFAULT_JPEG_QUALITY};
use crate::tracks::ImageBuffer;
use crate::transform::Transform;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Arrival slack allowed against the pacing interval
///
/// Absorbs timestamp rounding so an evenly spaced source lands on the same
/// frame of every pacing slot.
pub const PACING_SLACK: Duration = Duration::from_micros(50);

/// Minimum gap enforced between two completed transforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pacing {
    /// Same gap after every transform
    Fixed(Duration),
    /// Gap drawn uniformly from `[min, max]` after every transform
    Jittered {
        /// Lower bound
        min: Duration,
        /// Upper bound
        max: Duration,
    },
}

impl Pacing {
    /// No pacing: every frame that arrives after a completed transform runs
    pub const NONE: Self = Pacing::Fixed(Duration::ZERO);

    /// Draw the gap that must elapse before the next transform
    pub fn sample(&self) -> Duration {
        match self {
            Pacing::Fixed(interval) => *interval,
            Pacing::Jittered { min, max } => sample_between(*min, *max),
        }
    }
}

/// Simulated duration of the transform work itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LatencyModel {
    /// Transform returns immediately
    None,
    /// Every transform takes this long
    Fixed(Duration),
    /// Duration drawn uniformly from `[min, max]` per call
    Uniform {
        /// Lower bound
        min: Duration,
        /// Upper bound
        max: Duration,
    },
}

impl LatencyModel {
    /// Draw one latency
    pub fn sample(&self) -> Duration {
        match self {
            LatencyModel::None => Duration::ZERO,
            LatencyModel::Fixed(latency) => *latency,
            LatencyModel::Uniform { min, max } => sample_between(*min, *max),
        }
    }
}

fn sample_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

/// Frame processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameProcessorConfig {
    /// Minimum gap between completed transforms
    pub pacing: Pacing,
    /// Simulated transform latency
    pub latency: LatencyModel,
    /// Length of the fps statistics window
    pub stats_window: Duration,
    /// JPEG quality for encoded one-shot previews
    pub jpeg_quality: u8,
}

impl Default for FrameProcessorConfig {
    fn default() -> Self {
        Self {
            pacing: Pacing::Fixed(Duration::from_millis(100)),
            latency: LatencyModel::None,
            stats_window: Duration::from_secs(1),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl FrameProcessorConfig {
    /// Transform every frame, no simulated latency
    pub fn realtime() -> Self {
        Self {
            pacing: Pacing::NONE,
            ..Self::default()
        }
    }

    /// Behave like a slow model: ~10 fps output with variable inference time
    pub fn simulated_model() -> Self {
        Self {
            pacing: Pacing::Fixed(Duration::from_millis(100)),
            latency: LatencyModel::Uniform {
                min: Duration::from_millis(30),
                max: Duration::from_millis(80),
            },
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> MediaResult<()> {
        if self.stats_window.is_zero() {
            return Err(MediaError::InvalidConfiguration {
                message: "stats_window must be > 0".to_string(),
            });
        }

        if let Pacing::Jittered { min, max } = &self.pacing {
            if min > max {
                return Err(MediaError::InvalidConfiguration {
                    message: format!("pacing min {:?} exceeds max {:?}", min, max),
                });
            }
        }

        if let LatencyModel::Uniform { min, max } = &self.latency {
            if min > max {
                return Err(MediaError::InvalidConfiguration {
                    message: format!("latency min {:?} exceeds max {:?}", min, max),
                });
            }
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(MediaError::InvalidConfiguration {
                message: format!("jpeg_quality must be 1-100, got {}", self.jpeg_quality),
            });
        }

        Ok(())
    }
}

/// Why a frame was not transformed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Previous transform completed less than the pacing interval ago
    RateLimited,
    /// Another transform is still in flight
    Busy,
    /// The transform ran and failed; the caller falls back
    TransformFailed(String),
}

/// Per-frame diagnostics attached to a transformed frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDiagnostics {
    /// Input fps of the last completed window
    pub input_fps: f64,
    /// Output fps of the last completed window
    pub output_fps: f64,
    /// Time spent in this transform, including simulated latency
    pub processing_time: Duration,
}

/// A transformed frame plus its diagnostics
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Transformed image
    pub image: ImageBuffer,
    /// Diagnostics at completion time
    pub diagnostics: FrameDiagnostics,
}

/// Result of the real-time path
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    /// Transform ran and completed
    Transformed(ProcessedFrame),
    /// No output for this frame
    Skipped(SkipReason),
}

impl FrameOutcome {
    /// Whether the frame was transformed
    pub fn is_transformed(&self) -> bool {
        matches!(self, FrameOutcome::Transformed(_))
    }

    /// Whether the frame was skipped
    pub fn is_skipped(&self) -> bool {
        matches!(self, FrameOutcome::Skipped(_))
    }
}

/// Snapshot of processor statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Input fps of the last completed window
    pub input_fps: f64,
    /// Output fps of the last completed window
    pub output_fps: f64,
    /// Inputs counted in the current window
    pub window_inputs: u64,
    /// Outputs counted in the current window
    pub window_outputs: u64,
    /// Inputs since creation
    pub total_inputs: u64,
    /// Completed transforms since creation
    pub total_outputs: u64,
    /// Frames skipped by pacing or because a transform was in flight
    pub total_skipped: u64,
    /// Transform failures on the real-time path
    pub total_failures: u64,
    /// Duration of the most recent completed transform
    pub last_processing_time: Option<Duration>,
}

/// Rolling input/output counters
#[derive(Debug)]
struct RateWindow {
    window: Duration,
    window_start: Instant,
    generation: u64,
    input_count: u64,
    output_count: u64,
    input_fps: f64,
    output_fps: f64,
    total_inputs: u64,
    total_outputs: u64,
    total_skipped: u64,
    total_failures: u64,
    last_processing_time: Option<Duration>,
}

impl RateWindow {
    fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            window_start: now,
            generation: 0,
            input_count: 0,
            output_count: 0,
            input_fps: 0.0,
            output_fps: 0.0,
            total_inputs: 0,
            total_outputs: 0,
            total_skipped: 0,
            total_failures: 0,
            last_processing_time: None,
        }
    }

    fn roll_if_elapsed(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.window_start);
        // window > 0 is validated, so elapsed is non-zero past this check
        if elapsed < self.window || elapsed.is_zero() {
            return;
        }

        let secs = elapsed.as_secs_f64();
        self.input_fps = self.input_count as f64 / secs;
        self.output_fps = self.output_count as f64 / secs;
        self.input_count = 0;
        self.output_count = 0;
        self.window_start = now;
        self.generation += 1;
    }

    /// Count an arrival; returns the window generation it landed in
    fn record_input(&mut self, now: Instant) -> u64 {
        self.roll_if_elapsed(now);
        self.input_count += 1;
        self.total_inputs += 1;
        self.generation
    }

    /// Count a completion against the window its input arrived in
    fn record_output(&mut self, generation: u64, processing_time: Duration) {
        // an output whose input belongs to an already-rolled window is not
        // counted in the new one, keeping outputs <= inputs per window
        if generation == self.generation {
            self.output_count += 1;
        }
        self.total_outputs += 1;
        self.last_processing_time = Some(processing_time);
    }

    fn snapshot(&self) -> FrameStats {
        FrameStats {
            input_fps: self.input_fps,
            output_fps: self.output_fps,
            window_inputs: self.input_count,
            window_outputs: self.output_count,
            total_inputs: self.total_inputs,
            total_outputs: self.total_outputs,
            total_skipped: self.total_skipped,
            total_failures: self.total_failures,
            last_processing_time: self.last_processing_time,
        }
    }
}

#[derive(Debug)]
struct PacingState {
    last_processed_at: Option<Instant>,
    next_interval: Duration,
    in_flight: bool,
}

/// Clears the in-flight flag even if the processing future is dropped
struct InFlightGuard<'a> {
    pacing: &'a Mutex<PacingState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.pacing.lock().in_flight = false;
    }
}

/// Per-session frame processor
#[derive(Debug)]
pub struct FrameProcessor {
    transform: Arc<dyn Transform>,
    config: FrameProcessorConfig,
    reference: RwLock<Option<Arc<ImageBuffer>>>,
    enabled: AtomicBool,
    pacing: Mutex<PacingState>,
    stats: Mutex<RateWindow>,
}

impl FrameProcessor {
    /// Create a processor around a transform
    pub fn new(transform: Arc<dyn Transform>, config: FrameProcessorConfig) -> MediaResult<Self> {
        config.validate()?;
        let first_interval = config.pacing.sample();
        let stats = RateWindow::new(config.stats_window, Instant::now());

        Ok(Self {
            transform,
            config,
            reference: RwLock::new(None),
            enabled: AtomicBool::new(false),
            pacing: Mutex::new(PacingState {
                last_processed_at: None,
                next_interval: first_interval,
                in_flight: false,
            }),
            stats: Mutex::new(stats),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &FrameProcessorConfig {
        &self.config
    }

    /// Name of the wrapped transform
    pub fn transform_name(&self) -> &str {
        self.transform.name()
    }

    /// Store a new reference image and enable real-time processing
    ///
    /// A malformed buffer is rejected and leaves the previous state untouched.
    pub fn set_reference(&self, image: ImageBuffer) -> MediaResult<()> {
        image.validate()?;
        let (width, height) = (image.width, image.height);
        *self.reference.write() = Some(Arc::new(image));

        if !self.enabled.swap(true, Ordering::AcqRel) {
            info!(
                transform = self.transform.name(),
                "Reference image set ({}x{}), processing enabled", width, height
            );
        } else {
            info!("Reference image replaced ({}x{})", width, height);
        }
        Ok(())
    }

    /// Decode an uploaded image and store it as the reference
    pub fn set_reference_encoded(&self, encoded: &[u8]) -> MediaResult<()> {
        self.set_reference(image_codec::decode_image(encoded)?)
    }

    /// Whether a reference image has ever been set
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Current reference image snapshot
    pub fn reference(&self) -> Option<Arc<ImageBuffer>> {
        self.reference.read().clone()
    }

    /// One-shot transform, not subject to pacing
    pub fn process_single(&self, image: &ImageBuffer) -> MediaResult<ImageBuffer> {
        image.validate()?;
        let reference = self.reference();
        self.transform.apply(image, reference.as_deref())
    }

    /// Decode, transform and re-encode an uploaded image as JPEG
    pub fn process_single_encoded(&self, encoded: &[u8]) -> MediaResult<Vec<u8>> {
        let image = image_codec::decode_image(encoded)?;
        let processed = self.process_single(&image)?;
        image_codec::encode_jpeg(&processed, self.config.jpeg_quality)
    }

    /// Real-time path: transform the frame or report why it was skipped
    ///
    /// Never returns an error; transform failures become
    /// [`SkipReason::TransformFailed`] so the caller can fall back.
    pub async fn process_frame(&self, image: &ImageBuffer) -> FrameOutcome {
        let arrived_at = Instant::now();
        let generation = self.stats.lock().record_input(arrived_at);

        {
            let mut pacing = self.pacing.lock();
            if pacing.in_flight {
                drop(pacing);
                self.stats.lock().total_skipped += 1;
                debug!("Frame skipped: transform in flight");
                return FrameOutcome::Skipped(SkipReason::Busy);
            }

            if let Some(last) = pacing.last_processed_at {
                let gap = arrived_at.saturating_duration_since(last) + PACING_SLACK;
                if gap < pacing.next_interval {
                    drop(pacing);
                    self.stats.lock().total_skipped += 1;
                    return FrameOutcome::Skipped(SkipReason::RateLimited);
                }
            }

            pacing.in_flight = true;
        }
        let _guard = InFlightGuard {
            pacing: &self.pacing,
        };

        // one snapshot per frame; a concurrent set_reference applies to the next frame
        let reference = self.reference();
        let started = Instant::now();

        let latency = self.config.latency.sample();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = self.transform.apply(image, reference.as_deref());
        let finished = Instant::now();
        let processing_time = finished.saturating_duration_since(started);

        match result {
            Ok(transformed) => {
                {
                    let mut pacing = self.pacing.lock();
                    pacing.last_processed_at = Some(finished);
                    pacing.next_interval = self.config.pacing.sample();
                }

                let diagnostics = {
                    let mut stats = self.stats.lock();
                    stats.record_output(generation, processing_time);
                    FrameDiagnostics {
                        input_fps: stats.input_fps,
                        output_fps: stats.output_fps,
                        processing_time,
                    }
                };

                FrameOutcome::Transformed(ProcessedFrame {
                    image: transformed,
                    diagnostics,
                })
            }
            Err(e) => {
                warn!(
                    transform = self.transform.name(),
                    "Transform failed, frame will fall back: {}", e
                );
                self.stats.lock().total_failures += 1;
                FrameOutcome::Skipped(SkipReason::TransformFailed(e.to_string()))
            }
        }
    }

    /// Current statistics, rolling the window over if it has elapsed
    pub fn stats(&self) -> FrameStats {
        let mut stats = self.stats.lock();
        stats.roll_if_elapsed(Instant::now());
        stats.snapshot()
    }

    /// Completion time of the last successful transform
    pub fn last_processed_at(&self) -> Option<Instant> {
        self.pacing.lock().last_processed_at
    }
}
