//! # Try-On - Real-Time Frame Processing with Fallback Delivery
//!
//! Takes a live camera track, runs a pluggable per-frame transform at a
//! bounded rate and keeps the outbound track fed: when a frame is skipped or
//! fails, the last good output is sent again with the current frame's timing.
//!
//! ## Key Features
//!
//! - **Paced processing**: at most one transform in flight per session, a
//!   minimum interval between transforms and 1 s input/output fps windows
//! - **Fallback delivery**: once a frame has been produced, the outbound track
//!   never goes dark because of a skip or a transform failure
//! - **Explicit sessions**: a session manager instead of global state, with
//!   exactly-once teardown on terminal peer states
//! - **WebSocket signaling**: offer/answer, reference uploads and one-shot
//!   previews as JSON messages
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tryon::{GlobalConfig, PeerConnector, TryOn};
//!
//! # async fn example(connector: Arc<dyn PeerConnector>) -> Result<(), tryon::TryOnError> {
//! let tryon = TryOn::init_with(GlobalConfig {
//!     debug_logging: true,
//!     ..GlobalConfig::default()
//! })?;
//!
//! let server = tryon.signaling_server(connector)?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use tryon_core::{
    ResourceWarning, SessionLimits, SessionUsage, TryOnError, TryOnResult, WarningSeverity,
};

pub use tryon_media::{
    AdapterState, AdapterStats, ChannelFrameSink, ChannelFrameSource, FrameOutcome,
    FrameProcessor, FrameProcessorConfig, FrameSink, FrameSource, FrameStats, HorizontalFlip,
    ImageBuffer, LatencyModel, MediaError, MediaResult, Pacing, PixelFormat, ProcessedBadge,
    ProcessedFrame, SkipReason, TimeBase, TrackAdapter, Transform, TryOnPreview, VideoFrame,
};

pub use tryon_signaling::{
    IceConnectionState, PeerConnection, PeerConnectionState, PeerConnector, PeerEvents, PeerLink,
    PeerStateEvent, SdpType, Session, SessionDescription, SessionInfo, SessionManager,
    SignalingConfig, SignalingMessage, SignalingResponse, SignalingServer,
};

#[cfg(feature = "diagnostics")]
pub use tryon_diagnostics::{
    DebugLogger, LoadLevel, PipelineProfiler, PipelineReport, ProfilerConfig,
};

// Public API modules
pub mod config;

// Re-export main API types
pub use config::{GlobalConfig, TransformKind};

use std::sync::Arc;

/// Main entry point
#[derive(Debug, Clone)]
pub struct TryOn {
    inner: Arc<TryOnInner>,
}

#[derive(Debug)]
struct TryOnInner {
    config: GlobalConfig,
    sessions: SessionManager,
    #[cfg(feature = "diagnostics")]
    profiler: PipelineProfiler,
}

impl TryOn {
    /// Initialize with default settings
    ///
    /// # Example
    /// ```rust,no_run
    /// use tryon::TryOn;
    ///
    /// let tryon = TryOn::init()?;
    /// # Ok::<(), tryon::TryOnError>(())
    /// ```
    pub fn init() -> TryOnResult<Self> {
        Self::init_with(GlobalConfig::default())
    }

    /// Initialize with custom global configuration
    pub fn init_with(config: GlobalConfig) -> TryOnResult<Self> {
        config.validate()?;

        #[cfg(feature = "diagnostics")]
        {
            if config.debug_logging {
                if let Err(e) = DebugLogger::init_logging(&config.log_filter) {
                    // an embedding application may have installed its own subscriber
                    tracing::debug!("Keeping existing logging setup: {}", e);
                }
            }
        }

        let sessions = SessionManager::new(
            config.limits.clone(),
            config.processor.clone(),
            config.transform.build(),
        )?;

        #[cfg(feature = "diagnostics")]
        let profiler = PipelineProfiler::new(config.profiler.clone())?;

        tracing::info!(
            transform = ?config.transform,
            max_sessions = ?config.limits.max_sessions,
            "Try-on pipeline initialized"
        );

        Ok(Self {
            inner: Arc::new(TryOnInner {
                config,
                sessions,
                #[cfg(feature = "diagnostics")]
                profiler,
            }),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &GlobalConfig {
        &self.inner.config
    }

    /// Session registry shared by every server built from this instance
    pub fn session_manager(&self) -> &SessionManager {
        &self.inner.sessions
    }

    /// Build a signaling server over this instance's sessions
    pub fn signaling_server(
        &self,
        connector: Arc<dyn PeerConnector>,
    ) -> TryOnResult<SignalingServer> {
        SignalingServer::new(
            self.inner.config.signaling.clone(),
            self.inner.sessions.clone(),
            connector,
        )
    }

    /// Sample every live session and report its load, worst first
    #[cfg(feature = "diagnostics")]
    pub fn pipeline_reports(&self) -> Vec<PipelineReport> {
        let profiler = &self.inner.profiler;
        let sessions = self.inner.sessions.list();
        let live: Vec<String> = sessions.iter().map(|s| s.session_id.clone()).collect();

        profiler.retain(&live);
        for info in sessions {
            profiler.record(&info.session_id, info.stats);
        }
        profiler.reports()
    }
}
