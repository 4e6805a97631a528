//! Configuration types and defaults

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tryon_core::{SessionLimits, TryOnError, TryOnResult};
use tryon_media::{FrameProcessorConfig, HorizontalFlip, ProcessedBadge, Transform, TryOnPreview};
use tryon_signaling::SignalingConfig;

#[cfg(feature = "diagnostics")]
use tryon_diagnostics::ProfilerConfig;

/// Which placeholder transform sessions run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Corner badge only
    Badge,
    /// Mirror only
    Flip,
    /// Mirror plus result and clothing badges; needs a reference image
    #[default]
    TryOnPreview,
}

impl TransformKind {
    /// Instantiate the transform
    pub fn build(self) -> Arc<dyn Transform> {
        match self {
            TransformKind::Badge => Arc::new(ProcessedBadge::default()),
            TransformKind::Flip => Arc::new(HorizontalFlip),
            TransformKind::TryOnPreview => Arc::new(TryOnPreview::default()),
        }
    }
}

/// Global try-on configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Install the logging subscriber on init
    pub debug_logging: bool,
    /// Default log filter when `RUST_LOG` is unset
    pub log_filter: String,
    /// Transform every session runs
    pub transform: TransformKind,
    /// Per-session processor settings
    pub processor: FrameProcessorConfig,
    /// Session limits
    pub limits: SessionLimits,
    /// Signaling server settings
    pub signaling: SignalingConfig,
    /// Load profiler thresholds
    #[cfg(feature = "diagnostics")]
    pub profiler: ProfilerConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            log_filter: "info".to_string(),
            transform: TransformKind::default(),
            processor: FrameProcessorConfig::default(),
            limits: SessionLimits::default(),
            signaling: SignalingConfig::default(),
            #[cfg(feature = "diagnostics")]
            profiler: ProfilerConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Parse from JSON; absent fields take their defaults
    pub fn from_json_str(json: &str) -> TryOnResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TryOnError::InvalidConfiguration {
                message: format!("invalid configuration JSON: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> TryOnResult<()> {
        self.processor
            .validate()
            .map_err(|e| TryOnError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        self.limits.validate()?;
        self.signaling.validate()?;
        #[cfg(feature = "diagnostics")]
        self.profiler.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tryon_media::Pacing;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = GlobalConfig::from_json_str(
            r#"{
                "transform": "flip",
                "limits": { "max_sessions": 2 },
                "signaling": { "bind_addr": "127.0.0.1:9000", "upload_dir": null }
            }"#,
        )
        .unwrap();

        assert_eq!(config.transform, TransformKind::Flip);
        assert_eq!(config.limits.max_sessions, Some(2));
        assert_eq!(config.signaling.bind_addr.port(), 9000);
        assert!(config.signaling.upload_dir.is_none());
        assert_eq!(config.signaling.jpeg_quality, 90);
        assert_eq!(
            config.processor.pacing,
            Pacing::Fixed(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(GlobalConfig::from_json_str(r#"{"signaling": {"jpeg_quality": 0}}"#).is_err());
        assert!(GlobalConfig::from_json_str("not json").is_err());
    }
}
