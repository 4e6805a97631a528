//! Session resource limits
//!
//! Every negotiated session owns a frame processor and a track adapter, so the
//! number of concurrent sessions is the resource a server has to bound. This
//! module holds those limits, their presets and the warning model used when a
//! server is getting close to them.

use crate::error::{TryOnError, TryOnResult};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Session limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Maximum number of concurrent sessions (None = unlimited)
    pub max_sessions: Option<usize>,
    /// Maximum size of an uploaded reference image in bytes (None = unlimited)
    pub max_upload_bytes: Option<usize>,
    /// Warning threshold (fraction of a limit)
    pub warning_threshold: f32,
}

impl SessionLimits {
    /// Desktop limits: a handful of local sessions
    pub fn desktop() -> Self {
        Self {
            max_sessions: Some(4),
            max_upload_bytes: Some(8 * 1024 * 1024),
            warning_threshold: 0.75,
        }
    }

    /// Server limits: many concurrent browser sessions
    pub fn server() -> Self {
        Self {
            max_sessions: Some(256),
            max_upload_bytes: Some(16 * 1024 * 1024),
            warning_threshold: 0.9,
        }
    }

    /// Unlimited resources (for testing)
    pub fn unlimited() -> Self {
        Self {
            max_sessions: None,
            max_upload_bytes: None,
            warning_threshold: 0.95,
        }
    }

    /// Validate limits
    pub fn validate(&self) -> TryOnResult<()> {
        if self.max_sessions == Some(0) {
            return Err(TryOnError::InvalidConfiguration {
                message: "max_sessions must be > 0".to_string(),
            });
        }

        if !(self.warning_threshold > 0.0 && self.warning_threshold <= 1.0) {
            return Err(TryOnError::InvalidConfiguration {
                message: format!(
                    "warning_threshold must be in (0, 1], got {}",
                    self.warning_threshold
                ),
            });
        }

        Ok(())
    }

    /// Check whether one more session may be admitted
    pub fn check_admission(&self, active_sessions: usize) -> TryOnResult<()> {
        match self.max_sessions {
            Some(limit) if active_sessions >= limit => Err(TryOnError::SessionLimitReached {
                max_sessions: limit,
            }),
            _ => Ok(()),
        }
    }

    /// Check an uploaded image size against the upload limit
    pub fn check_upload(&self, size: usize) -> TryOnResult<()> {
        match self.max_upload_bytes {
            Some(limit) if size > limit => Err(TryOnError::InvalidImage {
                reason: format!("upload of {} bytes exceeds limit of {} bytes", size, limit),
            }),
            _ => Ok(()),
        }
    }

    /// Compute warnings for the given usage
    pub fn check_for_warnings(&self, usage: &SessionUsage) -> Vec<ResourceWarning> {
        let mut warnings = Vec::new();

        if let Some(limit) = self.max_sessions {
            let percentage = usage.active_sessions as f32 / limit as f32;
            if percentage >= self.warning_threshold {
                warnings.push(ResourceWarning::SessionsApproachingLimit {
                    current: usage.active_sessions,
                    limit,
                    percentage,
                });
            }
        }

        warnings
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::desktop()
    }
}

/// Current session usage
#[derive(Debug, Clone)]
pub struct SessionUsage {
    /// Number of live sessions
    pub active_sessions: usize,
    /// Sessions closed since start
    pub closed_sessions: u64,
    /// Timestamp when usage was measured
    pub measured_at: Instant,
}

impl Default for SessionUsage {
    fn default() -> Self {
        Self {
            active_sessions: 0,
            closed_sessions: 0,
            measured_at: Instant::now(),
        }
    }
}

/// Resource warning types
#[derive(Debug, Clone)]
pub enum ResourceWarning {
    /// Session count approaching the configured maximum
    SessionsApproachingLimit {
        /// Current number of sessions
        current: usize,
        /// Session limit
        limit: usize,
        /// Fraction of limit being used
        percentage: f32,
    },
}

impl ResourceWarning {
    /// Get severity level of the warning
    pub fn severity(&self) -> WarningSeverity {
        match self {
            ResourceWarning::SessionsApproachingLimit { percentage, .. } => {
                if *percentage >= 0.95 {
                    WarningSeverity::Critical
                } else if *percentage >= 0.9 {
                    WarningSeverity::High
                } else if *percentage >= 0.8 {
                    WarningSeverity::Medium
                } else {
                    WarningSeverity::Low
                }
            }
        }
    }

    /// Get recommended action for this warning
    pub fn recommended_action(&self) -> String {
        match self {
            ResourceWarning::SessionsApproachingLimit { .. } => {
                "Close idle sessions or raise max_sessions".to_string()
            }
        }
    }
}

/// Warning severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarningSeverity {
    /// Low severity warning
    Low,
    /// Medium severity warning
    Medium,
    /// High severity warning
    High,
    /// Critical severity warning
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_limits_presets() {
        let desktop = SessionLimits::desktop();
        let server = SessionLimits::server();

        assert!(desktop.max_sessions.unwrap() < server.max_sessions.unwrap());
        assert!(SessionLimits::unlimited().max_sessions.is_none());
        assert!(desktop.validate().is_ok());
        assert!(server.validate().is_ok());
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let mut limits = SessionLimits::desktop();
        limits.max_sessions = Some(0);
        assert!(limits.validate().is_err());

        let mut limits = SessionLimits::desktop();
        limits.warning_threshold = 1.5;
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_admission() {
        let limits = SessionLimits {
            max_sessions: Some(2),
            ..SessionLimits::desktop()
        };

        assert!(limits.check_admission(0).is_ok());
        assert!(limits.check_admission(1).is_ok());
        match limits.check_admission(2) {
            Err(TryOnError::SessionLimitReached { max_sessions }) => assert_eq!(max_sessions, 2),
            other => panic!("Expected SessionLimitReached, got {:?}", other),
        }

        assert!(SessionLimits::unlimited().check_admission(10_000).is_ok());
    }

    #[test]
    fn test_upload_limit() {
        let limits = SessionLimits {
            max_upload_bytes: Some(1024),
            ..SessionLimits::desktop()
        };

        assert!(limits.check_upload(1024).is_ok());
        assert!(limits.check_upload(1025).is_err());
    }

    #[test]
    fn test_check_for_warnings() {
        let limits = SessionLimits {
            max_sessions: Some(10),
            max_upload_bytes: None,
            warning_threshold: 0.8,
        };

        let quiet = SessionUsage {
            active_sessions: 5,
            ..SessionUsage::default()
        };
        assert!(limits.check_for_warnings(&quiet).is_empty());

        let busy = SessionUsage {
            active_sessions: 10,
            ..SessionUsage::default()
        };
        let warnings = limits.check_for_warnings(&busy);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity(), WarningSeverity::Critical);
        assert!(!warnings[0].recommended_action().is_empty());
    }
}
