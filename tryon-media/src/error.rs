//! Media processing error types and handling
//!
//! This module defines the error types used throughout the frame pipeline.
//! Note that a rate-limiting skip is not an error: it is reported through
//! [`crate::processing::FrameOutcome`] instead.

use thiserror::Error;

/// Main error type for media processing operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// Malformed image buffer or undecodable image
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Why the input was rejected
        reason: String,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Wrapped frame source ended or failed permanently
    #[error("Upstream exhausted: {reason}")]
    UpstreamExhausted {
        /// Reason reported by the source
        reason: String,
    },

    /// Wrapped frame source failed this pull but is still alive
    #[error("Source temporarily unavailable: {reason}")]
    SourceUnavailable {
        /// Reason reported by the source
        reason: String,
    },

    /// Transform execution failed
    #[error("Transform {transform} failed: {reason}")]
    TransformFailed {
        /// Transform name
        transform: String,
        /// Failure reason
        reason: String,
    },

    /// Unsupported format error
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// Format description
        format: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Encoding operation failed
    #[error("Encoding failed: {codec} - {reason}")]
    EncodingFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Outbound sink refused a frame
    #[error("Sink closed: {reason}")]
    SinkClosed {
        /// Reason reported by the sink
        reason: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Shorthand for an [`MediaError::InvalidInput`]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        MediaError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Check if error is recoverable
    ///
    /// A recoverable source error leaves the source usable for the next pull.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::SourceUnavailable { .. } => true,
            MediaError::TransformFailed { .. } => false,
            MediaError::UpstreamExhausted { .. } => false,
            MediaError::SinkClosed { .. } => false,
            MediaError::InvalidInput { .. } => false,
            MediaError::InvalidFrameData { .. } => false,
            MediaError::UnsupportedFormat { .. } => false,
            MediaError::InvalidConfiguration { .. } => false,
            MediaError::EncodingFailed { .. } => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::InvalidInput { .. } => ErrorCategory::Data,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
            MediaError::UpstreamExhausted { .. } => ErrorCategory::Source,
            MediaError::SourceUnavailable { .. } => ErrorCategory::Source,
            MediaError::TransformFailed { .. } => ErrorCategory::Transform,
            MediaError::UnsupportedFormat { .. } => ErrorCategory::Format,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::EncodingFailed { .. } => ErrorCategory::Codec,
            MediaError::SinkClosed { .. } => ErrorCategory::Sink,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration and parameter errors
    Configuration,
    /// Codec-related errors
    Codec,
    /// Format and data structure errors
    Format,
    /// Data validation errors
    Data,
    /// Upstream frame source errors
    Source,
    /// Outbound sink errors
    Sink,
    /// Transform execution errors
    Transform,
}

impl From<MediaError> for tryon_core::TryOnError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::InvalidInput { reason } => tryon_core::TryOnError::InvalidImage { reason },
            e @ (MediaError::InvalidFrameData { .. }
            | MediaError::UnsupportedFormat { .. }) => tryon_core::TryOnError::InvalidImage {
                reason: e.to_string(),
            },
            other => tryon_core::TryOnError::Media {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let exhausted = MediaError::UpstreamExhausted {
            reason: "track ended".to_string(),
        };
        assert_eq!(exhausted.category(), ErrorCategory::Source);
        assert!(!exhausted.is_recoverable());

        let transient = MediaError::SourceUnavailable {
            reason: "jitter buffer empty".to_string(),
        };
        assert_eq!(transient.category(), ErrorCategory::Source);
        assert!(transient.is_recoverable());

        let failed = MediaError::TransformFailed {
            transform: "try-on-preview".to_string(),
            reason: "no reference image set".to_string(),
        };
        assert_eq!(failed.category(), ErrorCategory::Transform);
        assert!(!failed.is_recoverable());

        let input = MediaError::invalid_input("zero width");
        assert_eq!(input.category(), ErrorCategory::Data);
        assert!(!input.is_recoverable());
    }

    #[test]
    fn test_into_session_error() {
        let err: tryon_core::TryOnError = MediaError::invalid_input("not a jpeg").into();
        assert_eq!(err.status_code(), 400);

        let err: tryon_core::TryOnError = MediaError::EncodingFailed {
            codec: "jpeg".to_string(),
            reason: "disk full".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_error_display() {
        let error = MediaError::InvalidFrameData {
            expected: 1024,
            actual: 512,
        };
        assert_eq!(
            error.to_string(),
            "Invalid frame data: expected 1024 bytes, got 512"
        );
    }
}
