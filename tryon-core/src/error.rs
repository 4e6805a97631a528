//! Error types for the try-on session layer

use thiserror::Error;

/// Main error type for session and signaling operations
#[derive(Error, Debug)]
pub enum TryOnError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Invalid configuration error
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// What was wrong with the configuration
        message: String,
    },

    /// Session lookup failed
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// Session ID that was not found
        session_id: String,
    },

    /// Session was already closed
    #[error("Session {session_id} is closed")]
    SessionClosed {
        /// Session ID
        session_id: String,
    },

    /// Too many concurrent sessions
    #[error("Session limit reached (max sessions: {max_sessions})")]
    SessionLimitReached {
        /// Configured maximum
        max_sessions: usize,
    },

    /// Offer/answer negotiation failed in the peer-connection layer
    #[error("Negotiation failed for session {session_id}: {reason}")]
    Negotiation {
        /// Session ID
        session_id: String,
        /// Reason reported by the peer-connection layer
        reason: String,
    },

    /// Uploaded image could not be decoded or was malformed
    #[error("Invalid image data: {reason}")]
    InvalidImage {
        /// Reason for rejection
        reason: String,
    },

    /// Media pipeline error that is not an input problem
    #[error("Media processing error: {reason}")]
    Media {
        /// Reason for media error
        reason: String,
    },

    /// Invalid message format
    #[error("Invalid message format: {message}, error: {source}")]
    InvalidMessage {
        /// Invalid message content
        message: String,
        /// Parsing error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Server start failed
    #[error("Failed to start server on {address}: {source}")]
    ServerStartFailed {
        /// Address that failed to bind
        address: std::net::SocketAddr,
        /// Underlying error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Unexpected internal failure
    #[error("Internal error: {reason}")]
    Internal {
        /// Description of the failure
        reason: String,
    },
}

/// Result type alias for session operations
pub type TryOnResult<T> = Result<T, TryOnError>;

impl TryOnError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            TryOnError::Initialization { .. } => "INITIALIZATION_FAILED".to_string(),
            TryOnError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            TryOnError::SessionNotFound { .. } => "SESSION_NOT_FOUND".to_string(),
            TryOnError::SessionClosed { .. } => "SESSION_CLOSED".to_string(),
            TryOnError::SessionLimitReached { .. } => "SESSION_LIMIT_REACHED".to_string(),
            TryOnError::Negotiation { .. } => "NEGOTIATION_FAILED".to_string(),
            TryOnError::InvalidImage { .. } => "INVALID_IMAGE".to_string(),
            TryOnError::Media { .. } => "MEDIA_PROCESSING_ERROR".to_string(),
            TryOnError::InvalidMessage { .. } => "INVALID_MESSAGE".to_string(),
            TryOnError::ServerStartFailed { .. } => "SERVER_START_FAILED".to_string(),
            TryOnError::Io { .. } => "IO_ERROR".to_string(),
            TryOnError::Internal { .. } => "INTERNAL_ERROR".to_string(),
        }
    }

    /// HTTP-style status for the error envelope sent back to clients
    pub fn status_code(&self) -> u16 {
        match self {
            TryOnError::InvalidImage { .. } | TryOnError::InvalidMessage { .. } => 400,
            TryOnError::SessionNotFound { .. } => 404,
            TryOnError::SessionClosed { .. } => 410,
            TryOnError::SessionLimitReached { .. } => 503,
            _ => 500,
        }
    }

    /// Whether the caller caused the error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

impl From<serde_json::Error> for TryOnError {
    fn from(error: serde_json::Error) -> Self {
        TryOnError::Internal {
            reason: format!("JSON serialization failed: {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_status() {
        let error = TryOnError::InvalidImage {
            reason: "not a jpeg".to_string(),
        };
        assert_eq!(error.error_code(), "INVALID_IMAGE");
        assert_eq!(error.status_code(), 400);
        assert!(error.is_client_error());

        let error = TryOnError::SessionLimitReached { max_sessions: 4 };
        assert_eq!(error.status_code(), 503);
        assert!(!error.is_client_error());

        let error = TryOnError::Media {
            reason: "encoder unavailable".to_string(),
        };
        assert_eq!(error.status_code(), 500);
    }

    #[test]
    fn test_error_display() {
        let error = TryOnError::SessionNotFound {
            session_id: "abc".to_string(),
        };
        assert_eq!(error.to_string(), "Session not found: abc");
    }

    #[test]
    fn test_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        match TryOnError::from(io_error) {
            TryOnError::Io { .. } => (),
            other => panic!("Expected Io error variant, got {:?}", other),
        }
    }
}
