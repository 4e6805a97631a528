//! Signaling protocol messages
//!
//! JSON objects tagged by `type`, one per WebSocket text frame. Images travel
//! as base64 data URLs (`data:image/jpeg;base64,...`); a bare base64 payload
//! is accepted as well.

use crate::peer::{SdpType, SessionDescription};
use crate::session::SessionInfo;
use serde::{Deserialize, Serialize};
use tryon_core::TryOnError;

/// Client → server messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    /// Start a session from a browser offer
    Offer {
        /// Remote SDP
        sdp: String,
        /// SDP type, normally `offer`
        sdp_type: SdpType,
    },
    /// Upload the reference image for a session and enable processing
    SetReferenceImage {
        /// Target session
        session_id: String,
        /// Image data URL
        image: String,
    },
    /// One-shot preview of an image
    ProcessImage {
        /// Session whose reference to use; standalone preview if absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        /// Image data URL
        image: String,
    },
    /// Upload a clothing image: store it, set it as reference, preview it
    ProcessClothesImage {
        /// Target session
        session_id: String,
        /// Image data URL
        image: String,
    },
    /// Close a session
    CloseSession {
        /// Target session
        session_id: String,
    },
    /// List live sessions
    ListSessions,
}

/// Server → client messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingResponse {
    /// Local answer for an accepted offer
    Answer {
        /// Id of the new session
        session_id: String,
        /// Local SDP
        sdp: String,
        /// SDP type, normally `answer`
        sdp_type: SdpType,
    },
    /// Reference image accepted
    ReferenceImageSet {
        /// Target session
        session_id: String,
        /// Always true; failures are reported as [`SignalingResponse::Error`]
        success: bool,
        /// Human-readable status
        message: String,
    },
    /// One-shot preview result
    ProcessedImage {
        /// JPEG data URL
        #[serde(rename = "processedImage")]
        processed_image: String,
        /// Always true; failures are reported as [`SignalingResponse::Error`]
        success: bool,
    },
    /// Session closed
    SessionClosed {
        /// Closed session
        session_id: String,
    },
    /// Live sessions
    SessionList {
        /// One entry per session
        sessions: Vec<SessionInfo>,
    },
    /// Request failed
    Error {
        /// Error message
        error: String,
        /// Stable error code
        error_code: String,
        /// HTTP-style status
        status: u16,
    },
}

impl SignalingResponse {
    /// Answer built from a local description
    pub fn answer(session_id: String, description: SessionDescription) -> Self {
        SignalingResponse::Answer {
            session_id,
            sdp: description.sdp,
            sdp_type: description.sdp_type,
        }
    }

    /// Whether this is an error response
    pub fn is_error(&self) -> bool {
        matches!(self, SignalingResponse::Error { .. })
    }
}

impl From<&TryOnError> for SignalingResponse {
    fn from(error: &TryOnError) -> Self {
        SignalingResponse::Error {
            error: error.to_string(),
            error_code: error.error_code(),
            status: error.status_code(),
        }
    }
}

impl From<TryOnError> for SignalingResponse {
    fn from(error: TryOnError) -> Self {
        SignalingResponse::from(&error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let message: SignalingMessage = serde_json::from_str(
            r#"{"type":"set_reference_image","session_id":"s1","image":"data:image/png;base64,AAAA"}"#,
        )
        .unwrap();
        assert!(matches!(
            message,
            SignalingMessage::SetReferenceImage { ref session_id, .. } if session_id == "s1"
        ));

        let message: SignalingMessage =
            serde_json::from_str(r#"{"type":"process_image","image":"AAAA"}"#).unwrap();
        assert!(matches!(
            message,
            SignalingMessage::ProcessImage { session_id: None, .. }
        ));

        let message: SignalingMessage = serde_json::from_str(r#"{"type":"list_sessions"}"#).unwrap();
        assert!(matches!(message, SignalingMessage::ListSessions));
    }

    #[test]
    fn test_processed_image_uses_browser_field_name() {
        let json = serde_json::to_value(SignalingResponse::ProcessedImage {
            processed_image: "data:image/jpeg;base64,AA==".to_string(),
            success: true,
        })
        .unwrap();
        assert_eq!(json["type"], "processed_image");
        assert_eq!(json["processedImage"], "data:image/jpeg;base64,AA==");
    }

    #[test]
    fn test_error_response_carries_status() {
        let response = SignalingResponse::from(TryOnError::SessionNotFound {
            session_id: "gone".to_string(),
        });
        match response {
            SignalingResponse::Error { status, error_code, .. } => {
                assert_eq!(status, 404);
                assert_eq!(error_code, "SESSION_NOT_FOUND");
            }
            other => panic!("expected error, got {:?}", other),
        }
    }
}
