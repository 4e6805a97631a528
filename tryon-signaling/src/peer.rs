//! Peer-connection seam
//!
//! The WebRTC stack is not part of this workspace. It plugs in through
//! [`PeerConnector`], which hands back a [`PeerLink`] per session: the
//! connection handle plus, once negotiated, the inbound camera track and the
//! outbound track the processed frames go to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tryon_core::TryOnResult;
use tryon_media::{FrameSink, FrameSource};

use crate::session::ManagerInner;

/// SDP message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Offer
    Offer,
    /// Provisional answer
    Pranswer,
    /// Final answer
    Answer,
    /// Rollback
    Rollback,
}

/// Session description exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Raw SDP
    pub sdp: String,
    /// Description type
    pub sdp_type: SdpType,
}

impl SessionDescription {
    /// Build an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    /// Build an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }
}

/// Overall peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    /// Created, nothing negotiated
    New,
    /// Negotiating
    Connecting,
    /// Media flowing
    Connected,
    /// Temporarily lost; may recover
    Disconnected,
    /// Gave up
    Failed,
    /// Closed by either side
    Closed,
}

/// ICE transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    /// Gathering not started
    New,
    /// Checking candidate pairs
    Checking,
    /// A usable pair was found
    Connected,
    /// Checks finished
    Completed,
    /// Connectivity lost; may recover
    Disconnected,
    /// No usable pair
    Failed,
    /// Shut down
    Closed,
}

/// State change reported by the peer-connection layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state", rename_all = "snake_case")]
pub enum PeerStateEvent {
    /// Connection state changed
    Connection(PeerConnectionState),
    /// ICE state changed
    Ice(IceConnectionState),
}

impl PeerStateEvent {
    /// Whether the session must be torn down
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PeerStateEvent::Connection(PeerConnectionState::Failed)
                | PeerStateEvent::Connection(PeerConnectionState::Closed)
                | PeerStateEvent::Ice(IceConnectionState::Failed)
        )
    }
}

/// One negotiated peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync + std::fmt::Debug {
    /// Apply the remote offer and produce the local answer
    async fn answer(&self, offer: SessionDescription) -> TryOnResult<SessionDescription>;

    /// Tear the connection down
    async fn close(&self);
}

/// What a connector hands back for a new session
pub struct PeerLink {
    /// Connection handle
    pub connection: Arc<dyn PeerConnection>,
    /// Inbound camera track, if already available
    pub inbound: Option<Box<dyn FrameSource>>,
    /// Outbound track for processed frames
    pub outbound: Option<Box<dyn FrameSink>>,
}

impl PeerLink {
    /// Connection without media tracks
    pub fn new(connection: Arc<dyn PeerConnection>) -> Self {
        Self {
            connection,
            inbound: None,
            outbound: None,
        }
    }

    /// Attach the inbound and outbound tracks
    pub fn with_tracks(mut self, inbound: Box<dyn FrameSource>, outbound: Box<dyn FrameSink>) -> Self {
        self.inbound = Some(inbound);
        self.outbound = Some(outbound);
        self
    }
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("connection", &self.connection)
            .field("inbound", &self.inbound.is_some())
            .field("outbound", &self.outbound.is_some())
            .finish()
    }
}

/// Factory for peer connections, one per session
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Create the connection for `session_id`
    ///
    /// `events` must receive every connection and ICE state change.
    async fn connect(&self, session_id: &str, events: PeerEvents) -> TryOnResult<PeerLink>;
}

/// Handle the peer-connection layer reports state changes through
///
/// Holds only a weak reference to the session registry, so a connection
/// outliving the manager cannot keep it alive.
#[derive(Debug, Clone)]
pub struct PeerEvents {
    session_id: String,
    manager: Weak<ManagerInner>,
}

impl PeerEvents {
    pub(crate) fn new(session_id: String, manager: Weak<ManagerInner>) -> Self {
        Self {
            session_id,
            manager,
        }
    }

    /// Session this handle reports for
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Report a state change; returns `true` if it closed the session
    pub async fn notify(&self, event: PeerStateEvent) -> bool {
        match self.manager.upgrade() {
            Some(manager) => manager.on_peer_state(&self.session_id, event).await,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(PeerStateEvent::Connection(PeerConnectionState::Failed).is_terminal());
        assert!(PeerStateEvent::Connection(PeerConnectionState::Closed).is_terminal());
        assert!(PeerStateEvent::Ice(IceConnectionState::Failed).is_terminal());

        assert!(!PeerStateEvent::Connection(PeerConnectionState::Disconnected).is_terminal());
        assert!(!PeerStateEvent::Ice(IceConnectionState::Closed).is_terminal());
        assert!(!PeerStateEvent::Ice(IceConnectionState::Disconnected).is_terminal());
    }

    #[test]
    fn test_description_serialization() {
        let json = serde_json::to_string(&SessionDescription::answer("v=0")).unwrap();
        assert_eq!(json, r#"{"sdp":"v=0","sdp_type":"answer"}"#);

        let event: PeerStateEvent =
            serde_json::from_str(r#"{"kind":"ice","state":"failed"}"#).unwrap();
        assert_eq!(event, PeerStateEvent::Ice(IceConnectionState::Failed));
    }
}
