//! # Try-On Signaling
//!
//! Session management and the signaling surface of the try-on pipeline:
//! browsers negotiate a session over a WebSocket, upload a reference image
//! and request one-shot previews. The WebRTC stack itself plugs in through
//! [`PeerConnector`].

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod peer;
pub mod protocol;
pub mod server;
pub mod session;
pub mod uploads;

// Re-export main types
pub use peer::{
    IceConnectionState, PeerConnection, PeerConnectionState, PeerConnector, PeerEvents, PeerLink,
    PeerStateEvent, SdpType, SessionDescription,
};
pub use protocol::{SignalingMessage, SignalingResponse};
pub use server::{SignalingConfig, SignalingServer};
pub use session::{PeerState, Session, SessionInfo, SessionManager};
pub use uploads::UploadStore;
