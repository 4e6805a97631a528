//! Integration tests for the signaling server
//!
//! Most cases drive `handle_message` directly; one round trip goes through a
//! real WebSocket connection on an ephemeral port.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tryon_core::{SessionLimits, TryOnError, TryOnResult};
use tryon_media::{
    decode_data_url, encode_data_url_jpeg, FrameProcessorConfig, ImageBuffer, TryOnPreview,
};
use tryon_signaling::{
    PeerConnection, PeerConnector, PeerEvents, PeerLink, SdpType, SessionDescription,
    SignalingConfig, SignalingMessage, SignalingResponse, SignalingServer, SessionManager,
};

// ============================================================================
// HELPERS
// ============================================================================

#[derive(Debug, Default)]
struct EchoPeer {
    reject: bool,
    closed: AtomicBool,
}

#[async_trait]
impl PeerConnection for EchoPeer {
    async fn answer(&self, offer: SessionDescription) -> TryOnResult<SessionDescription> {
        if self.reject {
            return Err(TryOnError::Negotiation {
                session_id: "unknown".to_string(),
                reason: "unsupported codec".to_string(),
            });
        }
        Ok(SessionDescription::answer(offer.sdp.replace("offer", "answer")))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct EchoConnector {
    reject: bool,
    peers: Arc<std::sync::Mutex<Vec<Arc<EchoPeer>>>>,
}

#[async_trait]
impl PeerConnector for EchoConnector {
    async fn connect(&self, _session_id: &str, _events: PeerEvents) -> TryOnResult<PeerLink> {
        let peer = Arc::new(EchoPeer {
            reject: self.reject,
            ..EchoPeer::default()
        });
        self.peers.lock().unwrap().push(peer.clone());
        Ok(PeerLink::new(peer))
    }
}

fn server_with(limits: SessionLimits, connector: EchoConnector) -> SignalingServer {
    let sessions = SessionManager::new(
        limits,
        FrameProcessorConfig::default(),
        Arc::new(TryOnPreview::default()),
    )
    .unwrap();
    let config = SignalingConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        upload_dir: None,
        ..SignalingConfig::default()
    };
    SignalingServer::new(config, sessions, Arc::new(connector)).unwrap()
}

fn server() -> SignalingServer {
    server_with(SessionLimits::server(), EchoConnector::default())
}

fn upload(width: u32, height: u32) -> String {
    encode_data_url_jpeg(&ImageBuffer::filled(width, height, [200, 100, 50]), 90).unwrap()
}

async fn open_session(server: &SignalingServer) -> String {
    match server
        .handle_message(SignalingMessage::Offer {
            sdp: "v=0 offer".to_string(),
            sdp_type: SdpType::Offer,
        })
        .await
    {
        SignalingResponse::Answer {
            session_id,
            sdp,
            sdp_type,
        } => {
            assert_eq!(sdp, "v=0 answer");
            assert_eq!(sdp_type, SdpType::Answer);
            session_id
        }
        other => panic!("expected answer, got {:?}", other),
    }
}

fn assert_error(response: SignalingResponse, expected_status: u16) {
    match response {
        SignalingResponse::Error { status, .. } => assert_eq!(status, expected_status),
        other => panic!("expected error {}, got {:?}", expected_status, other),
    }
}

// ============================================================================
// NEGOTIATION
// ============================================================================

#[tokio::test]
async fn test_offer_creates_session() {
    let server = server();
    let session_id = open_session(&server).await;

    assert_eq!(server.sessions().session_ids(), vec![session_id]);
}

#[tokio::test]
async fn test_failed_negotiation_leaves_no_session() {
    let connector = EchoConnector {
        reject: true,
        ..EchoConnector::default()
    };
    let peers = connector.peers.clone();
    let server = server_with(SessionLimits::server(), connector);
    let response = server
        .handle_message(SignalingMessage::Offer {
            sdp: "v=0".to_string(),
            sdp_type: SdpType::Offer,
        })
        .await;

    assert_error(response, 500);
    assert!(server.sessions().is_empty());

    let peers = peers.lock().unwrap();
    assert_eq!(peers.len(), 1);
    assert!(peers[0].closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_offer_rejected_at_session_limit() {
    let limits = SessionLimits {
        max_sessions: Some(1),
        ..SessionLimits::server()
    };
    let server = server_with(limits, EchoConnector::default());
    open_session(&server).await;

    let response = server
        .handle_message(SignalingMessage::Offer {
            sdp: "v=0".to_string(),
            sdp_type: SdpType::Offer,
        })
        .await;
    assert_error(response, 503);
}

// ============================================================================
// IMAGES
// ============================================================================

#[tokio::test]
async fn test_set_reference_enables_processing() {
    let server = server();
    let session_id = open_session(&server).await;

    let response = server
        .handle_message(SignalingMessage::SetReferenceImage {
            session_id: session_id.clone(),
            image: upload(32, 32),
        })
        .await;
    assert!(matches!(
        response,
        SignalingResponse::ReferenceImageSet { success: true, .. }
    ));

    let session = server.sessions().get(&session_id).unwrap();
    assert!(session.processor().is_enabled());
}

#[tokio::test]
async fn test_invalid_image_is_client_error() {
    let server = server();
    let session_id = open_session(&server).await;

    let response = server
        .handle_message(SignalingMessage::SetReferenceImage {
            session_id: session_id.clone(),
            image: "data:image/jpeg;base64,bm90IGFuIGltYWdl".to_string(),
        })
        .await;
    assert_error(response, 400);
    assert!(!server
        .sessions()
        .get(&session_id)
        .unwrap()
        .processor()
        .is_enabled());
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let server = server();
    let response = server
        .handle_message(SignalingMessage::SetReferenceImage {
            session_id: "missing".to_string(),
            image: upload(8, 8),
        })
        .await;
    assert_error(response, 404);
}

#[tokio::test]
async fn test_standalone_preview() {
    let server = server();
    let response = server
        .handle_message(SignalingMessage::ProcessImage {
            session_id: None,
            image: upload(64, 48),
        })
        .await;

    match response {
        SignalingResponse::ProcessedImage {
            processed_image,
            success,
        } => {
            assert!(success);
            let preview = decode_data_url(&processed_image).unwrap();
            assert_eq!((preview.width, preview.height), (64, 48));
        }
        other => panic!("expected preview, got {:?}", other),
    }
}

#[tokio::test]
async fn test_session_preview_needs_reference() {
    let server = server();
    let session_id = open_session(&server).await;

    let before = server
        .handle_message(SignalingMessage::ProcessImage {
            session_id: Some(session_id.clone()),
            image: upload(64, 48),
        })
        .await;
    assert_error(before, 500);

    let response = server
        .handle_message(SignalingMessage::ProcessClothesImage {
            session_id: session_id.clone(),
            image: upload(40, 40),
        })
        .await;
    assert!(matches!(
        response,
        SignalingResponse::ProcessedImage { success: true, .. }
    ));

    let after = server
        .handle_message(SignalingMessage::ProcessImage {
            session_id: Some(session_id),
            image: upload(64, 48),
        })
        .await;
    assert!(!after.is_error());
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let sessions = SessionManager::new(
        SessionLimits::server(),
        FrameProcessorConfig::default(),
        Arc::new(TryOnPreview::default()),
    )
    .unwrap();
    let config = SignalingConfig {
        upload_dir: None,
        max_image_bytes: Some(64),
        ..SignalingConfig::default()
    };
    let server =
        SignalingServer::new(config, sessions, Arc::new(EchoConnector::default())).unwrap();

    let response = server
        .handle_message(SignalingMessage::ProcessImage {
            session_id: None,
            image: upload(64, 64),
        })
        .await;
    assert_error(response, 400);
}

// ============================================================================
// SESSION MESSAGES
// ============================================================================

#[tokio::test]
async fn test_list_and_close_sessions() {
    let server = server();
    let first = open_session(&server).await;
    let second = open_session(&server).await;

    match server.handle_message(SignalingMessage::ListSessions).await {
        SignalingResponse::SessionList { sessions } => {
            let mut ids: Vec<String> = sessions.into_iter().map(|s| s.session_id).collect();
            ids.sort();
            let mut expected = vec![first.clone(), second.clone()];
            expected.sort();
            assert_eq!(ids, expected);
        }
        other => panic!("expected list, got {:?}", other),
    }

    let response = server
        .handle_message(SignalingMessage::CloseSession {
            session_id: first.clone(),
        })
        .await;
    assert!(matches!(
        response,
        SignalingResponse::SessionClosed { ref session_id } if *session_id == first
    ));
    assert_eq!(server.sessions().session_ids(), vec![second]);

    let again = server
        .handle_message(SignalingMessage::CloseSession { session_id: first })
        .await;
    assert_error(again, 404);
}

#[tokio::test]
async fn test_malformed_json_is_invalid_message() {
    let server = server();
    match server.handle_text("{\"type\":\"warp_drive\"}").await {
        SignalingResponse::Error {
            status, error_code, ..
        } => {
            assert_eq!(status, 400);
            assert_eq!(error_code, "INVALID_MESSAGE");
        }
        other => panic!("expected error, got {:?}", other),
    }
}

// ============================================================================
// WEBSOCKET
// ============================================================================

#[tokio::test]
async fn test_websocket_round_trip_and_stop() {
    let server = server();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    let offer = serde_json::to_string(&SignalingMessage::Offer {
        sdp: "v=0 offer".to_string(),
        sdp_type: SdpType::Offer,
    })
    .unwrap();
    ws.send(Message::Text(offer)).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let response: SignalingResponse = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert!(matches!(response, SignalingResponse::Answer { .. }));
    assert_eq!(server.sessions().len(), 1);

    server.stop().await.unwrap();
    assert!(server.sessions().is_empty());
    let finished = tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .unwrap()
        .unwrap();
    assert!(finished.is_ok());
}
