//! WebSocket signaling server
//!
//! Every request is answered by [`SignalingServer::handle_message`], which
//! does not know about the transport; the WebSocket loop only moves JSON text
//! frames in and out.

use crate::peer::{PeerConnector, PeerLink, SdpType, SessionDescription};
use crate::protocol::{SignalingMessage, SignalingResponse};
use crate::session::SessionManager;
use crate::uploads::UploadStore;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tryon_core::{TryOnError, TryOnResult};
use tryon_media::image_codec::decode_data_url_bytes;
use tryon_media::{
    decode_image, encode_data_url_jpeg, FrameProcessor, FrameProcessorConfig, ImageBuffer,
    ProcessedBadge, DEFAULT_JPEG_QUALITY,
};
use uuid::Uuid;

/// Signaling server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Address the server binds to
    pub bind_addr: SocketAddr,
    /// Where uploaded reference images are kept; nothing is stored if unset
    pub upload_dir: Option<PathBuf>,
    /// JPEG quality of preview responses
    pub jpeg_quality: u8,
    /// Largest accepted decoded upload in bytes
    pub max_image_bytes: Option<usize>,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            upload_dir: Some(PathBuf::from("uploads")),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_image_bytes: Some(10 * 1024 * 1024),
        }
    }
}

impl SignalingConfig {
    /// Validate configuration
    pub fn validate(&self) -> TryOnResult<()> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(TryOnError::InvalidConfiguration {
                message: format!("jpeg_quality must be 1-100, got {}", self.jpeg_quality),
            });
        }
        if self.max_image_bytes == Some(0) {
            return Err(TryOnError::InvalidConfiguration {
                message: "max_image_bytes must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Signaling server for session negotiation and image uploads
#[derive(Clone)]
pub struct SignalingServer {
    config: SignalingConfig,
    sessions: SessionManager,
    connector: Arc<dyn PeerConnector>,
    uploads: UploadStore,
    preview: Arc<FrameProcessor>,
    connections: Arc<DashMap<String, SocketAddr>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for SignalingServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingServer")
            .field("config", &self.config)
            .field("sessions", &self.sessions)
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl SignalingServer {
    /// Create a server over an existing session manager
    pub fn new(
        config: SignalingConfig,
        sessions: SessionManager,
        connector: Arc<dyn PeerConnector>,
    ) -> TryOnResult<Self> {
        config.validate()?;

        let uploads = match &config.upload_dir {
            Some(dir) => UploadStore::new(dir).with_quality(config.jpeg_quality),
            None => UploadStore::disabled(),
        };
        // sessionless previews only stamp the badge; they have no reference
        let preview = FrameProcessor::new(
            Arc::new(ProcessedBadge::default()),
            FrameProcessorConfig::realtime(),
        )
        .map_err(TryOnError::from)?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            sessions,
            connector,
            uploads,
            preview: Arc::new(preview),
            connections: Arc::new(DashMap::new()),
            shutdown: Arc::new(shutdown),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &SignalingConfig {
        &self.config
    }

    /// Session registry
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Number of open WebSocket connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Bind and serve until [`SignalingServer::stop`] is called
    pub async fn start(&self) -> TryOnResult<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Bind the configured address
    pub async fn bind(&self) -> TryOnResult<TcpListener> {
        TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| TryOnError::ServerStartFailed {
                address: self.config.bind_addr,
                source: e.into(),
            })
    }

    /// Accept WebSocket connections on `listener`, one task per connection
    pub async fn serve(&self, listener: TcpListener) -> TryOnResult<()> {
        let local_addr = listener.local_addr()?;
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Ok(());
        }

        tracing::info!("Signaling server listening on {}", local_addr);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!("New connection from {}", addr);
                        let server = self.clone();
                        tokio::spawn(async move { server.handle_connection(stream, addr).await });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Signaling server on {} stopped accepting", local_addr);
        Ok(())
    }

    /// Handle one WebSocket connection until it closes
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::error!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let connection_id = Uuid::new_v4().to_string();
        tracing::debug!("WebSocket connection established: {}", connection_id);
        self.connections.insert(connection_id.clone(), addr);

        let (mut write, mut read) = ws_stream.split();
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let incoming = tokio::select! {
                incoming = read.next() => incoming,
                _ = shutdown.changed() => break,
            };

            let reply = match incoming {
                Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                Some(Ok(Message::Close(_))) => {
                    tracing::debug!("Connection {} closed", connection_id);
                    break;
                }
                Some(Err(e)) => {
                    tracing::error!("WebSocket error on connection {}: {}", connection_id, e);
                    break;
                }
                None => {
                    tracing::debug!("Connection {} stream ended", connection_id);
                    break;
                }
                // Binary, Ping, Pong
                Some(Ok(_)) => continue,
            };

            let json = match serde_json::to_string(&reply) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize response: {}", e);
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(json)).await {
                tracing::error!("Failed to send message to {}: {}", connection_id, e);
                break;
            }
        }

        self.connections.remove(&connection_id);
    }

    /// Parse and answer one JSON text frame
    pub async fn handle_text(&self, text: &str) -> SignalingResponse {
        match serde_json::from_str::<SignalingMessage>(text) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                tracing::warn!("Invalid message format: {}", e);
                SignalingResponse::from(TryOnError::InvalidMessage {
                    message: text.chars().take(256).collect(),
                    source: e.into(),
                })
            }
        }
    }

    /// Answer one signaling message
    pub async fn handle_message(&self, message: SignalingMessage) -> SignalingResponse {
        let result = match message {
            SignalingMessage::Offer { sdp, sdp_type } => self.handle_offer(sdp, sdp_type).await,
            SignalingMessage::SetReferenceImage { session_id, image } => {
                self.handle_set_reference(session_id, &image).await
            }
            SignalingMessage::ProcessImage { session_id, image } => {
                self.handle_process_image(session_id.as_deref(), &image)
            }
            SignalingMessage::ProcessClothesImage { session_id, image } => {
                self.handle_process_clothes(session_id, &image).await
            }
            SignalingMessage::CloseSession { session_id } => {
                self.sessions.close(&session_id).await.map(|()| {
                    SignalingResponse::SessionClosed { session_id }
                })
            }
            SignalingMessage::ListSessions => Ok(SignalingResponse::SessionList {
                sessions: self.sessions.list(),
            }),
        };

        result.unwrap_or_else(|e| {
            if e.is_client_error() {
                tracing::debug!("Request rejected: {}", e);
            } else {
                tracing::error!("Request failed: {}", e);
            }
            SignalingResponse::from(&e)
        })
    }

    /// Negotiate a new session
    async fn handle_offer(&self, sdp: String, sdp_type: SdpType) -> TryOnResult<SignalingResponse> {
        let session_id = SessionManager::new_session_id();
        if sdp_type != SdpType::Offer {
            return Err(TryOnError::Negotiation {
                session_id,
                reason: format!("expected an offer, got {:?}", sdp_type),
            });
        }
        self.sessions.check_admission()?;

        let PeerLink {
            connection,
            inbound,
            outbound,
        } = self
            .connector
            .connect(&session_id, self.sessions.events(&session_id))
            .await?;

        let session = match self
            .sessions
            .create_with_id(session_id.clone(), connection.clone())
        {
            Ok(session) => session,
            Err(e) => {
                connection.close().await;
                return Err(e);
            }
        };

        let answer = match session.peer().answer(SessionDescription { sdp, sdp_type }).await {
            Ok(answer) => answer,
            Err(e) => {
                if let Err(close_err) = self.sessions.close(&session_id).await {
                    tracing::warn!(
                        "Failed to close session {} after rejected offer: {}",
                        session_id,
                        close_err
                    );
                }
                return Err(e);
            }
        };

        if let Some(inbound) = inbound {
            session.attach_track(inbound).await?;
            if let Some(outbound) = outbound {
                session.start_forwarding(outbound).await?;
            }
        }

        tracing::info!("Session {} negotiated", session_id);
        Ok(SignalingResponse::answer(session_id, answer))
    }

    /// Decode an uploaded data URL, enforcing size limits
    fn decode_upload(&self, data_url: &str) -> TryOnResult<ImageBuffer> {
        let bytes = decode_data_url_bytes(data_url).map_err(TryOnError::from)?;
        self.sessions.limits().check_upload(bytes.len())?;
        if let Some(max) = self.config.max_image_bytes {
            if bytes.len() > max {
                return Err(TryOnError::InvalidImage {
                    reason: format!("upload of {} bytes exceeds {} bytes", bytes.len(), max),
                });
            }
        }
        decode_image(&bytes).map_err(TryOnError::from)
    }

    async fn handle_set_reference(
        &self,
        session_id: String,
        image: &str,
    ) -> TryOnResult<SignalingResponse> {
        let session = self.sessions.get(&session_id)?;
        let image = self.decode_upload(image)?;

        if let Some(path) = self.uploads.save(&image).await? {
            tracing::info!("Reference for session {} stored at {}", session_id, path.display());
        }
        session
            .processor()
            .set_reference(image)
            .map_err(TryOnError::from)?;

        Ok(SignalingResponse::ReferenceImageSet {
            session_id,
            success: true,
            message: "Reference image set successfully".to_string(),
        })
    }

    fn handle_process_image(
        &self,
        session_id: Option<&str>,
        image: &str,
    ) -> TryOnResult<SignalingResponse> {
        let processor = match session_id {
            Some(id) => self.sessions.get(id)?.processor().clone(),
            None => self.preview.clone(),
        };
        let image = self.decode_upload(image)?;
        self.preview_response(&processor, &image)
    }

    async fn handle_process_clothes(
        &self,
        session_id: String,
        image: &str,
    ) -> TryOnResult<SignalingResponse> {
        let session = self.sessions.get(&session_id)?;
        let image = self.decode_upload(image)?;

        self.uploads.save(&image).await?;
        session
            .processor()
            .set_reference(image.clone())
            .map_err(TryOnError::from)?;
        self.preview_response(session.processor(), &image)
    }

    fn preview_response(
        &self,
        processor: &FrameProcessor,
        image: &ImageBuffer,
    ) -> TryOnResult<SignalingResponse> {
        let processed = processor.process_single(image).map_err(TryOnError::from)?;
        let processed_image =
            encode_data_url_jpeg(&processed, self.config.jpeg_quality).map_err(TryOnError::from)?;
        Ok(SignalingResponse::ProcessedImage {
            processed_image,
            success: true,
        })
    }

    /// Stop accepting, drop connections and close every session
    pub async fn stop(&self) -> TryOnResult<()> {
        self.shutdown.send_replace(true);
        let closed = self.sessions.close_all().await;
        self.connections.clear();

        tracing::info!("Signaling server stopped ({} sessions closed)", closed);
        Ok(())
    }
}
