//! Session registry
//!
//! Each session binds one peer connection to one [`FrameProcessor`] and, once
//! the camera track arrives, one [`TrackAdapter`]. The manager owns the id →
//! session map; there is no global state.

use crate::peer::{
    IceConnectionState, PeerConnection, PeerConnectionState, PeerEvents, PeerStateEvent,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tryon_core::{SessionLimits, SessionUsage, TryOnError, TryOnResult};
use tryon_media::{
    AdapterStats, FrameProcessor, FrameProcessorConfig, FrameSink, FrameSource, FrameStats,
    MediaError, TrackAdapter, Transform, VideoFrame,
};
use uuid::Uuid;

/// Last known connection and ICE state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerState {
    /// Connection state
    pub connection: PeerConnectionState,
    /// ICE state
    pub ice: IceConnectionState,
}

impl Default for PeerState {
    fn default() -> Self {
        Self {
            connection: PeerConnectionState::New,
            ice: IceConnectionState::New,
        }
    }
}

/// Summary used by listings and diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session id
    pub session_id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last known peer state
    pub state: PeerState,
    /// Whether a reference image is set
    pub processing_enabled: bool,
    /// Whether a camera track is attached or being forwarded
    pub has_track: bool,
    /// Processor statistics
    pub stats: FrameStats,
}

/// One negotiated try-on session
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    processor: Arc<FrameProcessor>,
    adapter: tokio::sync::Mutex<Option<TrackAdapter>>,
    peer: Arc<dyn PeerConnection>,
    state: Mutex<PeerState>,
    closed: AtomicBool,
    close_signal: watch::Sender<bool>,
    forwarding: Mutex<Option<JoinHandle<AdapterStats>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("state", &*self.state.lock())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    fn new(id: String, processor: FrameProcessor, peer: Arc<dyn PeerConnection>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            processor: Arc::new(processor),
            adapter: tokio::sync::Mutex::new(None),
            peer,
            state: Mutex::new(PeerState::default()),
            closed: AtomicBool::new(false),
            close_signal: watch::Sender::new(false),
            forwarding: Mutex::new(None),
        }
    }

    /// Session id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The session's processor, shared by the track and the upload path
    pub fn processor(&self) -> &Arc<FrameProcessor> {
        &self.processor
    }

    /// Peer connection handle
    pub fn peer(&self) -> &Arc<dyn PeerConnection> {
        &self.peer
    }

    /// Last known peer state
    pub fn state(&self) -> PeerState {
        *self.state.lock()
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> TryOnResult<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn closed_error(&self) -> TryOnError {
        TryOnError::SessionClosed {
            session_id: self.id.clone(),
        }
    }

    /// Resolves once `close()` has started
    async fn closing(&self, signal: &mut watch::Receiver<bool>) {
        // the sender lives in self, so the error case cannot occur here
        let _ = signal.wait_for(|closed| *closed).await;
    }

    fn record_state(&self, event: PeerStateEvent) {
        let mut state = self.state.lock();
        match event {
            PeerStateEvent::Connection(connection) => state.connection = connection,
            PeerStateEvent::Ice(ice) => state.ice = ice,
        }
    }

    /// Wrap the inbound camera track in a [`TrackAdapter`]
    ///
    /// Replaces (and closes) a previously attached track.
    pub async fn attach_track(&self, source: Box<dyn FrameSource>) -> TryOnResult<()> {
        self.ensure_open()?;
        let adapter = TrackAdapter::new(source, self.processor.clone());
        let previous = self.adapter.lock().await.replace(adapter);
        if let Some(previous) = previous {
            debug!(session_id = %self.id, "Replacing attached track");
            previous.close().await;
        }
        info!(session_id = %self.id, "Camera track attached");
        Ok(())
    }

    /// Pull one outbound frame through the attached track
    ///
    /// A pull still waiting on the source when the session closes is
    /// abandoned and returns [`TryOnError::SessionClosed`].
    pub async fn next_frame(&self) -> TryOnResult<VideoFrame> {
        let mut signal = self.close_signal.subscribe();
        self.ensure_open()?;

        let mut adapter = tokio::select! {
            adapter = self.adapter.lock() => adapter,
            _ = self.closing(&mut signal) => return Err(self.closed_error()),
        };
        let adapter = adapter.as_mut().ok_or_else(|| TryOnError::Media {
            reason: format!("session {} has no track attached", self.id),
        })?;

        tokio::select! {
            result = adapter.next() => result.map_err(TryOnError::from),
            _ = self.closing(&mut signal) => {
                debug!(session_id = %self.id, "In-flight pull abandoned by close");
                Err(self.closed_error())
            }
        }
    }

    /// Hand the attached track to a background task that feeds `sink`
    ///
    /// The task ends when the camera track ends, the sink closes or the
    /// session is closed.
    pub async fn start_forwarding(&self, mut sink: Box<dyn FrameSink>) -> TryOnResult<()> {
        self.ensure_open()?;
        let mut adapter = self
            .adapter
            .lock()
            .await
            .take()
            .ok_or_else(|| TryOnError::Media {
                reason: format!("session {} has no track attached", self.id),
            })?;

        let session_id = self.id.clone();
        let handle = tokio::spawn(async move {
            let result = adapter.forward_to(sink.as_mut()).await;
            match &result {
                Ok(delivered) => info!(%session_id, delivered, "Forwarding finished"),
                Err(MediaError::SinkClosed { reason }) => {
                    info!(%session_id, "Outbound track closed: {}", reason)
                }
                Err(e) => warn!(%session_id, "Forwarding stopped: {}", e),
            }
            let stats = adapter.stats().clone();
            adapter.close().await;
            stats
        });

        if let Some(previous) = self.forwarding.lock().replace(handle) {
            previous.abort();
        }
        // close() may have run between ensure_open and the replace above
        if self.is_closed() {
            if let Some(handle) = self.forwarding.lock().take() {
                handle.abort();
            }
            return Err(self.closed_error());
        }
        Ok(())
    }

    /// Whether a track is attached or being forwarded
    pub fn has_track(&self) -> bool {
        let forwarding = self
            .forwarding
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        // a held lock means a pull is in progress
        forwarding || self.adapter.try_lock().map_or(true, |adapter| adapter.is_some())
    }

    /// Release everything the session holds
    ///
    /// Safe to call any number of times; only the first call does work and
    /// returns `true`.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // wakes a pull parked on the source so the adapter lock frees up
        self.close_signal.send_replace(true);

        let forwarding = self.forwarding.lock().take();
        if let Some(handle) = forwarding {
            handle.abort();
        }
        let adapter = self.adapter.lock().await.take();
        if let Some(adapter) = adapter {
            adapter.close().await;
        }
        self.peer.close().await;

        info!(session_id = %self.id, "Session closed");
        true
    }

    /// Snapshot for listings
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            created_at: self.created_at,
            state: self.state(),
            processing_enabled: self.processor.is_enabled(),
            has_track: self.has_track(),
            stats: self.processor.stats(),
        }
    }
}

pub(crate) struct ManagerInner {
    sessions: DashMap<String, Arc<Session>>,
    admission: Mutex<()>,
    limits: SessionLimits,
    processor_config: FrameProcessorConfig,
    transform: Arc<dyn Transform>,
    closed_total: AtomicU64,
}

impl ManagerInner {
    async fn close(&self, session_id: &str) -> TryOnResult<()> {
        let (_, session) =
            self.sessions
                .remove(session_id)
                .ok_or_else(|| TryOnError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;
        if session.close().await {
            self.closed_total.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    pub(crate) async fn on_peer_state(&self, session_id: &str, event: PeerStateEvent) -> bool {
        let session = match self.sessions.get(session_id) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!(%session_id, ?event, "State change for unknown session ignored");
                return false;
            }
        };

        session.record_state(event);
        debug!(%session_id, ?event, "Peer state changed");

        if !event.is_terminal() {
            return false;
        }
        info!(%session_id, ?event, "Peer reached terminal state");
        // remove() hands the session to exactly one caller
        self.close(session_id).await.is_ok()
    }
}

/// Owns every live session
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.inner.sessions.len())
            .field("limits", &self.inner.limits)
            .field("transform", &self.inner.transform.name())
            .finish()
    }
}

impl SessionManager {
    /// Create a manager; every session gets its own processor built from
    /// `processor_config` around the shared `transform`
    pub fn new(
        limits: SessionLimits,
        processor_config: FrameProcessorConfig,
        transform: Arc<dyn Transform>,
    ) -> TryOnResult<Self> {
        limits.validate()?;
        processor_config
            .validate()
            .map_err(|e| TryOnError::InvalidConfiguration {
                message: e.to_string(),
            })?;

        Ok(Self {
            inner: Arc::new(ManagerInner {
                sessions: DashMap::new(),
                admission: Mutex::new(()),
                limits,
                processor_config,
                transform,
                closed_total: AtomicU64::new(0),
            }),
        })
    }

    /// Limits in force
    pub fn limits(&self) -> &SessionLimits {
        &self.inner.limits
    }

    /// Fresh session id
    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Fail early if another session would exceed the limit
    pub fn check_admission(&self) -> TryOnResult<()> {
        self.inner.limits.check_admission(self.inner.sessions.len())
    }

    /// State-change handle for a session id
    pub fn events(&self, session_id: &str) -> PeerEvents {
        PeerEvents::new(session_id.to_string(), Arc::downgrade(&self.inner))
    }

    /// Register a new session around `peer`
    pub fn create(&self, peer: Arc<dyn PeerConnection>) -> TryOnResult<Arc<Session>> {
        self.create_with_id(Self::new_session_id(), peer)
    }

    /// Register a session under a pre-allocated id
    pub fn create_with_id(
        &self,
        session_id: String,
        peer: Arc<dyn PeerConnection>,
    ) -> TryOnResult<Arc<Session>> {
        let processor = FrameProcessor::new(
            self.inner.transform.clone(),
            self.inner.processor_config.clone(),
        )
        .map_err(TryOnError::from)?;

        let session = {
            let _admission = self.inner.admission.lock();
            self.check_admission()?;
            if self.inner.sessions.contains_key(&session_id) {
                return Err(TryOnError::Internal {
                    reason: format!("duplicate session id {}", session_id),
                });
            }
            let session = Arc::new(Session::new(session_id.clone(), processor, peer));
            self.inner.sessions.insert(session_id.clone(), session.clone());
            session
        };

        info!(%session_id, active = self.len(), "Session created");
        for warning in self.inner.limits.check_for_warnings(&self.usage()) {
            warn!(
                severity = ?warning.severity(),
                "{:?}: {}",
                warning,
                warning.recommended_action()
            );
        }
        Ok(session)
    }

    /// Look a session up
    pub fn get(&self, session_id: &str) -> TryOnResult<Arc<Session>> {
        self.inner
            .sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TryOnError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Close and remove a session
    pub async fn close(&self, session_id: &str) -> TryOnResult<()> {
        self.inner.close(session_id).await
    }

    /// Close every session (server shutdown)
    pub async fn close_all(&self) -> usize {
        let mut closed = 0;
        for session_id in self.session_ids() {
            if self.inner.close(&session_id).await.is_ok() {
                closed += 1;
            }
        }
        if closed > 0 {
            info!(closed, "All sessions closed");
        }
        closed
    }

    /// Apply a peer state change; returns `true` if it closed the session
    pub async fn on_peer_state(&self, session_id: &str, event: PeerStateEvent) -> bool {
        self.inner.on_peer_state(session_id, event).await
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Whether no session is live
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    /// Ids of live sessions
    pub fn session_ids(&self) -> Vec<String> {
        self.inner
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Listing of live sessions, oldest first
    pub fn list(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut infos: Vec<SessionInfo> = sessions.iter().map(|session| session.info()).collect();
        infos.sort_by_key(|info| info.created_at);
        infos
    }

    /// Current usage
    pub fn usage(&self) -> SessionUsage {
        SessionUsage {
            active_sessions: self.len(),
            closed_sessions: self.inner.closed_total.load(Ordering::Relaxed),
            measured_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::SessionDescription;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tryon_media::HorizontalFlip;

    #[derive(Debug, Default)]
    struct CountingPeer {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl PeerConnection for CountingPeer {
        async fn answer(&self, offer: SessionDescription) -> TryOnResult<SessionDescription> {
            Ok(SessionDescription::answer(offer.sdp))
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(limits: SessionLimits) -> SessionManager {
        SessionManager::new(limits, FrameProcessorConfig::default(), Arc::new(HorizontalFlip))
            .unwrap()
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let manager = manager(SessionLimits::default());
        let peer = Arc::new(CountingPeer::default());
        let session = manager.create(peer.clone()).unwrap();

        assert!(session.close().await);
        assert!(!session.close().await);
        assert_eq!(peer.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(
            session.next_frame().await,
            Err(TryOnError::SessionClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_admission_limit() {
        let manager = manager(SessionLimits {
            max_sessions: Some(1),
            ..SessionLimits::default()
        });
        let first = manager.create(Arc::new(CountingPeer::default())).unwrap();

        assert!(matches!(
            manager.create(Arc::new(CountingPeer::default())),
            Err(TryOnError::SessionLimitReached { max_sessions: 1 })
        ));

        manager.close(first.id()).await.unwrap();
        assert!(manager.create(Arc::new(CountingPeer::default())).is_ok());
        assert_eq!(manager.usage().closed_sessions, 1);
    }

    #[tokio::test]
    async fn test_events_outliving_manager_are_ignored() {
        let events = {
            let manager = manager(SessionLimits::default());
            let session = manager.create(Arc::new(CountingPeer::default())).unwrap();
            manager.events(session.id())
        };
        assert!(
            !events
                .notify(PeerStateEvent::Connection(PeerConnectionState::Failed))
                .await
        );
    }
}
