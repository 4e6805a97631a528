//! Signaling Server Demo
//!
//! Starts the WebSocket signaling server with a loopback peer connector: every
//! negotiated session gets a synthetic 30 fps camera and an outbound track
//! that just counts what it receives. Connect with any WebSocket client and
//! send, for example:
//!
//! ```text
//! {"type":"offer","sdp":"v=0","sdp_type":"offer"}
//! {"type":"set_reference_image","session_id":"<id>","image":"data:image/png;base64,..."}
//! {"type":"list_sessions"}
//! ```

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tryon::{
    ChannelFrameSink, ChannelFrameSource, GlobalConfig, PeerConnection, PeerConnectionState,
    PeerConnector, PeerEvents, PeerLink, PeerStateEvent, PixelFormat, SessionDescription,
    TimeBase, TryOn, TryOnResult, VideoFrame,
};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const FPS: u64 = 30;

#[derive(Debug)]
struct LoopbackPeer {
    session_id: String,
}

#[async_trait]
impl PeerConnection for LoopbackPeer {
    async fn answer(&self, offer: SessionDescription) -> TryOnResult<SessionDescription> {
        Ok(SessionDescription::answer(format!(
            "{}\r\na=loopback:{}",
            offer.sdp.trim_end(),
            self.session_id
        )))
    }

    async fn close(&self) {
        info!("Loopback peer {} closed", self.session_id);
    }
}

struct LoopbackConnector;

#[async_trait]
impl PeerConnector for LoopbackConnector {
    async fn connect(&self, session_id: &str, events: PeerEvents) -> TryOnResult<PeerLink> {
        let (camera_tx, camera) = ChannelFrameSource::new(8);
        let (outbound, mut delivered) = ChannelFrameSink::new(8);

        // synthetic camera: a bar sweeping across a grey frame
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(1000 / FPS));
            let frame_len = (WIDTH * HEIGHT * 3) as usize;
            for n in 0u64.. {
                ticker.tick().await;
                let mut data = vec![96u8; frame_len];
                let bar = (n * 8 % WIDTH as u64) as usize;
                for row in data.chunks_exact_mut(WIDTH as usize * 3) {
                    for px in row[bar * 3..].chunks_exact_mut(3).take(8) {
                        px.copy_from_slice(&[255, 255, 255]);
                    }
                }
                let frame = VideoFrame {
                    width: WIDTH,
                    height: HEIGHT,
                    format: PixelFormat::Bgr24,
                    data: Bytes::from(data),
                    pts: Some((n * 90_000 / FPS) as i64),
                    time_base: TimeBase::VIDEO_90K,
                    is_keyframe: n % FPS == 0,
                };
                if camera_tx.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
        });

        let id = session_id.to_string();
        tokio::spawn(async move {
            events
                .notify(PeerStateEvent::Connection(PeerConnectionState::Connected))
                .await;

            let mut count = 0u64;
            while let Some(frame) = delivered.recv().await {
                count += 1;
                if count % (FPS * 5) == 0 {
                    info!("Session {}: {} frames delivered (pts {:?})", id, count, frame.pts);
                }
            }

            // outbound track gone: report it like a real peer would
            events
                .notify(PeerStateEvent::Connection(PeerConnectionState::Closed))
                .await;
        });

        let peer = Arc::new(LoopbackPeer {
            session_id: session_id.to_string(),
        });
        Ok(PeerLink::new(peer).with_tracks(Box::new(camera), Box::new(outbound)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("TRYON_CONFIG") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path))?;
            GlobalConfig::from_json_str(&json)?
        }
        Err(_) => GlobalConfig {
            debug_logging: true,
            ..GlobalConfig::default()
        },
    };

    let tryon = TryOn::init_with(config)?;
    let server = tryon.signaling_server(Arc::new(LoopbackConnector))?;

    info!("Try-on signaling demo on ws://{}", server.config().bind_addr);
    info!("Press Ctrl+C to stop");

    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.start().await })
    };

    let reporter = {
        let tryon = tryon.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(10));
            loop {
                ticker.tick().await;
                for report in tryon.pipeline_reports() {
                    info!(
                        "Session {}: {:.1} fps in, {:.1} fps out ({:?})",
                        report.session_id,
                        report.mean_input_fps,
                        report.mean_output_fps,
                        report.load
                    );
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    reporter.abort();
    server.stop().await?;
    serving.await??;

    info!("Demo finished");
    Ok(())
}
