// End-to-end session tests against an in-process WebSocket server:
// handshake ordering, audio flow, update dispatch, the garbage filter,
// and the restart/suspend lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tabscribe::audio::{EncodingMode, SyntheticTabs, TabId, TabInfo};
use tabscribe::{
    CaptureError, CaptureStatus, LinkState, OrchestrationError, SessionConfig, SessionState,
    TabSession, TransportLink, UpdateKind,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const BLOCK_SIZE: usize = 256;

// ============================================================================
// Test server
// ============================================================================

struct WsHarness {
    addr: String,
    live: Arc<AtomicUsize>,
    inbound: mpsc::UnboundedReceiver<serde_json::Value>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl WsHarness {
    /// Send a JSON message to the most recent client connection.
    async fn reply(&self, value: serde_json::Value) {
        let guard = self.outbound.lock().await;
        let tx = guard.as_ref().expect("no client connected");
        tx.send(value.to_string()).expect("client connection gone");
    }

    async fn next_message(&mut self) -> serde_json::Value {
        timeout(Duration::from_secs(2), self.inbound.recv())
            .await
            .expect("timed out waiting for a client message")
            .expect("server channel closed")
    }

    /// Skip forward to the next message of the given type.
    async fn next_of_type(&mut self, kind: &str) -> serde_json::Value {
        for _ in 0..50 {
            let message = self.next_message().await;
            if message["type"] == kind {
                return message;
            }
        }
        panic!("no {} message arrived", kind);
    }

    fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

async fn spawn_server() -> WsHarness {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("ws://{}", listener.local_addr().unwrap());

    let live = Arc::new(AtomicUsize::new(0));
    let outbound: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>> = Arc::new(Mutex::new(None));
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    let accept_live = Arc::clone(&live);
    let accept_outbound = Arc::clone(&outbound);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(_) => continue,
            };
            accept_live.fetch_add(1, Ordering::SeqCst);

            let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();
            *accept_outbound.lock().await = Some(reply_tx);

            let conn_live = Arc::clone(&accept_live);
            let conn_in = in_tx.clone();
            tokio::spawn(async move {
                let (mut ws_tx, mut ws_rx) = ws.split();
                loop {
                    tokio::select! {
                        message = ws_rx.next() => {
                            match message {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(value) = serde_json::from_str(&text) {
                                        let _ = conn_in.send(value);
                                    }
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            }
                        }
                        reply = reply_rx.recv() => {
                            let Some(reply) = reply else { break };
                            if ws_tx.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                conn_live.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });

    WsHarness {
        addr,
        live,
        inbound: in_rx,
        outbound,
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn tab(id: &str, active: bool, audible: bool) -> TabInfo {
    TabInfo {
        id: TabId(id.to_string()),
        title: id.to_string(),
        active,
        audible,
    }
}

fn test_config() -> SessionConfig {
    SessionConfig {
        endpoint_url: "ws://unused".to_string(),
        block_size: BLOCK_SIZE,
        encoding: EncodingMode::Float32,
        target_sample_rate: 16_000,
        monitor: false,
    }
}

fn session_with(tabs: Vec<TabInfo>) -> (Arc<SyntheticTabs>, TabSession) {
    let registry = Arc::new(SyntheticTabs::new(tabs));
    let session = TabSession::new(registry.clone(), test_config());
    (registry, session)
}

/// An endpoint nothing listens on: bind an ephemeral port, then free it.
async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);
    addr
}

async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_metadata_handshake_comes_first() {
    let mut server = spawn_server().await;
    let (_registry, session) = session_with(vec![tab("music", true, true)]);

    session.start(&server.addr).await.unwrap();
    assert_eq!(session.state().await, SessionState::Active);

    let first = server.next_message().await;
    assert_eq!(first["type"], "metadata");
    assert_eq!(first["sampleRate"], 48_000);

    session.terminate().await;
}

#[tokio::test]
async fn test_audio_blocks_reach_the_server() {
    let mut server = spawn_server().await;
    let (_registry, session) = session_with(vec![tab("music", true, true)]);

    session.start(&server.addr).await.unwrap();
    let audio = server.next_of_type("audio").await;

    let data = audio["data"].as_str().expect("audio data is base64 text");
    let bytes = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.decode(data).unwrap()
    };
    assert_eq!(bytes.len(), BLOCK_SIZE * 4);
    for chunk in bytes.chunks_exact(4) {
        let sample = f32::from_le_bytes(chunk.try_into().unwrap());
        assert_eq!(sample, 0.25);
    }

    session.terminate().await;
}

#[tokio::test]
async fn test_transcription_reaches_ui_exactly_once() {
    let mut server = spawn_server().await;
    let (_registry, session) = session_with(vec![tab("music", true, true)]);
    let mut updates = session.subscribe();

    session.start(&server.addr).await.unwrap();
    server.next_message().await; // metadata: the client is fully wired

    server
        .reply(json!({"type": "transcription", "text": "hello"}))
        .await;

    let event = timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("no update arrived")
        .unwrap();
    assert_eq!(event.kind, UpdateKind::Transcription);
    assert_eq!(event.text, "hello");

    // Exactly once: nothing else follows
    assert!(timeout(Duration::from_millis(200), updates.recv())
        .await
        .is_err());
    assert_eq!(session.transcript().len(), 1);

    session.terminate().await;
}

#[tokio::test]
async fn test_garbage_context_never_reaches_ui() {
    let mut server = spawn_server().await;
    let (_registry, session) = session_with(vec![tab("music", true, true)]);
    let mut updates = session.subscribe();

    session.start(&server.addr).await.unwrap();
    server.next_message().await;

    server
        .reply(json!({"type": "context_partial", "text": "none"}))
        .await;
    server
        .reply(json!({"type": "transcription", "text": "after"}))
        .await;

    // The garbage context is dropped, so the first surfaced event is the
    // transcription sent after it.
    let event = timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("no update arrived")
        .unwrap();
    assert_eq!(event.kind, UpdateKind::Transcription);
    assert_eq!(event.text, "after");
    assert_eq!(session.transcript().len(), 1);

    session.terminate().await;
}

#[tokio::test]
async fn test_context_precedence_prefers_nested_json() {
    let mut server = spawn_server().await;
    let (_registry, session) = session_with(vec![tab("music", true, true)]);
    let mut updates = session.subscribe();

    session.start(&server.addr).await.unwrap();
    server.next_message().await;

    server
        .reply(json!({
            "type": "context_partial",
            "text": "fallback",
            "json": {"context": "cursor pagination beats offsets"}
        }))
        .await;

    let event = timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("no update arrived")
        .unwrap();
    assert_eq!(event.kind, UpdateKind::ContextPartial);
    assert_eq!(event.text, "cursor pagination beats offsets");

    session.terminate().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let server = spawn_server().await;
    let (_registry, session) = session_with(vec![tab("music", true, true)]);

    session.start(&server.addr).await.unwrap();

    session.stop().await;
    assert_eq!(session.state().await, SessionState::Suspended);
    assert_eq!(session.capture_status().await, CaptureStatus::Suspended);
    assert_eq!(session.link_state().await, LinkState::Closed);

    // Second stop: no error, no state change
    session.stop().await;
    assert_eq!(session.state().await, SessionState::Suspended);
    assert_eq!(session.capture_status().await, CaptureStatus::Suspended);

    session.terminate().await;
}

#[tokio::test]
async fn test_no_audible_tab_fails_cleanly() {
    let (registry, session) = session_with(vec![tab("muted", true, false)]);

    let err = session.start("ws://127.0.0.1:1").await.unwrap_err();
    assert!(matches!(err, OrchestrationError::NoAudibleTab));
    assert_eq!(session.state().await, SessionState::NotStarted);
    assert_eq!(session.capture_status().await, CaptureStatus::Idle);
    assert_eq!(registry.capture_count(), 0);
}

#[tokio::test]
async fn test_resolution_prefers_active_audible_tab() {
    let server = spawn_server().await;
    let (_registry, session) = session_with(vec![
        tab("background", false, true),
        tab("focused", true, true),
    ]);

    session.start(&server.addr).await.unwrap();
    assert_eq!(session.stats().await.tab.as_deref(), Some("focused"));

    session.terminate().await;
}

#[tokio::test]
async fn test_resolution_falls_back_to_first_audible() {
    let server = spawn_server().await;
    let (_registry, session) = session_with(vec![
        tab("silent-active", true, false),
        tab("noisy", false, true),
    ]);

    session.start(&server.addr).await.unwrap();
    assert_eq!(session.stats().await.tab.as_deref(), Some("noisy"));

    session.terminate().await;
}

#[tokio::test]
async fn test_fast_restart_keeps_the_graph() {
    let mut server = spawn_server().await;
    let (registry, session) = session_with(vec![tab("music", true, true)]);

    session.start(&server.addr).await.unwrap();
    server.next_message().await; // first metadata
    let playback_id = session.playback_id().await;

    session.stop().await;
    assert_eq!(session.state().await, SessionState::Suspended);

    session.start(&server.addr).await.unwrap();
    assert_eq!(session.state().await, SessionState::Active);

    // A fresh handshake on the new link
    let metadata = server.next_of_type("metadata").await;
    assert_eq!(metadata["sampleRate"], 48_000);

    // Same stream, same monitor wiring, one capture grant
    assert_eq!(session.playback_id().await, playback_id);
    assert_eq!(registry.capture_count(), 1);

    // Old connection is gone once the server drains the close
    let server_live = server.live.clone();
    assert!(
        eventually(move || server_live.load(Ordering::SeqCst) == 1).await,
        "expected exactly one live connection, got {}",
        server.live_connections()
    );

    session.terminate().await;
}

#[tokio::test]
async fn test_capture_denied_rolls_back() {
    let registry = Arc::new(SyntheticTabs::new(vec![tab("music", true, true)]).deny_capture());
    let session = TabSession::new(registry.clone(), test_config());

    let err = session.start("ws://127.0.0.1:1").await.unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Capture(CaptureError::PermissionDenied(_))
    ));
    assert_eq!(session.state().await, SessionState::NotStarted);
    assert_eq!(session.capture_status().await, CaptureStatus::Idle);
}

#[tokio::test]
async fn test_connect_failure_on_full_start_rolls_back() {
    let (registry, session) = session_with(vec![tab("music", true, true)]);

    // Nothing listens here; connect is refused
    let err = session.start(&dead_endpoint().await).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::Link(_)));

    // The whole transition is aborted: no graph survives
    assert_eq!(session.state().await, SessionState::NotStarted);
    assert_eq!(session.capture_status().await, CaptureStatus::Idle);
    assert_eq!(registry.capture_count(), 1);
}

#[tokio::test]
async fn test_connect_failure_on_restart_stays_suspended() {
    let server = spawn_server().await;
    let (registry, session) = session_with(vec![tab("music", true, true)]);

    session.start(&server.addr).await.unwrap();
    session.stop().await;

    let err = session.start(&dead_endpoint().await).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::Link(_)));

    // The graph is kept for the next attempt
    assert_eq!(session.state().await, SessionState::Suspended);
    assert_eq!(session.capture_status().await, CaptureStatus::Suspended);
    assert_eq!(registry.capture_count(), 1);

    // And the next attempt with a reachable server succeeds
    session.start(&server.addr).await.unwrap();
    assert_eq!(session.state().await, SessionState::Active);
    assert_eq!(registry.capture_count(), 1);

    session.terminate().await;
}

#[tokio::test]
async fn test_terminate_releases_everything() {
    let server = spawn_server().await;
    let (_registry, session) = session_with(vec![tab("music", true, true)]);

    session.start(&server.addr).await.unwrap();
    session.terminate().await;

    assert_eq!(session.state().await, SessionState::NotStarted);
    assert_eq!(session.capture_status().await, CaptureStatus::Idle);
    assert_eq!(session.link_state().await, LinkState::Closed);
    assert!(session.playback_id().await.is_none());

    // Back to NotStarted means clean stats: the next session reports its
    // own totals.
    let stats = session.stats().await;
    assert!(stats.started_at.is_none());
    assert_eq!(stats.duration_secs, 0.0);
    assert_eq!(stats.frames_streamed, 0);
    assert_eq!(stats.update_events, 0);
}

#[tokio::test]
async fn test_link_close_is_idempotent() {
    let server = spawn_server().await;
    let (inbound_tx, _inbound_rx) = mpsc::channel(8);

    let mut link = TransportLink::open(&server.addr, 48_000, inbound_tx)
        .await
        .unwrap();
    assert_eq!(link.state(), LinkState::Open);

    link.close().await;
    assert_eq!(link.state(), LinkState::Closed);

    link.close().await;
    assert_eq!(link.state(), LinkState::Closed);
}

#[tokio::test]
async fn test_stats_track_progress() {
    let mut server = spawn_server().await;
    let (_registry, session) = session_with(vec![tab("music", true, true)]);

    session.start(&server.addr).await.unwrap();
    server.next_of_type("audio").await;

    let stats = session.stats().await;
    assert_eq!(stats.state, SessionState::Active);
    assert!(stats.link_open);
    assert!(stats.started_at.is_some());
    assert!(stats.frames_streamed >= 1);
    assert_eq!(stats.endpoint_url.as_deref(), Some(server.addr.as_str()));

    session.terminate().await;
}
