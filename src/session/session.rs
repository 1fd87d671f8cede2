use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::events::UpdateEvent;
use super::stats::SessionStats;
use crate::audio::{
    CaptureGraph, CaptureStatus, CpalMonitor, FrameEncoder, NullMonitor, PlaybackSink, TabInfo,
    TabRegistry, TapHandle,
};
use crate::error::OrchestrationError;
use crate::link::{InboundMessage, LinkSender, LinkState, TransportLink};

/// Orchestration state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Starting,
    Active,
    Suspended,
}

/// Events buffered for slow UI subscribers before old ones are dropped.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

struct Inner {
    state: SessionState,
    graph: Option<CaptureGraph>,
    link: Option<TransportLink>,
    feed: Option<JoinHandle<()>>,
    endpoint: Option<String>,
}

/// A capture session: one tab's audio graph plus the transcription link,
/// with independently toggleable lifecycles.
///
/// The graph (media stream + monitor playback) outlives the link: `stop`
/// closes the link and detaches the processing tap but keeps the graph
/// alive, so a later `start` resumes without re-acquiring the stream.
pub struct TabSession {
    registry: Arc<dyn TabRegistry>,
    config: SessionConfig,
    inner: Mutex<Inner>,
    updates: broadcast::Sender<UpdateEvent>,
    entries: Arc<std::sync::Mutex<Vec<UpdateEvent>>>,
    frames_streamed: Arc<AtomicUsize>,
    update_count: Arc<AtomicUsize>,
    started_at: std::sync::Mutex<Option<DateTime<Utc>>>,
}

impl TabSession {
    pub fn new(registry: Arc<dyn TabRegistry>, config: SessionConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            registry,
            config,
            inner: Mutex::new(Inner {
                state: SessionState::NotStarted,
                graph: None,
                link: None,
                feed: None,
                endpoint: None,
            }),
            updates,
            entries: Arc::new(std::sync::Mutex::new(Vec::new())),
            frames_streamed: Arc::new(AtomicUsize::new(0)),
            update_count: Arc::new(AtomicUsize::new(0)),
            started_at: std::sync::Mutex::new(None),
        }
    }

    /// Subscribe to update events (the UI collaborator interface).
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.updates.subscribe()
    }

    /// Start (or restart) streaming to `endpoint_url`.
    ///
    /// With a live graph this is the fast path: close any existing link,
    /// open the new one, reattach the tap. No target re-resolution, no new
    /// permission grant. From scratch it resolves a target, acquires the
    /// stream, and builds the graph first.
    pub async fn start(&self, endpoint_url: &str) -> Result<(), OrchestrationError> {
        let mut inner = self.inner.lock().await;
        let fresh = inner.graph.is_none();

        if fresh {
            inner.state = SessionState::Starting;
            if let Err(e) = self.ensure_graph(&mut inner).await {
                inner.state = SessionState::NotStarted;
                return Err(e);
            }
        } else {
            info!("graph already wired; fast restart");
        }

        match self.reconnect(&mut inner, endpoint_url).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if fresh {
                    // Abort the whole transition: release the freshly
                    // built graph.
                    if let Some(graph) = inner.graph.take() {
                        graph.teardown();
                    }
                    inner.state = SessionState::NotStarted;
                }
                Err(e)
            }
        }
    }

    /// Detach the tap and close the link, keeping the capture graph alive.
    /// Calling stop when nothing is streaming is a no-op.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Active {
            debug!("stop with no active feed; nothing to do");
            return;
        }
        if let Some(graph) = inner.graph.as_ref() {
            graph.detach_tap();
        }
        if let Some(feed) = inner.feed.take() {
            feed.abort();
        }
        if let Some(mut link) = inner.link.take() {
            link.close().await;
        }
        inner.state = SessionState::Suspended;
        info!("transcription feed stopped; capture graph kept alive");
    }

    /// Full teardown, releasing the media stream. Only for when the
    /// hosting context goes away; a plain restart should use `stop`.
    pub async fn terminate(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(feed) = inner.feed.take() {
            feed.abort();
        }
        if let Some(mut link) = inner.link.take() {
            link.close().await;
        }
        if let Some(graph) = inner.graph.take() {
            graph.teardown();
        }
        inner.endpoint = None;
        inner.state = SessionState::NotStarted;

        // Back to NotStarted: a later start reports its own totals, not
        // this session's.
        *self.started_at.lock().unwrap() = None;
        self.frames_streamed.store(0, Ordering::Relaxed);
        self.update_count.store(0, Ordering::Relaxed);

        info!("session terminated");
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn capture_status(&self) -> CaptureStatus {
        match self.inner.lock().await.graph.as_ref() {
            None => CaptureStatus::Idle,
            Some(graph) => graph.status(),
        }
    }

    pub async fn link_state(&self) -> LinkState {
        self.inner
            .lock()
            .await
            .link
            .as_ref()
            .map(|link| link.state())
            .unwrap_or(LinkState::Closed)
    }

    /// Id of the monitor wiring, stable for the graph's lifetime.
    pub async fn playback_id(&self) -> Option<Uuid> {
        self.inner
            .lock()
            .await
            .graph
            .as_ref()
            .map(|graph| graph.playback().id())
    }

    /// Blocks delivered to monitor playback so far.
    pub async fn frames_played(&self) -> u64 {
        self.inner
            .lock()
            .await
            .graph
            .as_ref()
            .map(|graph| graph.playback().frames_played())
            .unwrap_or(0)
    }

    /// The accumulated transcript (all surfaced update events).
    pub fn transcript(&self) -> Vec<UpdateEvent> {
        self.entries.lock().unwrap().clone()
    }

    pub async fn stats(&self) -> SessionStats {
        let inner = self.inner.lock().await;
        let started_at = *self.started_at.lock().unwrap();
        SessionStats {
            state: inner.state,
            tab: inner.graph.as_ref().map(|graph| graph.tab().title.clone()),
            endpoint_url: inner.endpoint.clone(),
            started_at,
            duration_secs: started_at
                .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
                .unwrap_or(0.0),
            frames_streamed: self.frames_streamed.load(Ordering::Relaxed),
            update_events: self.update_count.load(Ordering::Relaxed),
            link_open: inner
                .link
                .as_ref()
                .map(|link| link.state() == LinkState::Open)
                .unwrap_or(false),
        }
    }

    /// Build the capture graph if none exists. Idempotent: an existing
    /// graph is left untouched.
    async fn ensure_graph(&self, inner: &mut Inner) -> Result<(), OrchestrationError> {
        if inner.graph.is_some() {
            return Ok(());
        }
        let tab = self.resolve_tab().await?;
        info!("capturing tab '{}' ({})", tab.title, tab.id);

        let stream = self
            .registry
            .capture(&tab.id, self.config.block_size)
            .await?;
        let sink = self.build_monitor();
        inner.graph = Some(CaptureGraph::build(tab, stream, sink));
        Ok(())
    }

    /// Close any existing link, open a fresh one, and (re)attach the tap.
    async fn reconnect(
        &self,
        inner: &mut Inner,
        endpoint_url: &str,
    ) -> Result<(), OrchestrationError> {
        let Inner {
            graph: Some(graph),
            link,
            feed,
            state,
            endpoint,
        } = inner
        else {
            return Err(OrchestrationError::NoAudibleTab);
        };

        // At most one live link: close-before-open.
        if let Some(mut old) = link.take() {
            old.close().await;
        }
        if let Some(old_feed) = feed.take() {
            old_feed.abort();
        }
        graph.detach_tap();

        let encoder = FrameEncoder::new(self.config.encoding, self.config.target_sample_rate);
        let wire_rate = encoder.wire_sample_rate(graph.sample_rate());

        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let new_link = match TransportLink::open(endpoint_url, wire_rate, inbound_tx).await {
            Ok(new_link) => new_link,
            Err(e) => {
                // The graph stays alive so a later start can retry
                // without re-acquiring the stream.
                *state = SessionState::Suspended;
                return Err(e.into());
            }
        };
        self.spawn_dispatch(inbound_rx);

        let tap = graph.attach_tap();
        *feed = Some(self.spawn_feed(tap, encoder, new_link.sender()));
        *endpoint = Some(endpoint_url.to_string());
        *link = Some(new_link);
        *state = SessionState::Active;

        {
            let mut started = self.started_at.lock().unwrap();
            if started.is_none() {
                *started = Some(Utc::now());
            }
        }

        info!("session active: streaming to {}", endpoint_url);
        Ok(())
    }

    /// Prefer the active audible target, else the first audible one.
    async fn resolve_tab(&self) -> Result<TabInfo, OrchestrationError> {
        let tabs = self.registry.tabs().await;
        tabs.iter()
            .find(|tab| tab.active && tab.audible)
            .or_else(|| tabs.iter().find(|tab| tab.audible))
            .cloned()
            .ok_or(OrchestrationError::NoAudibleTab)
    }

    fn build_monitor(&self) -> Arc<dyn PlaybackSink> {
        if self.config.monitor {
            match CpalMonitor::open() {
                Ok(monitor) => {
                    info!("monitor playback on '{}'", monitor.device());
                    return Arc::new(monitor);
                }
                Err(e) => warn!("monitor playback unavailable: {}", e),
            }
        }
        Arc::new(NullMonitor::new())
    }

    /// Forward tap blocks through the encoder into the link until the tap
    /// is detached.
    fn spawn_feed(
        &self,
        mut tap: TapHandle,
        encoder: FrameEncoder,
        sender: LinkSender,
    ) -> JoinHandle<()> {
        let counter = Arc::clone(&self.frames_streamed);
        tokio::spawn(async move {
            while let Some(frame) = tap.frames.recv().await {
                let packet = encoder.encode(&frame);
                sender.send(packet);
                counter.fetch_add(1, Ordering::Relaxed);
            }
            debug!("processing tap detached; feed loop done");
        })
    }

    /// Classify inbound messages and surface the keepers to subscribers.
    /// The task ends on its own when the link that feeds it closes.
    fn spawn_dispatch(&self, mut inbound: mpsc::Receiver<InboundMessage>) {
        let updates = self.updates.clone();
        let entries = Arc::clone(&self.entries);
        let count = Arc::clone(&self.update_count);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                match UpdateEvent::classify(&message) {
                    Some(event) => {
                        entries.lock().unwrap().push(event.clone());
                        count.fetch_add(1, Ordering::Relaxed);
                        // No subscribers is fine; the transcript still
                        // accumulates.
                        let _ = updates.send(event);
                    }
                    None => debug!("discarding inbound message with no usable content"),
                }
            }
        });
    }
}
