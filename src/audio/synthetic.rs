//! Generated capture targets for tests and offline runs, the counterpart
//! of a file-backed source: deterministic blocks at a fixed rate, no audio
//! hardware required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::tab::{AudioFrame, MediaStream, StreamGuard, TabId, TabInfo, TabRegistry};
use crate::error::CaptureError;

/// Registry of in-memory targets emitting constant-valued blocks on a
/// timer.
pub struct SyntheticTabs {
    tabs: Vec<TabInfo>,
    sample_rate: u32,
    amplitude: f32,
    block_interval: Duration,
    captures: AtomicUsize,
    deny: bool,
}

impl SyntheticTabs {
    pub fn new(tabs: Vec<TabInfo>) -> Self {
        Self {
            tabs,
            sample_rate: 48_000,
            amplitude: 0.25,
            block_interval: Duration::from_millis(10),
            captures: AtomicUsize::new(0),
            deny: false,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Make every capture attempt fail as if the host refused permission.
    pub fn deny_capture(mut self) -> Self {
        self.deny = true;
        self
    }

    /// How many times a stream was acquired. Lets callers verify the
    /// fast-restart path does not reacquire.
    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TabRegistry for SyntheticTabs {
    async fn tabs(&self) -> Vec<TabInfo> {
        self.tabs.clone()
    }

    async fn capture(&self, tab: &TabId, block_size: usize) -> Result<MediaStream, CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied(
                "synthetic capture refused".to_string(),
            ));
        }
        if !self.tabs.iter().any(|t| &t.id == tab) {
            return Err(CaptureError::NoTargetTab);
        }
        self.captures.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(32);
        let sample_rate = self.sample_rate;
        let amplitude = self.amplitude;
        let interval = self.block_interval;
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: vec![amplitude; block_size],
                    sample_rate,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(MediaStream {
            sample_rate,
            frames: rx,
            guard: StreamGuard::new(move || task.abort()),
        })
    }
}
