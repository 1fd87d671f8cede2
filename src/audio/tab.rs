use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CaptureError;

/// Identifier of a capture target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabId(pub String);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A capture target as seen by the registry.
#[derive(Debug, Clone)]
pub struct TabInfo {
    pub id: TabId,

    /// Human-readable name shown in listings.
    pub title: String,

    /// Whether this is the currently focused/default target.
    pub active: bool,

    /// Whether the target is currently able to produce audio.
    pub audible: bool,
}

/// One block of captured audio at the hardware sample rate.
///
/// Frames are produced once per block by the capture backend and never
/// mutated afterwards; ownership moves into the encoder.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,

    /// Hardware sample rate in Hz.
    pub sample_rate: u32,

    /// Milliseconds since the capture started.
    pub timestamp_ms: u64,
}

/// Runs its cleanup closure when dropped, releasing the capture source.
pub struct StreamGuard(Mutex<Option<Box<dyn FnOnce() + Send>>>);

impl StreamGuard {
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        Self(Mutex::new(Some(Box::new(stop))))
    }

    pub fn noop() -> Self {
        Self(Mutex::new(None))
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if let Some(stop) = self.0.lock().unwrap().take() {
            stop();
        }
    }
}

impl fmt::Debug for StreamGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamGuard")
    }
}

/// An acquired media stream: fixed-size audio blocks plus the hardware
/// sample rate they were captured at. Dropping the stream releases the
/// underlying source.
#[derive(Debug)]
pub struct MediaStream {
    pub sample_rate: u32,
    pub frames: mpsc::Receiver<AudioFrame>,
    pub guard: StreamGuard,
}

/// Source of capture targets.
///
/// Implementations:
/// - `DeviceTabs`: audio input devices via cpal
/// - `SyntheticTabs`: generated audio for tests and batch runs
#[async_trait]
pub trait TabRegistry: Send + Sync {
    /// Enumerate capture targets. Enumeration problems are logged and
    /// yield an empty list rather than an error.
    async fn tabs(&self) -> Vec<TabInfo>;

    /// Acquire the media stream for one target, delivering blocks of
    /// `block_size` samples.
    async fn capture(&self, tab: &TabId, block_size: usize) -> Result<MediaStream, CaptureError>;
}
