//! The capture graph: media stream → monitor playback, with a detachable
//! processing tap.
//!
//! The monitor wiring is permanent for the graph's lifetime; the tap is
//! attached and detached as the transcription feed is toggled. Keeping the
//! two paths independent is what lets playback continue across feed
//! restarts.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use super::monitor::PlaybackSink;
use super::tab::{AudioFrame, MediaStream, StreamGuard, TabInfo};

/// Lifecycle of the capture graph as a whole. `Idle` means no graph has
/// been built yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Idle,
    Capturing,
    Suspended,
}

/// Handle to the permanent monitor wiring. The id is assigned when the
/// graph is built and stays stable across tap detach/attach cycles.
#[derive(Clone)]
pub struct PlaybackHandle {
    id: Uuid,
    sink: Arc<dyn PlaybackSink>,
}

impl PlaybackHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn frames_played(&self) -> u64 {
        self.sink.frames_played()
    }
}

/// Receiving end of the processing tap. Delivers one `AudioFrame` per
/// captured block until the tap is detached.
pub struct TapHandle {
    pub frames: mpsc::Receiver<AudioFrame>,
}

// Blocks buffered between the pump and the feed loop. The feed encodes and
// hands off quickly, so a short queue is enough; overflow drops blocks
// rather than stalling playback.
const TAP_QUEUE_BLOCKS: usize = 32;

/// Owns an acquired media stream and fans its blocks out to the monitor
/// (always) and the processing tap (when attached).
pub struct CaptureGraph {
    tab: TabInfo,
    sample_rate: u32,
    playback: PlaybackHandle,
    tap_slot: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
    pump: JoinHandle<()>,
    _stream: StreamGuard,
}

impl CaptureGraph {
    /// Build the permanent wiring over an acquired stream and start the
    /// pump task.
    pub fn build(tab: TabInfo, stream: MediaStream, sink: Arc<dyn PlaybackSink>) -> Self {
        let MediaStream {
            sample_rate,
            mut frames,
            guard,
        } = stream;

        let playback = PlaybackHandle {
            id: Uuid::new_v4(),
            sink,
        };
        let tap_slot: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>> = Arc::new(Mutex::new(None));

        let pump_sink = Arc::clone(&playback.sink);
        let pump_slot = Arc::clone(&tap_slot);
        let pump = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                pump_sink.play(&frame);
                let tap = pump_slot.lock().unwrap().clone();
                if let Some(tap) = tap {
                    if tap.try_send(frame).is_err() {
                        debug!("tap queue full; dropping block");
                    }
                }
            }
            debug!("media stream ended; pump exiting");
        });

        Self {
            tab,
            sample_rate,
            playback,
            tap_slot,
            pump,
            _stream: guard,
        }
    }

    pub fn tab(&self) -> &TabInfo {
        &self.tab
    }

    /// Hardware rate of the captured stream.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn playback(&self) -> &PlaybackHandle {
        &self.playback
    }

    pub fn status(&self) -> CaptureStatus {
        if self.tap_slot.lock().unwrap().is_some() {
            CaptureStatus::Capturing
        } else {
            CaptureStatus::Suspended
        }
    }

    /// Create or reconnect the processing tap. Block delivery resumes on
    /// the returned handle; any previous tap stops receiving.
    pub fn attach_tap(&self) -> TapHandle {
        let (tx, rx) = mpsc::channel(TAP_QUEUE_BLOCKS);
        *self.tap_slot.lock().unwrap() = Some(tx);
        TapHandle { frames: rx }
    }

    /// Disconnect the tap and stop block delivery. The monitor path is
    /// unaffected. Detaching an already-detached tap is a no-op.
    pub fn detach_tap(&self) {
        self.tap_slot.lock().unwrap().take();
    }

    /// Full teardown: detach the tap, stop the pump, release the stream.
    pub fn teardown(self) {
        self.detach_tap();
        self.pump.abort();
        // The stream guard drops here, releasing the capture source.
    }
}
