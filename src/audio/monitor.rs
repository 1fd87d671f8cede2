//! Local monitor playback for captured audio.
//!
//! The monitor is the permanent half of the capture graph: it keeps the
//! user hearing the tab whether or not the transcription feed is running.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tracing::error;

use super::encoder::resample_linear;
use super::tab::{AudioFrame, StreamGuard};
use crate::error::CaptureError;

/// Playback sink fed one block at a time by the graph's pump task.
pub trait PlaybackSink: Send + Sync {
    /// Queue one block. Must not block the caller.
    fn play(&self, frame: &AudioFrame);

    /// Blocks accepted for playback since the sink was opened.
    fn frames_played(&self) -> u64;
}

/// Discards audio while still tracking throughput. Used when monitoring is
/// disabled and as the test sink.
#[derive(Debug, Default)]
pub struct NullMonitor {
    played: AtomicU64,
}

impl NullMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackSink for NullMonitor {
    fn play(&self, _frame: &AudioFrame) {
        self.played.fetch_add(1, Ordering::Relaxed);
    }

    fn frames_played(&self) -> u64 {
        self.played.load(Ordering::Relaxed)
    }
}

// Upper bound on queued samples before old audio is dropped. Keeps the
// monitor from drifting unboundedly behind live capture.
const MAX_QUEUED_SAMPLES: usize = 48_000 * 2;

/// Monitor playback on the default output device.
pub struct CpalMonitor {
    queue: Arc<Mutex<VecDeque<f32>>>,
    played: AtomicU64,
    device_name: String,
    /// Rate of the output stream; captured blocks are resampled to it.
    output_rate: u32,
    _stream: StreamGuard,
}

impl CpalMonitor {
    /// Open the default output device and start the output stream on a
    /// dedicated thread (cpal streams are not Send). Stream build errors
    /// after device discovery degrade to silence and are logged.
    pub fn open() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| CaptureError::PermissionDenied("no output device".to_string()))?;
        let device_name = device
            .description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "unknown device".to_string());
        let config = device
            .default_output_config()
            .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;
        if config.sample_format() != SampleFormat::F32 {
            return Err(CaptureError::PermissionDenied(format!(
                "monitor output uses {:?}, expected f32",
                config.sample_format()
            )));
        }
        let output_rate = config.sample_rate();

        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let callback_queue = Arc::clone(&queue);
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        std::thread::spawn(move || {
            let channels = config.channels() as usize;
            let stream = device.build_output_stream(
                &config.config(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queue = callback_queue.lock().unwrap();
                    for slot in data.chunks_mut(channels) {
                        // Underrun plays silence; capture keeps running.
                        let sample = queue.pop_front().unwrap_or(0.0);
                        for channel in slot {
                            *channel = sample;
                        }
                    }
                },
                |err| error!("monitor stream error: {}", err),
                None,
            );
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    error!("failed to build monitor stream: {}", e);
                    return;
                }
            };
            if let Err(e) = stream.play() {
                error!("failed to start monitor stream: {}", e);
                return;
            }
            // Park until the monitor is dropped.
            let _ = stop_rx.recv();
            drop(stream);
        });

        Ok(Self {
            queue,
            played: AtomicU64::new(0),
            device_name,
            output_rate,
            _stream: StreamGuard::new(move || {
                let _ = stop_tx.send(());
            }),
        })
    }

    pub fn device(&self) -> &str {
        &self.device_name
    }
}

impl PlaybackSink for CpalMonitor {
    fn play(&self, frame: &AudioFrame) {
        // The output stream runs at the device rate, not the capture rate.
        let samples = resample_linear(&frame.samples, frame.sample_rate, self.output_rate);
        let mut queue = self.queue.lock().unwrap();
        if queue.len() > MAX_QUEUED_SAMPLES {
            queue.clear();
        }
        queue.extend(samples);
        self.played.fetch_add(1, Ordering::Relaxed);
    }

    fn frames_played(&self) -> u64 {
        self.played.load(Ordering::Relaxed)
    }
}
