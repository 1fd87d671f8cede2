//! Capture targets backed by cpal input devices.
//!
//! Each input device exposed by the audio host is one capture target:
//! `audible` means the device currently reports a usable input
//! configuration, `active` marks the host's default input device.

use std::time::Instant;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, SupportedStreamConfig};
use tokio::sync::mpsc;
use tracing::{error, warn};

use super::tab::{AudioFrame, MediaStream, StreamGuard, TabId, TabInfo, TabRegistry};
use crate::error::CaptureError;

pub struct DeviceTabs;

impl DeviceTabs {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeviceTabs {
    fn default() -> Self {
        Self::new()
    }
}

fn device_name(device: &Device) -> String {
    device
        .description()
        .ok()
        .map(|desc| desc.name().to_string())
        .unwrap_or_else(|| "unknown device".to_string())
}

#[async_trait]
impl TabRegistry for DeviceTabs {
    async fn tabs(&self) -> Vec<TabInfo> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().map(|d| device_name(&d));
        let devices = match host.input_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("failed to enumerate input devices: {}", e);
                return Vec::new();
            }
        };
        devices
            .map(|device| {
                let name = device_name(&device);
                TabInfo {
                    id: TabId(name.clone()),
                    audible: device.default_input_config().is_ok(),
                    active: Some(&name) == default_name.as_ref(),
                    title: name,
                }
            })
            .collect()
    }

    async fn capture(&self, tab: &TabId, block_size: usize) -> Result<MediaStream, CaptureError> {
        let tab = tab.clone();
        // Device discovery and stream setup can block on the audio host.
        tokio::task::spawn_blocking(move || open_device_stream(&tab, block_size))
            .await
            .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?
    }
}

fn open_device_stream(tab: &TabId, block_size: usize) -> Result<MediaStream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .input_devices()
        .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?
        .find(|d| device_name(d) == tab.0)
        .ok_or(CaptureError::NoTargetTab)?;
    let config = device
        .default_input_config()
        .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;
    let sample_rate = config.sample_rate();

    let (frame_tx, frame_rx) = mpsc::channel(32);
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

    // The cpal stream is not Send, so it lives on its own thread for as
    // long as the media stream is held.
    std::thread::spawn(move || {
        let stream = match build_input_stream(&device, &config, block_size, frame_tx) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        if let Err(e) = stream.play() {
            let _ = ready_tx.send(Err(CaptureError::PermissionDenied(e.to_string())));
            return;
        }
        let _ = ready_tx.send(Ok(()));
        // Park until the stream guard is dropped.
        let _ = stop_rx.recv();
        drop(stream);
    });

    ready_rx
        .recv()
        .map_err(|_| CaptureError::PermissionDenied("capture thread exited".to_string()))??;

    Ok(MediaStream {
        sample_rate,
        frames: frame_rx,
        guard: StreamGuard::new(move || {
            let _ = stop_tx.send(());
        }),
    })
}

/// Accumulates interleaved device samples into mono blocks, handing each
/// completed block to the frame channel. Runs on the real-time audio
/// thread: never blocks, drops blocks if the channel is full.
struct BlockAccumulator {
    pending: Vec<f32>,
    mix_acc: f32,
    mix_phase: usize,
    channels: usize,
    block_size: usize,
    sample_rate: u32,
    started: Instant,
    tx: mpsc::Sender<AudioFrame>,
}

impl BlockAccumulator {
    fn new(channels: usize, block_size: usize, sample_rate: u32, tx: mpsc::Sender<AudioFrame>) -> Self {
        Self {
            pending: Vec::with_capacity(block_size),
            mix_acc: 0.0,
            mix_phase: 0,
            channels,
            block_size,
            sample_rate,
            started: Instant::now(),
            tx,
        }
    }

    fn push(&mut self, samples: impl Iterator<Item = f32>) {
        for sample in samples {
            self.mix_acc += sample;
            self.mix_phase += 1;
            if self.mix_phase < self.channels {
                continue;
            }
            self.pending.push(self.mix_acc / self.channels as f32);
            self.mix_acc = 0.0;
            self.mix_phase = 0;

            if self.pending.len() >= self.block_size {
                let samples =
                    std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                let frame = AudioFrame {
                    samples,
                    sample_rate: self.sample_rate,
                    timestamp_ms: self.started.elapsed().as_millis() as u64,
                };
                let _ = self.tx.try_send(frame);
            }
        }
    }
}

fn build_input_stream(
    device: &Device,
    config: &SupportedStreamConfig,
    block_size: usize,
    tx: mpsc::Sender<AudioFrame>,
) -> Result<Stream, CaptureError> {
    let channels = config.channels() as usize;
    let sample_rate = config.sample_rate();
    let mut acc = BlockAccumulator::new(channels, block_size, sample_rate, tx);
    let stream_config = config.config();

    let stream = match config.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                acc.push(data.iter().copied());
            },
            |err| error!("input stream error: {}", err),
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                acc.push(data.iter().map(|&s| s as f32 / i16::MAX as f32));
            },
            |err| error!("input stream error: {}", err),
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                acc.push(data.iter().map(|&s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0));
            },
            |err| error!("input stream error: {}", err),
            None,
        ),
        other => {
            return Err(CaptureError::PermissionDenied(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    };

    stream.map_err(|e| CaptureError::PermissionDenied(e.to_string()))
}
