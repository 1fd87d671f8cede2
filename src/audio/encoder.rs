//! Wire encoding for captured audio blocks.
//!
//! Two policies, chosen at configuration time:
//! - `Pcm16`: linear resample to a fixed target rate, then signed 16-bit
//!   little-endian. The metadata handshake declares the target rate.
//! - `Float32`: hardware-rate f32 little-endian passthrough. The metadata
//!   handshake declares the hardware rate so the server can resample.

use serde::{Deserialize, Serialize};

use super::tab::AudioFrame;

/// Wire encoding policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    Pcm16,
    Float32,
}

/// Converts captured frames into wire packets.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    mode: EncodingMode,
    target_rate: u32,
}

impl FrameEncoder {
    pub fn new(mode: EncodingMode, target_rate: u32) -> Self {
        Self { mode, target_rate }
    }

    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    /// The sample rate declared in the metadata handshake.
    pub fn wire_sample_rate(&self, hardware_rate: u32) -> u32 {
        match self.mode {
            EncodingMode::Pcm16 => self.target_rate,
            EncodingMode::Float32 => hardware_rate,
        }
    }

    /// Encode one frame. An empty frame yields an empty packet.
    pub fn encode(&self, frame: &AudioFrame) -> Vec<u8> {
        match self.mode {
            EncodingMode::Float32 => frame
                .samples
                .iter()
                .flat_map(|s| s.to_le_bytes())
                .collect(),
            EncodingMode::Pcm16 => {
                let resampled =
                    resample_linear(&frame.samples, frame.sample_rate, self.target_rate);
                resampled
                    .iter()
                    .flat_map(|&s| quantize_i16(s).to_le_bytes())
                    .collect()
            }
        }
    }
}

/// Linear-interpolation resample.
///
/// Output length is `round(len * target / source)`; the fractional read
/// position interpolates adjacent samples and repeats the last sample at
/// the end of the buffer.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if samples.is_empty() || source_rate == target_rate {
        return samples.to_vec();
    }

    let out_len =
        (samples.len() as f64 * target_rate as f64 / source_rate as f64).round() as usize;
    let step = source_rate as f64 / target_rate as f64;
    let last = samples.len() - 1;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = (pos.floor() as usize).min(last);
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx];
        let b = samples[(idx + 1).min(last)];
        out.push(a + (b - a) * frac);
    }
    out
}

/// Quantize one sample to signed 16-bit.
///
/// Asymmetric scaling so that 1.0 maps to 32767 and -1.0 to -32768.
pub fn quantize_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    let scale = if clamped < 0.0 { 32768.0 } else { 32767.0 };
    (clamped * scale).round() as i16
}
