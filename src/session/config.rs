use serde::{Deserialize, Serialize};

use crate::audio::EncodingMode;

/// Configuration for a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default transcription server endpoint (ws:// or wss://)
    pub endpoint_url: String,

    /// Samples per processing-tap block
    pub block_size: usize,

    /// Wire encoding policy
    pub encoding: EncodingMode,

    /// Resample target for the pcm16 encoding (Whisper expects 16kHz)
    pub target_sample_rate: u32,

    /// Play captured audio on the default output device
    pub monitor: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "ws://localhost:8765".to_string(),
            block_size: 16_384,
            encoding: EncodingMode::Float32,
            target_sample_rate: 16_000, // Whisper expects 16kHz
            monitor: true,
        }
    }
}
