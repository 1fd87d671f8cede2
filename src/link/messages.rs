use serde::{Deserialize, Serialize};

/// Client → server messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// One-time handshake declaring the encoding sample rate.
    Metadata {
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
    },
    /// One encoded audio block.
    Audio {
        /// Base64 of the little-endian sample bytes.
        data: String,
    },
}

/// Structured payload attached to a `context_partial` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBody {
    pub context: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub source_len: Option<u64>,
}

/// Server → client messages. Unrecognized `type` tags land in `Unknown`
/// and are ignored upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Transcription {
        text: String,
        #[serde(default)]
        timestamp: Option<String>,
    },
    ContextPartial {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        json: Option<ContextBody>,
    },
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Context content with the documented precedence: the nested
    /// `json.context` field wins, the plain `text` field is the fallback.
    pub fn context_text(&self) -> Option<&str> {
        match self {
            InboundMessage::ContextPartial { text, json } => json
                .as_ref()
                .map(|body| body.context.as_str())
                .or(text.as_deref()),
            _ => None,
        }
    }
}
