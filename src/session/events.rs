use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::link::InboundMessage;

/// What an update carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Transcription,
    ContextPartial,
}

/// One update surfaced to the UI layer. Append-only, ordered by arrival.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub kind: UpdateKind,
    pub text: String,

    /// Arrival time.
    pub timestamp: DateTime<Utc>,
}

// Context values the server emits when it has nothing to say. Compared
// case-insensitively after trimming.
const GARBAGE_CONTEXT: &[&str] = &["none", "null", "", "no relevant context extracted"];

impl UpdateEvent {
    /// Classify an inbound message into an update event. Returns `None`
    /// for unknown message types and for garbage-valued context, which
    /// must not reach the UI.
    pub fn classify(message: &InboundMessage) -> Option<UpdateEvent> {
        match message {
            InboundMessage::Transcription { text, .. } => Some(UpdateEvent {
                kind: UpdateKind::Transcription,
                text: text.clone(),
                timestamp: Utc::now(),
            }),
            InboundMessage::ContextPartial { .. } => {
                let text = message.context_text()?;
                let normalized = text.trim().to_lowercase();
                if GARBAGE_CONTEXT.contains(&normalized.as_str()) {
                    return None;
                }
                Some(UpdateEvent {
                    kind: UpdateKind::ContextPartial,
                    text: text.to_string(),
                    timestamp: Utc::now(),
                })
            }
            InboundMessage::Unknown => None,
        }
    }
}
