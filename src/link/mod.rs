//! Wire protocol and WebSocket transport for the transcription feed.

pub mod messages;
pub mod transport;

pub use messages::{ContextBody, InboundMessage, OutboundMessage};
pub use transport::{LinkSender, LinkState, TransportLink};
