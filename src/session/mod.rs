//! Capture-session orchestration
//!
//! This module provides the `TabSession` abstraction that manages:
//! - Target resolution (which tab to capture)
//! - The capture graph lifecycle, independent of the network link
//! - The transcription link lifecycle, including fast restart
//! - Classification of inbound messages into UI update events
//! - Session statistics and the accumulated transcript

mod config;
mod events;
mod session;
mod stats;

pub use config::SessionConfig;
pub use events::{UpdateEvent, UpdateKind};
pub use session::{SessionState, TabSession};
pub use stats::SessionStats;
