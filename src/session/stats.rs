use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionState;

/// Statistics about a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Orchestration state
    pub state: SessionState,

    /// Title of the captured tab, if a graph exists
    pub tab: Option<String>,

    /// Endpoint of the current/last link
    pub endpoint_url: Option<String>,

    /// When streaming first became active
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since streaming first became active
    pub duration_secs: f64,

    /// Blocks encoded and handed to the link
    pub frames_streamed: usize,

    /// Update events surfaced to the UI so far
    pub update_events: usize,

    /// Whether the link is currently open
    pub link_open: bool,
}
