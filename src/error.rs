//! Error taxonomy for capture, link, and orchestration failures.
//!
//! Per-frame send failures and malformed inbound payloads are deliberately
//! absent: both are logged and dropped where they occur and never surface
//! as error values.

use thiserror::Error;

/// Failures while acquiring a tab's media stream.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The audio host refused the capture (missing permission, device busy,
    /// unsupported stream configuration).
    #[error("capture permission denied: {0}")]
    PermissionDenied(String),

    /// The requested capture target no longer exists.
    #[error("capture target is gone")]
    NoTargetTab,
}

/// Failures on the transcription link.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("failed to connect to {url}: {reason}")]
    ConnectFailed { url: String, reason: String },
}

/// Failures surfaced by session start.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// No capture target is currently producing audio.
    #[error("no audible tab to capture")]
    NoAudibleTab,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Link(#[from] LinkError),
}
