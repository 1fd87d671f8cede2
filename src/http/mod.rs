//! HTTP API server for external control (the popup/UI collaborator)
//!
//! This module provides a REST API for controlling the capture session:
//! - POST /capture/start - Start (or restart) streaming
//! - POST /capture/stop - Stop streaming, keep the capture graph
//! - POST /capture/terminate - Full teardown
//! - GET /capture/status - Query session status
//! - GET /capture/transcript - Get accumulated update events
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
