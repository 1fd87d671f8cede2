use super::state::AppState;
use crate::error::OrchestrationError;
use crate::session::{SessionStats, UpdateEvent};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartCaptureRequest {
    /// Optional endpoint URL (if not provided, use the last-used one)
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartCaptureResponse {
    pub status: String,
    pub endpoint_url: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopCaptureResponse {
    pub status: String,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /capture/start
/// Start (or restart) streaming to the transcription server
pub async fn start_capture(
    State(state): State<AppState>,
    Json(req): Json<StartCaptureRequest>,
) -> impl IntoResponse {
    // Use the provided endpoint or fall back to the persisted one
    let endpoint_url = match req.endpoint_url {
        Some(url) => url,
        None => {
            let settings = state.settings.lock().await;
            match settings.last_endpoint_url.clone() {
                Some(url) => url,
                None => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse {
                            error: "no endpoint_url given and none stored".to_string(),
                        }),
                    )
                        .into_response();
                }
            }
        }
    };

    info!("start requested for endpoint: {}", endpoint_url);

    if let Err(e) = state.session.start(&endpoint_url).await {
        error!("failed to start capture: {}", e);
        let status = match e {
            OrchestrationError::NoAudibleTab => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return (
            status,
            Json(ErrorResponse {
                error: format!("Failed to start capture: {}", e),
            }),
        )
            .into_response();
    }

    // Remember the endpoint for the next start
    {
        let mut settings = state.settings.lock().await;
        settings.last_endpoint_url = Some(endpoint_url.clone());
        if let Err(e) = settings.save(&state.settings_path) {
            warn!("failed to persist settings: {}", e);
        }
    }

    (
        StatusCode::OK,
        Json(StartCaptureResponse {
            status: "capturing".to_string(),
            endpoint_url: endpoint_url.clone(),
            message: format!("Streaming to {}", endpoint_url),
        }),
    )
        .into_response()
}

/// POST /capture/stop
/// Stop streaming; the capture graph stays alive for a fast restart
pub async fn stop_capture(State(state): State<AppState>) -> impl IntoResponse {
    info!("stop requested");

    state.session.stop().await;
    let stats = state.session.stats().await;

    (
        StatusCode::OK,
        Json(StopCaptureResponse {
            status: "suspended".to_string(),
            message: "Streaming stopped; capture kept alive".to_string(),
            stats,
        }),
    )
        .into_response()
}

/// POST /capture/terminate
/// Full teardown, releasing the media stream
pub async fn terminate_capture(State(state): State<AppState>) -> impl IntoResponse {
    info!("terminate requested");

    state.session.terminate().await;
    let stats = state.session.stats().await;

    (
        StatusCode::OK,
        Json(StopCaptureResponse {
            status: "not_started".to_string(),
            message: "Session terminated".to_string(),
            stats,
        }),
    )
        .into_response()
}

/// GET /capture/status
/// Get status of the capture session
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.session.stats().await;
    (StatusCode::OK, Json(stats)).into_response()
}

/// GET /capture/transcript
/// Get the accumulated update events
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let transcript: Vec<UpdateEvent> = state.session.transcript();
    (StatusCode::OK, Json(transcript)).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
