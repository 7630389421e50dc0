use super::state::AppState;
use crate::backend::BackendMode;
use crate::session::{ConversationTurn, SessionConfig, SessionController, SessionState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub mode: BackendMode,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub state: SessionState,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct CloseSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub session_id: String,
    pub state: SessionState,
    pub mode: Option<BackendMode>,
    pub is_listening: bool,
    pub is_speaking: bool,
    pub error_message: Option<String>,
    pub turn_count: usize,
    pub bar_heights: Vec<f32>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: String,
    pub turns: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn not_found(session_id: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session {} not found", session_id),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/sessions
/// Create a new voice session and initiate it (choosing real vs fallback backend)
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("voice-{}", uuid::Uuid::new_v4()));

    info!("Creating voice session: {}", session_id);

    // Check for an existing session with this ID
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&session_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Session {} already exists", session_id),
                }),
            )
                .into_response();
        }
    }

    let config = SessionConfig::for_service(&state.config.voice, session_id.clone());
    let controller = Arc::new(SessionController::new(config));

    // Initiate never fails on backend problems: a missing credential or an
    // unreachable gateway resolves to the fallback simulator.
    let mode = match controller.initiate().await {
        Ok(mode) => mode,
        Err(e) => {
            error!("Failed to initiate session: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to initiate session: {}", e),
                }),
            )
                .into_response();
        }
    };

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(session_id.clone(), controller);
    }

    info!("Voice session {} initiated (mode: {:?})", session_id, mode);

    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            mode,
            status: "initiated".to_string(),
        }),
    )
        .into_response()
}

/// POST /voice/sessions/:session_id/turn
/// Begin capturing a user turn (no-op if a turn is already in progress)
pub async fn start_turn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let controller = {
        let sessions = state.sessions.read().await;
        sessions.get(&session_id).cloned()
    };

    match controller {
        Some(controller) => {
            if let Err(e) = controller.start_turn().await {
                error!("Failed to start turn: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: format!("Failed to start turn: {}", e),
                    }),
                )
                    .into_response();
            }

            let snapshot = controller.snapshot();
            (
                StatusCode::OK,
                Json(TurnResponse {
                    session_id,
                    state: snapshot.state,
                    status: "turn_requested".to_string(),
                }),
            )
                .into_response()
        }
        None => not_found(&session_id),
    }
}

/// POST /voice/sessions/:session_id/close
/// Tear the session down unconditionally and forget it
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Closing voice session: {}", session_id);

    let controller = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    match controller {
        Some(controller) => {
            if let Err(e) = controller.close().await {
                error!("Failed to close session: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: format!("Failed to close session: {}", e),
                    }),
                )
                    .into_response();
            }

            (
                StatusCode::OK,
                Json(CloseSessionResponse {
                    session_id,
                    status: "closed".to_string(),
                }),
            )
                .into_response()
        }
        None => not_found(&session_id),
    }
}

/// GET /voice/sessions/:session_id/status
/// Current session status (without the transcript)
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(controller) => {
            let snapshot = controller.snapshot();
            (
                StatusCode::OK,
                Json(StatusResponse {
                    session_id,
                    state: snapshot.state,
                    mode: snapshot.mode,
                    is_listening: snapshot.is_listening,
                    is_speaking: snapshot.is_speaking,
                    error_message: snapshot.error_message,
                    turn_count: snapshot.turns.len(),
                    bar_heights: snapshot.bar_heights,
                }),
            )
                .into_response()
        }
        None => not_found(&session_id),
    }
}

/// GET /voice/sessions/:session_id/transcript
/// Ordered conversation turns accumulated so far
pub async fn session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(controller) => {
            let snapshot = controller.snapshot();
            (
                StatusCode::OK,
                Json(TranscriptResponse {
                    session_id,
                    turns: snapshot.turns,
                }),
            )
                .into_response()
        }
        None => not_found(&session_id),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
