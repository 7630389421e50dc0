use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::log::ConversationTurn;
use crate::audio::{bar_heights, VisualizerConfig};
use crate::backend::{BackendMode, ErrorKind};

/// The session state machine. Exactly one state is active at a time.
///
/// `Idle → Initiating → Idle → Listening → Speaking → Idle` is the normal
/// loop; `Error` is reachable from any active state; `Closed` is terminal for
/// the session (a fresh `initiate` may follow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Initiating,
    Listening,
    Speaking,
    Error,
    Closed,
}

/// A recorded backend failure, kept alongside the human-readable message the
/// presentation layer shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub occurred_during: SessionState,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view of the session, published over a `watch` channel after
/// every processed event batch. This is the presentation boundary: the UI
/// renders from it and never sees backend internals.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: SessionState,
    pub mode: Option<BackendMode>,
    pub turns: Vec<ConversationTurn>,
    pub bar_heights: Vec<f32>,
    pub error_message: Option<String>,
    pub last_error: Option<ErrorRecord>,
    pub is_listening: bool,
    pub is_speaking: bool,
    pub started_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Snapshot of a session that has not processed any event yet.
    pub fn initial(session_id: &str, visualizer: &VisualizerConfig) -> Self {
        Self {
            session_id: session_id.to_string(),
            state: SessionState::Idle,
            mode: None,
            turns: Vec::new(),
            bar_heights: bar_heights(visualizer, 0, 0.0, false),
            error_message: None,
            last_error: None,
            is_listening: false,
            is_speaking: false,
            started_at: Utc::now(),
        }
    }
}
