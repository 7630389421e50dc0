//! Voice backends
//!
//! The session controller drives exactly one backend per session:
//! - [`RemoteBackend`]: the real voice gateway, reached over NATS
//! - [`FallbackSimulator`]: a deterministic-shape offline stand-in used when
//!   the real backend cannot be constructed
//!
//! Both speak the same normalized event contract ([`BackendEvent`]) over the
//! controller's event queue, so the controller never branches on transport
//! details.

pub mod messages;
mod remote;
mod simulator;

pub use remote::RemoteBackend;
pub use simulator::{FallbackSimulator, SimulatorTiming};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Scripted opening line, shared by the simulator and the assistant config
/// sent to the real gateway.
pub const GREETING: &str =
    "Hi, I'm Healbot, your personal healthcare assistant. How can I help you today?";

/// Which backend drives the session. Decided once at `initiate()` and fixed
/// for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    RealBackend,
    Fallback,
}

/// Error taxonomy at the backend boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing/invalid credential; non-fatal, triggers fallback
    Configuration,
    /// Backend failed to load or construct; non-fatal, triggers fallback
    BackendUnavailable,
    /// Backend reachable but the call failed to establish; user may retry
    Connection,
    /// Error emitted mid-call; ends the turn gracefully
    Runtime,
}

/// Typed failures surfaced by backend construction and call setup.
///
/// Never escapes the controller: each variant is converted into an
/// `ErrorRecord` with a short human-readable message before it reaches the
/// presentation boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("voice backend unavailable: {0}")]
    Unavailable(String),

    #[error("failed to establish call: {0}")]
    Connection(String),

    #[error("voice backend error: {0}")]
    Runtime(String),
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Configuration(_) => ErrorKind::Configuration,
            BackendError::Unavailable(_) => ErrorKind::BackendUnavailable,
            BackendError::Connection(_) => ErrorKind::Connection,
            BackendError::Runtime(_) => ErrorKind::Runtime,
        }
    }
}

/// Normalized event surface consumed by the session controller.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// The backend began capturing user speech
    CallStart,
    /// The backend finished capturing; a response is on the way
    CallEnd,
    /// The assistant started speaking
    SpeechStart,
    /// The assistant stopped speaking
    SpeechEnd,
    /// Instantaneous amplitude in `[0.0, 1.0]`
    VolumeLevel(f32),
    /// A user utterance was transcribed
    Transcript(String),
    /// The assistant produced a response
    AssistantResponse(String),
    /// A backend-originated error
    Error { kind: ErrorKind, message: String },
}

/// Sender half of the controller's event queue, handed to the active backend.
pub type EventSender = mpsc::UnboundedSender<BackendEvent>;

/// The seam between the session controller and whichever backend drives the
/// session. The controller is the only caller; it owns the backend exclusively
/// inside its event loop, so methods take `&mut self` without locking.
#[async_trait::async_trait]
pub trait VoiceBackend: Send {
    /// Which mode this backend represents.
    fn mode(&self) -> BackendMode;

    /// One-time arming after the backend is chosen. The simulator schedules
    /// its greeting here; the real backend has nothing to do.
    async fn activate(&mut self) {}

    /// Begin capturing/generating user speech for one turn.
    async fn begin_turn(&mut self) -> Result<(), BackendError>;

    /// Tear down: cancel timers, abort readers, release the capture claim.
    /// Best-effort and infallible; must be safe to call more than once.
    async fn stop(&mut self);
}
