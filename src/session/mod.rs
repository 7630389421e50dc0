//! Voice conversation session management
//!
//! This module provides the `SessionController` abstraction that manages:
//! - The session state machine (idle/initiating/listening/speaking)
//! - Backend selection at initiation (real gateway vs fallback simulator)
//! - The append-only conversation log
//! - Audio-level visualization state
//! - Unconditional teardown of timers, subscriptions, and the capture claim

mod config;
mod controller;
mod log;
mod state;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use log::{ConversationLog, ConversationTurn, Speaker};
pub use state::{ErrorRecord, SessionSnapshot, SessionState};
