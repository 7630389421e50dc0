pub mod audio;
pub mod backend;
pub mod config;
pub mod http;
pub mod session;

pub use audio::{bar_heights, CaptureClaim, VisualizerConfig};
pub use backend::{
    BackendError, BackendEvent, BackendMode, ErrorKind, FallbackSimulator, RemoteBackend,
    SimulatorTiming, VoiceBackend,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{
    ConversationLog, ConversationTurn, ErrorRecord, SessionConfig, SessionController,
    SessionSnapshot, SessionState, Speaker,
};
