use std::time::Duration;
use uuid::Uuid;

use crate::audio::VisualizerConfig;
use crate::backend::SimulatorTiming;
use crate::config::{VoiceConfig, API_KEY_ENV};

/// Configuration for a voice conversation session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "voice-<uuid>")
    pub session_id: String,

    /// NATS URL of the remote voice gateway
    pub gateway_url: String,

    /// Gateway credential. Absence is a configuration error at `initiate()`
    /// and triggers the fallback simulator rather than a hard failure.
    pub api_key: Option<String>,

    /// How long to wait for the gateway to accept a call
    pub call_timeout: Duration,

    /// Waveform visualization knobs
    pub visualizer: VisualizerConfig,

    /// Fallback simulator timing knobs
    pub timing: SimulatorTiming,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("voice-{}", Uuid::new_v4()),
            gateway_url: "nats://localhost:4222".to_string(),
            api_key: None,
            call_timeout: Duration::from_secs(10),
            visualizer: VisualizerConfig::default(),
            timing: SimulatorTiming::default(),
        }
    }
}

impl SessionConfig {
    /// Build a session config from the service configuration, picking up the
    /// credential from the environment.
    pub fn for_service(voice: &VoiceConfig, session_id: String) -> Self {
        Self {
            session_id,
            gateway_url: voice.gateway_url.clone(),
            api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()),
            call_timeout: Duration::from_secs(voice.call_timeout_secs),
            visualizer: VisualizerConfig {
                bar_count: voice.bar_count,
                ..Default::default()
            },
            timing: SimulatorTiming {
                greeting_delay: Duration::from_millis(voice.greeting_delay_ms),
                thinking_delay: Duration::from_millis(voice.thinking_delay_ms),
                ..Default::default()
            },
        }
    }
}
