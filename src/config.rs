use anyhow::Result;
use serde::Deserialize;

/// Environment variable carrying the voice gateway credential. Absence is a
/// configuration error at `initiate()` and triggers the fallback simulator.
pub const API_KEY_ENV: &str = "HEALLINK_VOICE_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub voice: VoiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    /// NATS URL of the remote voice gateway
    pub gateway_url: String,

    /// Seconds to wait for the gateway to accept a call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Number of visualization bars
    #[serde(default = "default_bar_count")]
    pub bar_count: usize,

    /// Fallback simulator: delay before the scripted greeting
    #[serde(default = "default_greeting_delay_ms")]
    pub greeting_delay_ms: u64,

    /// Fallback simulator: pause before the assistant's response
    #[serde(default = "default_thinking_delay_ms")]
    pub thinking_delay_ms: u64,
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_bar_count() -> usize {
    30
}

fn default_greeting_delay_ms() -> u64 {
    500
}

fn default_thinking_delay_ms() -> u64 {
    1500
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
