//! Wire format spoken with the remote voice gateway.
//!
//! Call control is request/reply on fixed subjects; lifecycle events for an
//! accepted call arrive on a per-call subject. All payloads are JSON.

use serde::{Deserialize, Serialize};

use super::{BackendEvent, ErrorKind, GREETING};

/// Subject for establishing a call (request/reply)
pub const CALL_START_SUBJECT: &str = "voice.call.start";

/// Subject for best-effort call teardown
pub const CALL_STOP_SUBJECT: &str = "voice.call.stop";

/// Per-call subject carrying gateway events
pub fn call_event_subject(call_id: &str) -> String {
    format!("voice.call.{}.events", call_id)
}

/// System prompt for the healthcare assistant driven by the real gateway.
const SYSTEM_PROMPT: &str = "You are Healbot, a compassionate, secure, AI-powered \
healthcare assistant. Guide users through their healthcare needs, collect relevant \
non-sensitive information, and help them find and connect with appropriate healthcare \
providers near them. Do NOT provide medical advice, diagnosis, or treatment; your role \
is strictly to facilitate access to care. Be compassionate, calm, and professional. \
End every interaction by encouraging users to seek in-person care and to contact \
emergency services if their issue is urgent or life-threatening.";

/// Request to establish a call with the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    pub call_id: String,
    pub api_key: String,
    pub assistant: AssistantSpec,
}

impl CallRequest {
    pub fn new(call_id: &str, api_key: &str) -> Self {
        Self {
            call_id: call_id.to_string(),
            api_key: api_key.to_string(),
            assistant: AssistantSpec::healbot(),
        }
    }
}

/// Assistant configuration mirrored to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantSpec {
    pub name: String,
    pub model: ModelSpec,
    pub voice: VoiceSpec,
    pub transcriber: TranscriberSpec,
}

impl AssistantSpec {
    pub fn healbot() -> Self {
        Self {
            name: "Healbot Healthcare Assistant".to_string(),
            model: ModelSpec {
                provider: "openai".to_string(),
                model: "gpt-4".to_string(),
                system_prompt: SYSTEM_PROMPT.to_string(),
                greeting: GREETING.to_string(),
            },
            voice: VoiceSpec {
                provider: "playht".to_string(),
                voice_id: "jennifer".to_string(),
            },
            transcriber: TranscriberSpec {
                provider: "deepgram".to_string(),
                model: "nova-2".to_string(),
                language: "en-US".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
    pub system_prompt: String,
    pub greeting: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSpec {
    pub provider: String,
    pub voice_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberSpec {
    pub provider: String,
    pub model: String,
    pub language: String,
}

/// Gateway's reply to a `CallRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallReply {
    pub accepted: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Best-effort teardown notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStopRequest {
    pub call_id: String,
}

/// Events published by the gateway on the per-call subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GatewayEvent {
    CallStart,
    CallEnd,
    SpeechStart,
    SpeechEnd,
    VolumeLevel { level: f32 },
    Message { message: MessagePayload },
    Error { message: String },
}

/// Typed payload of a `message` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    Transcript { text: String },
    AssistantResponse { text: String },
}

impl From<GatewayEvent> for BackendEvent {
    fn from(event: GatewayEvent) -> Self {
        match event {
            GatewayEvent::CallStart => BackendEvent::CallStart,
            GatewayEvent::CallEnd => BackendEvent::CallEnd,
            GatewayEvent::SpeechStart => BackendEvent::SpeechStart,
            GatewayEvent::SpeechEnd => BackendEvent::SpeechEnd,
            GatewayEvent::VolumeLevel { level } => BackendEvent::VolumeLevel(level),
            GatewayEvent::Message { message } => match message {
                MessagePayload::Transcript { text } => BackendEvent::Transcript(text),
                MessagePayload::AssistantResponse { text } => {
                    BackendEvent::AssistantResponse(text)
                }
            },
            GatewayEvent::Error { message } => BackendEvent::Error {
                kind: ErrorKind::Runtime,
                message,
            },
        }
    }
}
