use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{self, CallReply, CallRequest, CallStopRequest, GatewayEvent};
use super::{BackendError, BackendMode, EventSender, VoiceBackend};
use crate::audio::CaptureClaim;
use crate::session::SessionConfig;

/// State of the call currently open with the gateway. Dropping it releases
/// the microphone claim.
struct ActiveCall {
    call_id: String,
    _capture: CaptureClaim,
}

/// Adapter for the real voice gateway, reached over NATS.
///
/// `connect` validates the credential and establishes the transport;
/// `begin_turn` runs the call handshake and spawns a reader that normalizes
/// the gateway's wire events into [`super::BackendEvent`]s on the controller's
/// queue. The reader also clears the active call once the gateway reports the
/// turn is over, so the next `begin_turn` opens a fresh call. `stop` is
/// best-effort: remote teardown failures are logged, never propagated,
/// because the session is closing regardless.
pub struct RemoteBackend {
    client: async_nats::Client,
    api_key: String,
    call_timeout: Duration,
    events: EventSender,
    active: Arc<Mutex<Option<ActiveCall>>>,
    reader: Option<JoinHandle<()>>,
}

/// True once `event` concludes the call: the closing speech-end of the
/// turn, or a gateway error. Note that `call-end` does not conclude it;
/// the assistant's response and speech events still arrive on the call's
/// subject after the gateway stops transcribing.
fn call_concluded(event: &GatewayEvent) -> bool {
    matches!(event, GatewayEvent::SpeechEnd | GatewayEvent::Error { .. })
}

impl RemoteBackend {
    /// Construct the adapter: check the credential, then connect to the
    /// gateway. Both failures are typed so the controller can distinguish
    /// "misconfigured" from "unreachable" when recording the fallback reason.
    pub async fn connect(
        config: &SessionConfig,
        events: EventSender,
    ) -> Result<Self, BackendError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                BackendError::Configuration("missing voice gateway API key".to_string())
            })?;

        info!("Connecting to voice gateway at {}", config.gateway_url);

        let client = async_nats::connect(config.gateway_url.as_str()).await.map_err(|e| {
            BackendError::Unavailable(format!(
                "failed to reach voice gateway at {}: {}",
                config.gateway_url, e
            ))
        })?;

        Ok(Self {
            client,
            api_key,
            call_timeout: config.call_timeout,
            events,
            active: Arc::new(Mutex::new(None)),
            reader: None,
        })
    }
}

#[async_trait::async_trait]
impl VoiceBackend for RemoteBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::RealBackend
    }

    async fn begin_turn(&mut self) -> Result<(), BackendError> {
        if self.active.lock().await.is_some() {
            // A call is still live; the controller treats this as a no-op.
            return Ok(());
        }

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        // The microphone is held for the call's duration; early returns below
        // drop the claim and release it.
        let capture = CaptureClaim::acquire().ok_or_else(|| {
            BackendError::Runtime("audio capture is already in use".to_string())
        })?;

        let call_id = Uuid::new_v4().to_string();

        let mut event_sub = self
            .client
            .subscribe(messages::call_event_subject(&call_id))
            .await
            .map_err(|e| {
                BackendError::Connection(format!("failed to subscribe to call events: {}", e))
            })?;

        let request = CallRequest::new(&call_id, &self.api_key);
        let payload = serde_json::to_vec(&request)
            .map_err(|e| BackendError::Runtime(format!("failed to encode call request: {}", e)))?;

        let reply = tokio::time::timeout(
            self.call_timeout,
            self.client
                .request(messages::CALL_START_SUBJECT.to_string(), payload.into()),
        )
        .await;

        let message = match reply {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => {
                return Err(BackendError::Connection(format!("call request failed: {}", e)))
            }
            Err(_) => {
                return Err(BackendError::Connection(
                    "timed out waiting for the voice gateway to accept the call".to_string(),
                ))
            }
        };

        let reply: CallReply = serde_json::from_slice(&message.payload).map_err(|e| {
            BackendError::Connection(format!("unreadable reply from voice gateway: {}", e))
        })?;

        if !reply.accepted {
            return Err(BackendError::Connection(
                reply
                    .reason
                    .unwrap_or_else(|| "call refused by the voice gateway".to_string()),
            ));
        }

        info!("Voice call {} accepted by gateway", call_id);

        *self.active.lock().await = Some(ActiveCall {
            call_id: call_id.clone(),
            _capture: capture,
        });

        let events = self.events.clone();
        let active = Arc::clone(&self.active);
        let reader = tokio::spawn(async move {
            while let Some(msg) = event_sub.next().await {
                match serde_json::from_slice::<GatewayEvent>(&msg.payload) {
                    Ok(event) => {
                        let concluded = call_concluded(&event);
                        if events.send(event.into()).is_err() {
                            break; // controller gone
                        }
                        if concluded {
                            // Releases the microphone claim and, by dropping
                            // the subscription, leaves the call's subject.
                            active.lock().await.take();
                            debug!("Voice call {} concluded", call_id);
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to parse gateway event: {}", e),
                }
            }
        });

        self.reader = Some(reader);

        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        // Taking the active call releases the microphone claim.
        if let Some(call) = self.active.lock().await.take() {
            info!("Stopping voice call {}", call.call_id);

            match serde_json::to_vec(&CallStopRequest { call_id: call.call_id }) {
                Ok(payload) => {
                    if let Err(e) = self
                        .client
                        .publish(messages::CALL_STOP_SUBJECT.to_string(), payload.into())
                        .await
                    {
                        warn!("Failed to notify voice gateway of call stop: {}", e);
                    }
                }
                Err(e) => warn!("Failed to encode call stop notice: {}", e),
            }
        }
    }
}
