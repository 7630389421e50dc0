use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, info};

use super::{BackendError, BackendEvent, BackendMode, EventSender, VoiceBackend, GREETING};

/// Canned user utterances for the offline conversation.
const USER_UTTERANCES: [&str; 5] = [
    "I have a severe headache and slight fever since yesterday.",
    "My throat is sore and I have difficulty swallowing.",
    "I'm experiencing chest pain when I breathe deeply.",
    "I've been feeling more tired than usual lately.",
    "My allergies seem to be getting worse.",
];

const HEADACHE_RESPONSE: &str = "Based on your symptoms of headache and fever, you might be \
experiencing a viral infection. I recommend rest, fluids, and over-the-counter pain \
relievers. Would you like me to connect you with a telehealth doctor for a more detailed \
assessment?";

const THROAT_RESPONSE: &str = "Sore throat and difficulty swallowing could indicate a strep \
infection or pharyngitis. I suggest gargling with warm salt water and staying hydrated. \
Would you like to book an appointment with a primary care physician?";

const CHEST_RESPONSE: &str = "Chest pain when breathing deeply could be several conditions \
from muscle strain to something more serious. This symptom warrants immediate medical \
attention. I can help you find the nearest urgent care or emergency room right now.";

const FATIGUE_RESPONSE: &str = "Increased fatigue can be caused by many factors including \
stress, poor sleep, or underlying health conditions. I recommend checking with your doctor. \
Would you like to schedule a comprehensive health screening?";

const DEFAULT_RESPONSE: &str = "I understand you're not feeling well. Based on what you've \
told me, it would be best to consult with a healthcare provider. I can help you find \
available appointments in your area or connect you with a telehealth service right away.";

/// Keyword sets checked in listed order; the first match wins.
const RESPONSE_RULES: [(&[&str], &str); 4] = [
    (&["headache", "fever"], HEADACHE_RESPONSE),
    (&["throat", "swallowing"], THROAT_RESPONSE),
    (&["chest pain", "breathe"], CHEST_RESPONSE),
    (&["tired", "fatigue"], FATIGUE_RESPONSE),
];

/// Select the canned response for a user utterance. Deterministic: the same
/// utterance always yields the same text.
pub(crate) fn select_response(utterance: &str) -> &'static str {
    for (keywords, response) in RESPONSE_RULES {
        if keywords.iter().any(|kw| utterance.contains(kw)) {
            return response;
        }
    }
    DEFAULT_RESPONSE
}

/// Timing knobs for the simulator, shrunk by tests to keep them fast.
#[derive(Debug, Clone)]
pub struct SimulatorTiming {
    /// Delay before the scripted greeting after activation
    pub greeting_delay: Duration,
    /// Pause between the user's utterance and the assistant's response
    pub thinking_delay: Duration,
    /// Bounds of the randomized listening window
    pub listen_min: Duration,
    pub listen_max: Duration,
    /// Bounds of the randomized assistant speaking window
    pub speaking_min: Duration,
    pub speaking_max: Duration,
    /// Amplitude emission cadence while listening
    pub user_level_interval: Duration,
    /// Amplitude emission cadence while the assistant speaks
    pub ai_level_interval: Duration,
}

impl Default for SimulatorTiming {
    fn default() -> Self {
        Self {
            greeting_delay: Duration::from_millis(500),
            thinking_delay: Duration::from_millis(1500),
            listen_min: Duration::from_secs(3),
            listen_max: Duration::from_secs(5),
            speaking_min: Duration::from_secs(2),
            speaking_max: Duration::from_secs(3),
            user_level_interval: Duration::from_millis(100),
            ai_level_interval: Duration::from_millis(120),
        }
    }
}

/// Random duration within `[min, max]`.
fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let spread = (max - min).as_millis() as u64;
    min + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

/// Deterministic-shape, randomized-content stand-in for the real backend.
///
/// Every phase is a spawned timer task registered in an owned handle set;
/// `stop()` aborts the whole set, so no stale event fires after teardown. The
/// controller additionally drops any event that slips through after close.
pub struct FallbackSimulator {
    events: EventSender,
    timing: SimulatorTiming,
    tasks: Vec<JoinHandle<()>>,
}

impl FallbackSimulator {
    pub fn new(events: EventSender, timing: SimulatorTiming) -> Self {
        Self {
            events,
            timing,
            tasks: Vec::new(),
        }
    }

    /// Number of simulation tasks still pending. Used by teardown tests.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.iter().filter(|h| !h.is_finished()).count()
    }

    fn spawn(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|h| !h.is_finished());
        self.tasks.push(task);
    }
}

/// Emit a speech window: `speech-start`, simulated assistant amplitudes for a
/// randomized duration, then `speech-end`.
async fn speaking_window(events: &EventSender, timing: &SimulatorTiming) {
    if events.send(BackendEvent::SpeechStart).is_err() {
        return;
    }

    let window = jitter(timing.speaking_min, timing.speaking_max);
    let started = Instant::now();
    let mut ticker = interval(timing.ai_level_interval);
    ticker.tick().await;

    while started.elapsed() < window {
        let level = 0.2 + rand::thread_rng().gen_range(0.0..0.5);
        if events.send(BackendEvent::VolumeLevel(level)).is_err() {
            return;
        }
        ticker.tick().await;
    }

    let _ = events.send(BackendEvent::SpeechEnd);
}

#[async_trait::async_trait]
impl VoiceBackend for FallbackSimulator {
    fn mode(&self) -> BackendMode {
        BackendMode::Fallback
    }

    /// Schedule the scripted greeting.
    async fn activate(&mut self) {
        info!("Fallback simulator armed");

        let events = self.events.clone();
        let timing = self.timing.clone();

        self.spawn(tokio::spawn(async move {
            sleep(timing.greeting_delay).await;

            if events
                .send(BackendEvent::AssistantResponse(GREETING.to_string()))
                .is_err()
            {
                return;
            }
            speaking_window(&events, &timing).await;
        }));
    }

    /// Run one full simulated turn: listening window with amplitudes, a canned
    /// user utterance, the thinking delay, then the matched response and its
    /// speaking window.
    async fn begin_turn(&mut self) -> Result<(), BackendError> {
        debug!("Simulated turn starting");

        let events = self.events.clone();
        let timing = self.timing.clone();

        self.spawn(tokio::spawn(async move {
            if events.send(BackendEvent::CallStart).is_err() {
                return;
            }

            let window = jitter(timing.listen_min, timing.listen_max);
            let started = Instant::now();
            let mut ticker = interval(timing.user_level_interval);
            ticker.tick().await;

            while started.elapsed() < window {
                let level = 0.1 + rand::thread_rng().gen_range(0.0..0.8);
                if events.send(BackendEvent::VolumeLevel(level)).is_err() {
                    return;
                }
                ticker.tick().await;
            }

            let utterance =
                USER_UTTERANCES[rand::thread_rng().gen_range(0..USER_UTTERANCES.len())];

            if events
                .send(BackendEvent::Transcript(utterance.to_string()))
                .is_err()
            {
                return;
            }
            if events.send(BackendEvent::CallEnd).is_err() {
                return;
            }

            sleep(timing.thinking_delay).await;

            let response = select_response(utterance);
            if events
                .send(BackendEvent::AssistantResponse(response.to_string()))
                .is_err()
            {
                return;
            }

            speaking_window(&events, &timing).await;
        }));

        Ok(())
    }

    async fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Fallback simulator stopped");
    }
}
