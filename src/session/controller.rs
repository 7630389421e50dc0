use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::log::{ConversationLog, Speaker};
use super::state::{ErrorRecord, SessionSnapshot, SessionState};
use crate::audio::bar_heights;
use crate::backend::{
    BackendEvent, BackendMode, ErrorKind, EventSender, FallbackSimulator, RemoteBackend,
    VoiceBackend,
};

/// User-initiated actions, delivered with a reply channel so callers can
/// await the settled outcome.
enum Command {
    Initiate { reply: oneshot::Sender<BackendMode> },
    StartTurn { reply: oneshot::Sender<()> },
    Close { reply: oneshot::Sender<()> },
}

/// Single authority over a voice conversation session.
///
/// All mutation happens on one spawned event-loop task; this handle only
/// enqueues commands and reads snapshots. Dropping the handle closes the
/// command channel, which makes the loop tear the backend down and exit.
pub struct SessionController {
    session_id: String,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        info!("Creating voice session: {}", config.session_id);

        let session_id = config.session_id.clone();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (backend_tx, backend_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) =
            watch::channel(SessionSnapshot::initial(&session_id, &config.visualizer));

        let event_loop = EventLoop {
            config,
            state: SessionState::Idle,
            mode: None,
            backend: None,
            log: ConversationLog::default(),
            amplitude: 0.0,
            last_error: None,
            commands: commands_rx,
            backend_tx,
            backend_events: backend_rx,
            snapshot_tx,
            started: Instant::now(),
            started_at: Utc::now(),
        };
        tokio::spawn(event_loop.run());

        Self {
            session_id,
            commands: commands_tx,
            snapshot: snapshot_rx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Initiate the session: choose the backend (real gateway if it can be
    /// constructed, fallback simulator otherwise) and settle in `Idle`.
    /// Never fails on backend problems; the resolved mode is returned.
    pub async fn initiate(&self) -> Result<BackendMode> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Initiate { reply: reply_tx })?;
        reply_rx
            .await
            .context("session event loop terminated during initiate")
    }

    /// Ask the active backend to begin a turn. No-op while a turn is already
    /// in progress; failures are surfaced through the snapshot, not here.
    pub async fn start_turn(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::StartTurn { reply: reply_tx })?;
        reply_rx
            .await
            .context("session event loop terminated during start_turn")
    }

    /// Tear the session down: cancel timers, abort readers, release the
    /// capture claim, settle in `Closed`. Idempotent and valid in any state.
    pub async fn close(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Close { reply: reply_tx })?;
        reply_rx
            .await
            .context("session event loop terminated during close")
    }

    /// Current read-only view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Observable the presentation layer renders from.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("session event loop terminated"))
    }
}

/// State owned by the event-loop task. The backend is held exclusively here,
/// so no locking is needed anywhere in the session core, and log appends are
/// serialized by arrival order.
struct EventLoop {
    config: SessionConfig,
    state: SessionState,
    mode: Option<BackendMode>,
    backend: Option<Box<dyn VoiceBackend>>,
    log: ConversationLog,
    amplitude: f32,
    last_error: Option<ErrorRecord>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Sender half handed to whichever backend is armed
    backend_tx: EventSender,
    backend_events: mpsc::UnboundedReceiver<BackendEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    started: Instant,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl EventLoop {
    async fn run(mut self) {
        self.publish();

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => {
                        self.handle_command(command).await;
                        self.publish();
                    }
                    // Controller handle dropped: tear down and exit.
                    None => break,
                },

                Some(event) = self.backend_events.recv() => {
                    // Drain whatever else is already queued and apply state
                    // transitions before cosmetic volume updates, so a
                    // speech-end and a volume level arriving in the same tick
                    // never render one frame of "speaking" after speech has
                    // logically ended. The stable sort keeps arrival order
                    // within each group.
                    let mut batch = vec![event];
                    while let Ok(next) = self.backend_events.try_recv() {
                        batch.push(next);
                    }
                    batch.sort_by_key(|e| matches!(e, BackendEvent::VolumeLevel(_)));

                    for event in batch {
                        self.handle_backend_event(event);
                    }
                    self.publish();
                }
            }
        }

        self.teardown_backend().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Initiate { reply } => {
                let mode = self.initiate().await;
                let _ = reply.send(mode);
            }
            Command::StartTurn { reply } => {
                self.start_turn().await;
                let _ = reply.send(());
            }
            Command::Close { reply } => {
                self.close().await;
                let _ = reply.send(());
            }
        }
    }

    async fn initiate(&mut self) -> BackendMode {
        match self.state {
            SessionState::Idle | SessionState::Closed | SessionState::Error => {}
            _ => {
                warn!(state = ?self.state, "initiate ignored: session already active");
                return self.mode.unwrap_or(BackendMode::Fallback);
            }
        }

        // A new session must fully release any prior backend (and with it the
        // capture claim) before arming a fresh one.
        self.teardown_backend().await;
        self.log = ConversationLog::default();
        self.last_error = None;
        self.amplitude = 0.0;

        self.set_state(SessionState::Initiating);
        self.publish();

        let mode = match RemoteBackend::connect(&self.config, self.backend_tx.clone()).await {
            Ok(remote) => {
                info!("Session {} using real voice backend", self.config.session_id);
                self.backend = Some(Box::new(remote));
                BackendMode::RealBackend
            }
            Err(err) => {
                // Graceful degradation over termination: record the failure
                // and arm the offline simulator instead of surfacing a hard
                // error to the user.
                warn!(
                    "Real voice backend unavailable for session {}: {}; using fallback simulator",
                    self.config.session_id, err
                );
                self.record_error(err.kind(), err.to_string());

                let mut simulator =
                    FallbackSimulator::new(self.backend_tx.clone(), self.config.timing.clone());
                simulator.activate().await;
                self.backend = Some(Box::new(simulator));
                BackendMode::Fallback
            }
        };

        self.mode = Some(mode);
        self.set_state(SessionState::Idle);
        mode
    }

    async fn start_turn(&mut self) {
        if self.state == SessionState::Listening {
            debug!("start_turn ignored: turn already in progress");
            return;
        }
        if self.state != SessionState::Idle {
            warn!(state = ?self.state, "start_turn ignored: session not idle");
            return;
        }

        let Some(backend) = self.backend.as_mut() else {
            warn!("start_turn ignored: session not initiated");
            return;
        };

        match backend.begin_turn().await {
            Ok(()) => self.set_state(SessionState::Listening),
            Err(err) => {
                // Connection failures do not auto-fallback: the session stays
                // in Idle so the user can retry against the real backend.
                warn!("Failed to start turn: {}", err);
                self.record_error(err.kind(), err.to_string());
            }
        }
    }

    async fn close(&mut self) {
        if self.state == SessionState::Closed {
            debug!("close: session already closed");
            return;
        }

        info!("Closing voice session: {}", self.config.session_id);

        self.teardown_backend().await;
        self.amplitude = 0.0;
        self.set_state(SessionState::Closed);
    }

    async fn teardown_backend(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.stop().await;
        }
    }

    fn handle_backend_event(&mut self, event: BackendEvent) {
        // A backend response arriving after close is silently discarded,
        // never appended.
        if self.state == SessionState::Closed {
            debug!("dropping backend event after close: {:?}", event);
            return;
        }

        match event {
            BackendEvent::CallStart => {
                if self.state == SessionState::Idle {
                    self.set_state(SessionState::Listening);
                }
            }
            BackendEvent::Transcript(text) => {
                self.log.append(Speaker::User, text);
            }
            BackendEvent::CallEnd => {
                // Turn complete; a response is on the way.
                if self.state == SessionState::Listening {
                    self.set_state(SessionState::Speaking);
                }
            }
            BackendEvent::SpeechStart => {
                if matches!(
                    self.state,
                    SessionState::Idle | SessionState::Listening | SessionState::Speaking
                ) {
                    self.set_state(SessionState::Speaking);
                }
            }
            BackendEvent::SpeechEnd => {
                if self.state == SessionState::Speaking {
                    self.set_state(SessionState::Idle);
                }
                self.amplitude = 0.0;
            }
            BackendEvent::AssistantResponse(text) => {
                self.log.append(Speaker::Ai, text);
            }
            BackendEvent::VolumeLevel(level) => {
                self.amplitude = level.clamp(0.0, 1.0);
            }
            BackendEvent::Error { kind, message } => {
                self.record_error(kind, message);

                match self.state {
                    // Mid-call runtime error ends the turn gracefully; the
                    // session remains usable.
                    SessionState::Listening | SessionState::Speaking => {
                        self.set_state(SessionState::Idle);
                        self.amplitude = 0.0;
                    }
                    // Outside a turn there is nothing to wind down: the
                    // backend itself has failed, and the session is unusable
                    // until the user retries initiate().
                    SessionState::Idle => self.set_state(SessionState::Error),
                    _ => {}
                }
            }
        }
    }

    fn record_error(&mut self, kind: ErrorKind, message: String) {
        self.last_error = Some(ErrorRecord {
            kind,
            message,
            occurred_during: self.state,
            timestamp: Utc::now(),
        });
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "session state transition");
            self.state = next;
        }
    }

    fn publish(&self) {
        let is_listening = self.state == SessionState::Listening;
        let is_speaking = self.state == SessionState::Speaking;
        let time_ms = self.started.elapsed().as_millis() as u64;

        self.snapshot_tx.send_replace(SessionSnapshot {
            session_id: self.config.session_id.clone(),
            state: self.state,
            mode: self.mode,
            turns: self.log.as_ordered_sequence().to_vec(),
            bar_heights: bar_heights(
                &self.config.visualizer,
                time_ms,
                self.amplitude,
                is_listening || is_speaking,
            ),
            error_message: self.last_error.as_ref().map(|e| e.message.clone()),
            last_error: self.last_error.clone(),
            is_listening,
            is_speaking,
            started_at: self.started_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Event loop spawned in a chosen state with no backend armed, so tests
    /// can feed raw backend events and observe the published snapshots.
    struct LoopHarness {
        commands: mpsc::UnboundedSender<Command>,
        backend: EventSender,
        snapshots: watch::Receiver<SessionSnapshot>,
    }

    fn spawn_loop(state: SessionState, amplitude: f32) -> LoopHarness {
        let config = SessionConfig::default();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (backend_tx, backend_rx) = mpsc::unbounded_channel();
        let mut seed = SessionSnapshot::initial(&config.session_id, &config.visualizer);
        // Seed the watch with the spawned state so waiters don't observe a
        // stale `Idle` frame before the loop's first publish.
        seed.state = state;
        let (snapshot_tx, snapshot_rx) = watch::channel(seed);

        let event_loop = EventLoop {
            config,
            state,
            mode: Some(BackendMode::Fallback),
            backend: None,
            log: ConversationLog::default(),
            amplitude,
            last_error: None,
            commands: commands_rx,
            backend_tx: backend_tx.clone(),
            backend_events: backend_rx,
            snapshot_tx,
            started: Instant::now(),
            started_at: Utc::now(),
        };
        tokio::spawn(event_loop.run());

        LoopHarness {
            commands: commands_tx,
            backend: backend_tx,
            snapshots: snapshot_rx,
        }
    }

    async fn wait_for_state(
        snapshots: &mut watch::Receiver<SessionSnapshot>,
        target: SessionState,
    ) -> SessionSnapshot {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snap = snapshots.borrow_and_update().clone();
                if snap.state == target {
                    return snap;
                }
                snapshots.changed().await.expect("event loop alive");
            }
        })
        .await
        .unwrap_or_else(|_| panic!("session never reached {:?}", target))
    }

    #[tokio::test]
    async fn volume_arriving_with_speech_end_never_renders_a_speaking_frame() {
        let harness = spawn_loop(SessionState::Speaking, 0.8);
        let rest = SessionConfig::default().visualizer.rest_height;
        let mut snapshots = harness.snapshots.clone();

        // Queued before the loop drains, so both land in one batch with the
        // volume update first in arrival order.
        harness.backend.send(BackendEvent::VolumeLevel(0.9)).unwrap();
        harness.backend.send(BackendEvent::SpeechEnd).unwrap();

        let snap = wait_for_state(&mut snapshots, SessionState::Idle).await;
        assert!(!snap.is_speaking);
        assert!(
            snap.bar_heights.iter().all(|&h| h == rest),
            "bars must settle at rest once speech has ended"
        );

        // The late volume update must not resurrect a speaking frame.
        let quiet = tokio::time::timeout(Duration::from_millis(50), snapshots.changed()).await;
        assert!(quiet.is_err(), "no further frames after the turn ended");

        // Keeps the command channel open for the whole observation window.
        drop(harness.commands);
    }

    #[tokio::test]
    async fn backend_error_between_turns_is_fatal_until_reinitiated() {
        let harness = spawn_loop(SessionState::Idle, 0.0);
        let mut snapshots = harness.snapshots.clone();

        harness
            .backend
            .send(BackendEvent::Error {
                kind: ErrorKind::Runtime,
                message: "gateway connection lost".to_string(),
            })
            .unwrap();

        let snap = wait_for_state(&mut snapshots, SessionState::Error).await;
        let record = snap.last_error.expect("error recorded");
        assert_eq!(record.kind, ErrorKind::Runtime);
        assert_eq!(record.occurred_during, SessionState::Idle);
        assert_eq!(snap.error_message.as_deref(), Some("gateway connection lost"));

        drop(harness.commands);
    }

    #[tokio::test]
    async fn backend_error_mid_turn_ends_the_turn_gracefully() {
        let harness = spawn_loop(SessionState::Listening, 0.4);
        let mut snapshots = harness.snapshots.clone();

        harness
            .backend
            .send(BackendEvent::Error {
                kind: ErrorKind::Runtime,
                message: "transcriber stream dropped".to_string(),
            })
            .unwrap();

        let snap = wait_for_state(&mut snapshots, SessionState::Idle).await;
        assert!(!snap.is_listening);
        assert!(!snap.is_speaking);
        assert_eq!(snap.error_message.as_deref(), Some("transcriber stream dropped"));

        drop(harness.commands);
    }
}
