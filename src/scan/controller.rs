use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    artifacts::ArtifactStore,
    error::BridgeError,
    models::{CapabilityReport, ProcessedRoom, RawCapture, ScanArtifact, ScanSummary},
    platform::{EngineEvent, ScanEngine, ScanPresenter},
};

use super::state::{
    PendingDelivery, ScanCompletion, ScanOutcome, ScanTicket, SessionSnapshot, SessionState,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    /// Bound on waiting for final capture data after the engine is told to stop.
    pub grace_delay: Duration,
    /// Bound on the engine's offline refinement.
    pub processing_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            grace_delay: Duration::from_secs(5),
            processing_timeout: Duration::from_secs(30),
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, BridgeError>>;

enum ControlMessage {
    Start {
        capability: CapabilityReport,
        reply: Reply<ScanTicket>,
    },
    Finish {
        reply: Reply<SessionSnapshot>,
    },
    Save {
        file_name: Option<String>,
        reply: Reply<SessionSnapshot>,
    },
    RetryCommit {
        reply: Reply<ScanTicket>,
    },
    Cancel {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Engine {
        session_id: Uuid,
        event: EngineEvent,
    },
    RefineFinished {
        session_id: Uuid,
        result: Result<ProcessedRoom, String>,
    },
    CommitFinished {
        session_id: Uuid,
        result: Result<ScanArtifact, BridgeError>,
    },
    PhaseTimeout {
        session_id: Uuid,
        phase: SessionState,
    },
}

/// Handed to the engine when a session starts; routes callbacks into the controller.
///
/// Every event is tagged with the session it belongs to, so callbacks that arrive
/// after that session ended are recognized and dropped.
#[derive(Clone, Debug)]
pub struct EngineEventSink {
    session_id: Uuid,
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl EngineEventSink {
    pub fn session_id(&self) -> String {
        self.session_id.to_string()
    }

    /// Returns false once the controller has shut down.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(ControlMessage::Engine {
                session_id: self.session_id,
                event,
            })
            .is_ok()
    }
}

impl std::fmt::Debug for ControlMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControlMessage::Start { .. } => "Start",
            ControlMessage::Finish { .. } => "Finish",
            ControlMessage::Save { .. } => "Save",
            ControlMessage::RetryCommit { .. } => "RetryCommit",
            ControlMessage::Cancel { .. } => "Cancel",
            ControlMessage::Engine { .. } => "Engine",
            ControlMessage::RefineFinished { .. } => "RefineFinished",
            ControlMessage::CommitFinished { .. } => "CommitFinished",
            ControlMessage::PhaseTimeout { .. } => "PhaseTimeout",
        };
        f.write_str(name)
    }
}

/// Handle to the single scan session actor.
///
/// Cloning the handle is cheap; all clones talk to the same actor, which owns the
/// session exclusively and applies one message at a time.
#[derive(Clone)]
pub struct ScanController {
    tx: mpsc::UnboundedSender<ControlMessage>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    worker: JoinHandle<()>,
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        // The actor holds senders to itself, so its queue never closes on its own.
        self.worker.abort();
    }
}

impl ScanController {
    /// Spawns the session actor on the current tokio runtime.
    pub fn spawn(
        engine: Arc<dyn ScanEngine>,
        presenter: Arc<dyn ScanPresenter>,
        store: ArtifactStore,
        default_file_prefix: String,
        timing: SessionTiming,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

        let actor = SessionActor {
            engine,
            presenter,
            store,
            default_file_prefix,
            timing,
            tx: tx.clone(),
            snapshot_tx,
            session: None,
            retained: None,
            last: SessionSnapshot::default(),
        };
        let worker = tokio::spawn(actor.run(rx));

        Self {
            tx,
            snapshot_rx,
            inner: Arc::new(ControllerInner { worker }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Accepts a scan request if no session is active and the report allows it.
    pub async fn start(&self, capability: CapabilityReport) -> Result<ScanTicket, BridgeError> {
        self.request(|reply| ControlMessage::Start { capability, reply })
            .await
    }

    /// User finished capturing; stop the engine and wait for its final data.
    pub async fn finish(&self) -> Result<SessionSnapshot, BridgeError> {
        self.request(|reply| ControlMessage::Finish { reply }).await
    }

    /// Commits the held result to the store, optionally under a chosen name.
    pub async fn save(&self, file_name: Option<String>) -> Result<SessionSnapshot, BridgeError> {
        self.request(|reply| ControlMessage::Save { file_name, reply })
            .await
    }

    /// Re-attempts a failed commit without re-scanning.
    pub async fn retry_commit(&self) -> Result<ScanTicket, BridgeError> {
        self.request(|reply| ControlMessage::RetryCommit { reply })
            .await
    }

    /// Cancels whatever is in flight. A no-op when nothing is.
    pub async fn cancel(&self) -> SessionSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ControlMessage::Cancel { reply }).is_err() {
            return self.snapshot();
        }
        rx.await.unwrap_or_else(|_| self.snapshot())
    }

    pub fn is_running(&self) -> bool {
        !self.inner.worker.is_finished()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ControlMessage,
    ) -> Result<T, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| controller_stopped())?;
        rx.await.map_err(|_| controller_stopped())?
    }
}

fn controller_stopped() -> BridgeError {
    BridgeError::ScanFailed("scan controller is not running".into())
}

struct ScanSession {
    id: Uuid,
    state: SessionState,
    started_at: chrono::DateTime<Utc>,
    latest_summary: ScanSummary,
    pending: PendingDelivery,
    processed: Option<ProcessedRoom>,
    file_name: Option<String>,
    timer: Option<CancellationToken>,
}

impl ScanSession {
    fn cancel_timer(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
    }
}

/// What survives a failed commit so the user can retry saving.
struct RetainedCommit {
    session_id: Uuid,
    started_at: chrono::DateTime<Utc>,
    latest_summary: ScanSummary,
    processed: ProcessedRoom,
    file_name: Option<String>,
}

struct SessionActor {
    engine: Arc<dyn ScanEngine>,
    presenter: Arc<dyn ScanPresenter>,
    store: ArtifactStore,
    default_file_prefix: String,
    timing: SessionTiming,
    tx: mpsc::UnboundedSender<ControlMessage>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    session: Option<ScanSession>,
    retained: Option<RetainedCommit>,
    last: SessionSnapshot,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ControlMessage>) {
        log_debug!("scan session actor started");
        while let Some(message) = rx.recv().await {
            self.handle(message);
        }
        log_debug!("scan session actor stopped");
    }

    fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Start { capability, reply } => {
                let _ = reply.send(self.start(capability));
            }
            ControlMessage::Finish { reply } => {
                let _ = reply.send(self.finish());
            }
            ControlMessage::Save { file_name, reply } => {
                let _ = reply.send(self.save(file_name));
            }
            ControlMessage::RetryCommit { reply } => {
                let _ = reply.send(self.retry_commit());
            }
            ControlMessage::Cancel { reply } => {
                self.cancel();
                let _ = reply.send(self.last.clone());
            }
            ControlMessage::Engine { session_id, event } => self.on_engine_event(session_id, event),
            ControlMessage::RefineFinished { session_id, result } => {
                self.on_refine_finished(session_id, result)
            }
            ControlMessage::CommitFinished { session_id, result } => {
                self.on_commit_finished(session_id, result)
            }
            ControlMessage::PhaseTimeout { session_id, phase } => {
                self.on_phase_timeout(session_id, phase)
            }
        }
    }

    fn start(&mut self, capability: CapabilityReport) -> Result<ScanTicket, BridgeError> {
        if let Some(session) = &self.session {
            log_warn!(
                "rejecting scan request: session {} is {}",
                session.id,
                session.state.as_str()
            );
            return Err(BridgeError::SessionAlreadyActive);
        }
        capability.admit()?;

        if let Some(retained) = self.retained.take() {
            log_info!(
                "discarding unsaved result of session {} for a new scan",
                retained.session_id
            );
        }

        let (pending, outcome_rx) = PendingDelivery::channel();
        let id = Uuid::new_v4();
        self.session = Some(ScanSession {
            id,
            state: SessionState::Requested,
            started_at: Utc::now(),
            latest_summary: ScanSummary::default(),
            pending,
            processed: None,
            file_name: None,
            timer: None,
        });
        self.publish(None);
        let ticket = ScanTicket::new(id.to_string(), outcome_rx);

        let sink = EngineEventSink {
            session_id: id,
            tx: self.tx.clone(),
        };
        if let Err(message) = self.engine.start_session(sink) {
            log_error!("engine failed to start session {id}: {message}");
            self.terminate(SessionState::Failed, Err(BridgeError::ScanFailed(message)));
            return Ok(ticket);
        }

        self.transition(SessionState::CapturingInteractive);
        self.presenter.present_capture(&id.to_string());
        log_info!("scan session {id} capturing");
        Ok(ticket)
    }

    fn finish(&mut self) -> Result<SessionSnapshot, BridgeError> {
        let session = self.expect_state(&[SessionState::CapturingInteractive])?;
        let id = session.id;

        self.engine.stop_session();
        self.transition(SessionState::Finishing);
        self.arm_timer(SessionState::Finishing, self.timing.grace_delay);
        log_info!("scan session {id} finishing, waiting for final capture data");
        Ok(self.last.clone())
    }

    fn save(&mut self, file_name: Option<String>) -> Result<SessionSnapshot, BridgeError> {
        self.expect_state(&[SessionState::AwaitingUserDecision])?;
        let name = match file_name {
            Some(name) => {
                crate::artifacts::validate_file_name(name.trim())?;
                name
            }
            None => self.store.default_file_name(&self.default_file_prefix),
        };

        let Some(session) = self.session.as_mut() else {
            return Err(BridgeError::InvalidState(SessionState::Idle.as_str().into()));
        };
        let Some(room) = session.processed.clone() else {
            return Err(BridgeError::ScanFailed("no processed result to save".into()));
        };
        session.file_name = Some(name.clone());
        let id = session.id;

        self.transition(SessionState::Committing);
        self.spawn_commit(id, room, name);
        Ok(self.last.clone())
    }

    fn retry_commit(&mut self) -> Result<ScanTicket, BridgeError> {
        if let Some(session) = &self.session {
            return Err(BridgeError::InvalidState(session.state.as_str().into()));
        }
        let Some(retained) = self.retained.take() else {
            return Err(BridgeError::InvalidState(format!(
                "{} with nothing to retry",
                self.last.state.as_str()
            )));
        };

        let (pending, outcome_rx) = PendingDelivery::channel();
        let name = retained
            .file_name
            .clone()
            .unwrap_or_else(|| self.store.default_file_name(&self.default_file_prefix));
        let id = retained.session_id;

        self.session = Some(ScanSession {
            id,
            state: SessionState::Committing,
            started_at: retained.started_at,
            latest_summary: retained.latest_summary,
            pending,
            processed: Some(retained.processed.clone()),
            file_name: Some(name.clone()),
            timer: None,
        });
        self.publish(None);
        log_info!("retrying commit for session {id}");

        self.spawn_commit(id, retained.processed, name);
        Ok(ScanTicket::new(id.to_string(), outcome_rx))
    }

    fn cancel(&mut self) {
        let Some(session) = self.session.as_ref() else {
            if let Some(retained) = self.retained.take() {
                log_info!("dropping unsaved result of session {}", retained.session_id);
                self.publish(self.last.diagnostic.clone());
            }
            return;
        };

        if session.state.engine_running() {
            self.engine.stop_session();
        }
        log_info!("scan session {} cancelled in {}", session.id, session.state.as_str());
        self.terminate(SessionState::Cancelled, Err(BridgeError::ScanCancelled));
    }

    fn on_engine_event(&mut self, session_id: Uuid, event: EngineEvent) {
        let Some(state) = self.current_state_for(session_id) else {
            log_debug!("ignoring engine event for inactive session {session_id}: {event:?}");
            return;
        };

        match event {
            EngineEvent::Progress(update) => {
                if !state.accepts_progress() {
                    log_debug!("ignoring progress in {}", state.as_str());
                    return;
                }
                if let Some(session) = self.session.as_mut() {
                    session.latest_summary = ScanSummary {
                        surface_count: update.surface_count,
                        object_count: update.object_count,
                        confidence_tier: update.confidence,
                    };
                }
                self.publish(None);
            }
            EngineEvent::RawCaptured(raw) => match state {
                SessionState::CapturingInteractive | SessionState::Finishing => {
                    self.begin_processing(session_id, raw)
                }
                other => log_debug!("ignoring raw capture in {}", other.as_str()),
            },
            EngineEvent::Processed(room) => match state {
                SessionState::CapturingInteractive
                | SessionState::Finishing
                | SessionState::Processing => self.hold_result(room),
                other => log_debug!("ignoring processed result in {}", other.as_str()),
            },
            EngineEvent::Failed(message) => match state {
                // The processed room is already held; a late engine error cannot invalidate it.
                SessionState::AwaitingUserDecision | SessionState::Committing => {
                    log_debug!("ignoring engine failure in {}: {message}", state.as_str())
                }
                _ => {
                    log_error!("engine reported failure for session {session_id}: {message}");
                    self.terminate(SessionState::Failed, Err(BridgeError::ScanFailed(message)));
                }
            },
        }
    }

    fn begin_processing(&mut self, session_id: Uuid, raw: RawCapture) {
        self.transition(SessionState::Processing);
        self.arm_timer(SessionState::Processing, self.timing.processing_timeout);

        let engine = self.engine.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || engine.refine(raw))
                .await
                .unwrap_or_else(|join_err| Err(format!("refinement task failed: {join_err}")));
            let _ = tx.send(ControlMessage::RefineFinished { session_id, result });
        });
    }

    fn on_refine_finished(&mut self, session_id: Uuid, result: Result<ProcessedRoom, String>) {
        match self.current_state_for(session_id) {
            Some(SessionState::Processing) => {}
            _ => {
                log_debug!("ignoring late refinement result for session {session_id}");
                return;
            }
        }

        match result {
            Ok(room) => self.hold_result(room),
            Err(message) => {
                log_error!("refinement failed for session {session_id}: {message}");
                self.terminate(SessionState::Failed, Err(BridgeError::ScanFailed(message)));
            }
        }
    }

    fn hold_result(&mut self, room: ProcessedRoom) {
        let summary = room.summary();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.cancel_timer();
        session.latest_summary = ScanSummary {
            surface_count: summary.surface_count,
            object_count: summary.object_count,
            confidence_tier: summary.confidence,
        };
        session.processed = Some(room);
        let id = session.id.to_string();

        if session.state != SessionState::Processing {
            self.transition(SessionState::Processing);
        }
        self.transition(SessionState::AwaitingUserDecision);
        self.presenter.present_summary(&id, &summary);
    }

    fn spawn_commit(&self, session_id: Uuid, room: ProcessedRoom, file_name: String) {
        let engine = self.engine.clone();
        let store = self.store.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                let bytes = engine.export(&room).map_err(BridgeError::ScanFailed)?;
                let mut artifact = store.commit(&bytes, &file_name)?;
                artifact.summary = Some(room.summary());
                Ok(artifact)
            })
            .await
            .unwrap_or_else(|join_err| {
                Err(BridgeError::ScanFailed(format!("commit task failed: {join_err}")))
            });
            let _ = tx.send(ControlMessage::CommitFinished { session_id, result });
        });
    }

    fn on_commit_finished(&mut self, session_id: Uuid, result: Result<ScanArtifact, BridgeError>) {
        if self.current_state_for(session_id) != Some(SessionState::Committing) {
            if let Ok(artifact) = result {
                log_warn!(
                    "session {session_id} ended before its commit finished; removing {}",
                    artifact.file_path.display()
                );
                if let Err(err) = self.store.delete(&artifact.file_name) {
                    log_warn!("failed to remove orphaned {}: {err}", artifact.file_name);
                }
            }
            return;
        }

        match result {
            Ok(artifact) => {
                let summary = artifact
                    .summary
                    .clone()
                    .or_else(|| {
                        self.session
                            .as_ref()
                            .and_then(|s| s.processed.as_ref())
                            .map(|room| room.summary())
                    });
                let Some(summary) = summary else {
                    self.terminate(
                        SessionState::Failed,
                        Err(BridgeError::ScanFailed("committed result lost its summary".into())),
                    );
                    return;
                };
                log_info!(
                    "session {session_id} completed: {}",
                    artifact.file_path.display()
                );
                let completion = ScanCompletion {
                    session_id: session_id.to_string(),
                    message: "Room scan saved successfully".into(),
                    artifact,
                    summary,
                };
                self.terminate(SessionState::Completed, Ok(completion));
            }
            Err(err) => {
                log_error!("commit failed for session {session_id}: {err}");
                if let Some(session) = self.session.as_mut() {
                    if let Some(processed) = session.processed.take() {
                        self.retained = Some(RetainedCommit {
                            session_id,
                            started_at: session.started_at,
                            latest_summary: session.latest_summary,
                            processed,
                            file_name: session.file_name.clone(),
                        });
                    }
                }
                self.terminate(SessionState::Failed, Err(err));
            }
        }
    }

    fn on_phase_timeout(&mut self, session_id: Uuid, phase: SessionState) {
        if self.current_state_for(session_id) != Some(phase) {
            return;
        }

        let message = match phase {
            SessionState::Finishing => format!(
                "engine delivered no capture data within {}ms of stopping",
                self.timing.grace_delay.as_millis()
            ),
            SessionState::Processing => format!(
                "engine did not finish processing within {}ms",
                self.timing.processing_timeout.as_millis()
            ),
            other => format!("timed out in {}", other.as_str()),
        };
        log_warn!("session {session_id}: {message}");
        self.engine.stop_session();
        self.terminate(SessionState::Failed, Err(BridgeError::ScanFailed(message)));
    }

    /// Ends the active session with its one outcome. The session is moved out
    /// of the actor first, so a second terminal transition has nothing to deliver.
    fn terminate(&mut self, state: SessionState, outcome: ScanOutcome) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.cancel_timer();
        session.state = state;

        let diagnostic = outcome.as_ref().err().map(|err| err.to_string());
        self.last = SessionSnapshot {
            session_id: Some(session.id.to_string()),
            state,
            started_at: Some(session.started_at),
            latest_summary: session.latest_summary,
            diagnostic: diagnostic.clone(),
            retry_available: self.retained.is_some(),
        };
        self.presenter.dismiss();

        if !session.pending.deliver(outcome) {
            log_debug!("session {} outcome had no listener", session.id);
        }
        self.snapshot_tx.send_replace(self.last.clone());
        self.presenter.state_changed(&self.last);
    }

    fn transition(&mut self, next: SessionState) {
        if let Some(session) = self.session.as_mut() {
            log_debug!(
                "session {}: {} -> {}",
                session.id,
                session.state.as_str(),
                next.as_str()
            );
            session.state = next;
        }
        self.publish(None);
    }

    fn publish(&mut self, diagnostic: Option<String>) {
        self.last = match &self.session {
            Some(session) => SessionSnapshot {
                session_id: Some(session.id.to_string()),
                state: session.state,
                started_at: Some(session.started_at),
                latest_summary: session.latest_summary,
                diagnostic,
                retry_available: false,
            },
            None => SessionSnapshot {
                retry_available: self.retained.is_some(),
                diagnostic,
                ..self.last.clone()
            },
        };
        self.snapshot_tx.send_replace(self.last.clone());
        self.presenter.state_changed(&self.last);
    }

    fn arm_timer(&mut self, phase: SessionState, after: Duration) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.cancel_timer();

        let token = CancellationToken::new();
        session.timer = Some(token.clone());
        let session_id = session.id;
        let tx = self.tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {
                    let _ = tx.send(ControlMessage::PhaseTimeout { session_id, phase });
                }
                _ = token.cancelled() => {}
            }
        });
    }

    fn current_state_for(&self, session_id: Uuid) -> Option<SessionState> {
        self.session
            .as_ref()
            .filter(|session| session.id == session_id)
            .map(|session| session.state)
    }

    fn expect_state(&self, allowed: &[SessionState]) -> Result<&ScanSession, BridgeError> {
        match &self.session {
            Some(session) if allowed.contains(&session.state) => Ok(session),
            Some(session) => Err(BridgeError::InvalidState(session.state.as_str().into())),
            None => Err(BridgeError::InvalidState(self.last.state.as_str().into())),
        }
    }
}
