use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::{
    error::BridgeError,
    models::{RoomSummary, ScanArtifact, ScanSummary},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Requested,
    CapturingInteractive,
    Finishing,
    Processing,
    AwaitingUserDecision,
    Committing,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    /// A session in this state blocks new scan requests.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != SessionState::Idle
    }

    /// States in which the engine may still be producing data.
    pub fn engine_running(&self) -> bool {
        matches!(
            self,
            SessionState::Requested
                | SessionState::CapturingInteractive
                | SessionState::Finishing
                | SessionState::Processing
        )
    }

    pub fn accepts_progress(&self) -> bool {
        matches!(
            self,
            SessionState::CapturingInteractive | SessionState::Finishing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Requested => "requested",
            SessionState::CapturingInteractive => "capturingInteractive",
            SessionState::Finishing => "finishing",
            SessionState::Processing => "processing",
            SessionState::AwaitingUserDecision => "awaitingUserDecision",
            SessionState::Committing => "committing",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        }
    }
}

/// Read-only view of the controller, published on every transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub state: SessionState,
    pub started_at: Option<DateTime<Utc>>,
    pub latest_summary: ScanSummary,
    pub diagnostic: Option<String>,
    pub retry_available: bool,
}

/// Successful terminal outcome of a scan session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanCompletion {
    pub session_id: String,
    pub message: String,
    pub artifact: ScanArtifact,
    pub summary: RoomSummary,
}

pub type ScanOutcome = Result<ScanCompletion, BridgeError>;

/// The single outstanding completion handle of a session.
///
/// Delivery consumes the sender, so a second delivery finds nothing to send to.
#[derive(Debug)]
pub struct PendingDelivery {
    sender: Option<oneshot::Sender<ScanOutcome>>,
}

impl PendingDelivery {
    pub fn channel() -> (Self, oneshot::Receiver<ScanOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { sender: Some(tx) }, rx)
    }

    pub fn is_pending(&self) -> bool {
        self.sender.is_some()
    }

    /// Returns false if this handle already delivered or the receiver is gone.
    pub fn deliver(&mut self, outcome: ScanOutcome) -> bool {
        match self.sender.take() {
            Some(sender) => sender.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// Caller's side of an accepted scan request.
#[derive(Debug)]
pub struct ScanTicket {
    pub session_id: String,
    outcome: oneshot::Receiver<ScanOutcome>,
}

impl ScanTicket {
    pub(crate) fn new(session_id: String, outcome: oneshot::Receiver<ScanOutcome>) -> Self {
        Self {
            session_id,
            outcome,
        }
    }

    /// Waits for the session's terminal outcome.
    pub async fn outcome(self) -> ScanOutcome {
        self.outcome.await.unwrap_or_else(|_| {
            Err(BridgeError::ScanFailed(
                "scan controller stopped before the session finished".into(),
            ))
        })
    }
}
