#[cfg(feature = "tauri")]
pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{EngineEventSink, ScanController, SessionTiming};
pub use state::{
    PendingDelivery, ScanCompletion, ScanOutcome, ScanTicket, SessionSnapshot, SessionState,
};
