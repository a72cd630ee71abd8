//! Interfaces to the platform collaborators: capability queries, the scanning
//! engine, the presentation surface, and scoped file access.

use std::{
    path::Path,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    models::{PlatformVersion, ProcessedRoom, RawCapture, RoomSummary},
    scan::{EngineEventSink, SessionSnapshot},
};

pub mod host;
#[cfg(target_os = "ios")]
pub mod ios_bridge;

/// Why a runtime lookup of the engine's capability property did not produce an answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("symbol '{0}' could not be resolved at runtime")]
    SymbolMissing(String),
    #[error("property '{0}' could not be read")]
    PropertyUnreadable(String),
}

/// Tiered capability queries, evaluated in order by the prober.
pub trait CapabilitySource: Send + Sync {
    /// `None` when the platform version cannot be determined.
    fn os_version(&self) -> Option<PlatformVersion>;

    fn device_model(&self) -> String {
        "unknown".into()
    }

    /// False where no room-scanning engine can exist, so the version gate does not apply.
    fn engine_platform(&self) -> bool {
        true
    }

    fn is_simulated(&self) -> bool;

    /// Verdict of the compile-time linked capability symbol, `None` when not linked.
    fn try_direct(&self) -> Option<bool>;

    /// Verdict via runtime lookup. `None` when the engine is absent from the device,
    /// `Some(Err(..))` when it is present but the lookup could not be completed.
    fn try_reflective(&self) -> Option<Result<bool, LookupError>>;

    /// Depth-sensing capability through a generic spatial-tracking API.
    fn try_heuristic(&self) -> bool;

    /// Whether the engine is present at all, independent of its verdict.
    fn framework_present(&self) -> bool {
        self.try_direct().is_some() || self.try_reflective().is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProgressKind {
    Added,
    Changed,
    Updated,
    Removed,
}

/// Running totals reported by the engine while capture is interactive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub kind: ProgressKind,
    pub surface_count: u32,
    pub object_count: u32,
    pub confidence: crate::models::ConfidenceTier,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Progress(ProgressUpdate),
    /// Raw capture data that still needs the engine's offline refinement.
    RawCaptured(RawCapture),
    Processed(ProcessedRoom),
    Failed(String),
}

/// The platform's room-scanning engine.
///
/// `refine` and `export` may block; the controller always calls them from the
/// blocking pool.
pub trait ScanEngine: Send + Sync {
    fn start_session(&self, sink: EngineEventSink) -> Result<(), String>;

    /// Best effort; the controller never waits for acknowledgment.
    fn stop_session(&self);

    fn refine(&self, raw: RawCapture) -> Result<ProcessedRoom, String>;

    /// Serializes a processed room into scene-file bytes.
    fn export(&self, room: &ProcessedRoom) -> Result<Vec<u8>, String>;
}

/// Host-owned presentation surface.
pub trait ScanPresenter: Send + Sync {
    fn present_capture(&self, session_id: &str);

    fn present_summary(&self, session_id: &str, summary: &RoomSummary);

    fn dismiss(&self);

    fn preview(&self, path: &Path) -> Result<(), String>;

    fn state_changed(&self, _snapshot: &SessionSnapshot) {}
}

/// Presenter for headless hosts; it only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl ScanPresenter for LogPresenter {
    fn present_capture(&self, session_id: &str) {
        log::info!("capture view requested for session {session_id}");
    }

    fn present_summary(&self, session_id: &str, summary: &RoomSummary) {
        log::info!(
            "session {session_id} ready: {} surfaces, {} objects, confidence {:?}",
            summary.surface_count,
            summary.object_count,
            summary.confidence
        );
    }

    fn dismiss(&self) {
        log::debug!("capture view dismissed");
    }

    fn preview(&self, path: &Path) -> Result<(), String> {
        log::info!("preview requested for {}", path.display());
        Ok(())
    }

    fn state_changed(&self, snapshot: &SessionSnapshot) {
        log::debug!("scan session state -> {:?}", snapshot.state);
    }
}

/// OS-level scoped access to files outside the app sandbox.
pub trait ScopedAccess: Send + Sync {
    /// Returns false when access could not be obtained; the copy is still attempted.
    fn begin(&self, path: &Path) -> bool;

    fn end(&self, path: &Path);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoScopedAccess;

impl ScopedAccess for NoScopedAccess {
    fn begin(&self, _path: &Path) -> bool {
        true
    }

    fn end(&self, _path: &Path) {}
}

/// Holds scoped access for its lifetime and releases it on drop.
pub struct AccessScope<'a> {
    access: &'a dyn ScopedAccess,
    path: &'a Path,
    granted: bool,
}

impl<'a> AccessScope<'a> {
    pub fn acquire(access: &'a dyn ScopedAccess, path: &'a Path) -> Self {
        let granted = access.begin(path);
        if !granted {
            log::warn!("scoped access not granted for {}", path.display());
        }
        Self {
            access,
            path,
            granted,
        }
    }

    pub fn granted(&self) -> bool {
        self.granted
    }
}

impl Drop for AccessScope<'_> {
    fn drop(&mut self) {
        if self.granted {
            self.access.end(self.path);
        }
    }
}

/// Collaborators for the platform this binary was built for.
pub struct PlatformBackend {
    pub capability: Arc<dyn CapabilitySource>,
    pub engine: Arc<dyn ScanEngine>,
    pub scoped_access: Arc<dyn ScopedAccess>,
}

pub fn default_backend() -> PlatformBackend {
    #[cfg(target_os = "ios")]
    {
        ios_bridge::backend()
    }

    #[cfg(not(target_os = "ios"))]
    {
        PlatformBackend {
            capability: Arc::new(host::HostCapabilitySource::new()),
            engine: Arc::new(host::NoEngine),
            scoped_access: Arc::new(NoScopedAccess),
        }
    }
}

/// Returns true inside a simulator, where depth sensors cannot be meaningfully emulated.
pub fn is_simulated_environment() -> bool {
    std::env::var_os("SIMULATOR_DEVICE_NAME").is_some()
        || std::env::var_os("SIMULATOR_UDID").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAccess {
        calls: Mutex<Vec<&'static str>>,
        grant: bool,
    }

    impl ScopedAccess for RecordingAccess {
        fn begin(&self, _path: &Path) -> bool {
            self.calls.lock().unwrap().push("begin");
            self.grant
        }

        fn end(&self, _path: &Path) {
            self.calls.lock().unwrap().push("end");
        }
    }

    #[test]
    fn access_scope_releases_on_drop() {
        let access = RecordingAccess {
            grant: true,
            ..Default::default()
        };
        {
            let scope = AccessScope::acquire(&access, Path::new("/tmp/room.usdz"));
            assert!(scope.granted());
        }
        assert_eq!(*access.calls.lock().unwrap(), vec!["begin", "end"]);
    }

    #[test]
    fn denied_access_is_not_released() {
        let access = RecordingAccess::default();
        drop(AccessScope::acquire(&access, Path::new("/tmp/room.usdz")));
        assert_eq!(*access.calls.lock().unwrap(), vec!["begin"]);
    }
}
