//! Host-facing facade: one method per inbound operation.
//!
//! The bridge owns the controller handle and the store; hosts own the bridge
//! (the Tauri plugin keeps it in managed state). Cloning is cheap.

use std::{io, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    artifacts::ArtifactStore,
    capability::CapabilityProber,
    error::BridgeError,
    models::{ArtifactEntry, CapabilityReport, RoomSummary},
    platform::{PlatformBackend, ScanPresenter, ScopedAccess},
    scan::{ScanController, ScanTicket, SessionSnapshot, SessionTiming},
    settings::BridgeConfig,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub success: bool,
    pub message: String,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub summary: Option<RoomSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub file_name: String,
    pub file_path: String,
}

#[derive(Clone)]
pub struct RoomScanBridge {
    config: Arc<BridgeConfig>,
    prober: CapabilityProber,
    controller: ScanController,
    store: ArtifactStore,
    presenter: Arc<dyn ScanPresenter>,
    scoped_access: Arc<dyn ScopedAccess>,
}

impl RoomScanBridge {
    /// Builds the bridge with its store under `data_dir`. Must be called inside a
    /// tokio runtime, since the session actor is spawned here.
    pub fn new(
        config: BridgeConfig,
        data_dir: &std::path::Path,
        backend: PlatformBackend,
        presenter: Arc<dyn ScanPresenter>,
    ) -> Result<Self> {
        let store = ArtifactStore::new(config.artifact_dir(data_dir), &config.scene_extension);
        Self::with_parts(config, store, backend, presenter)
    }

    pub fn with_parts(
        config: BridgeConfig,
        store: ArtifactStore,
        backend: PlatformBackend,
        presenter: Arc<dyn ScanPresenter>,
    ) -> Result<Self> {
        let prober = CapabilityProber::new(
            backend.capability,
            config.minimum_version()?,
            config.probe_timeout(),
        );
        let timing = SessionTiming {
            grace_delay: config.grace_delay(),
            processing_timeout: config.processing_timeout(),
        };
        let controller = ScanController::spawn(
            backend.engine,
            presenter.clone(),
            store.clone(),
            config.default_file_prefix.clone(),
            timing,
        );

        log_info!(
            "room scan bridge ready (store: {}, minimum version {})",
            store.dir().display(),
            config.minimum_os_version
        );

        Ok(Self {
            config: Arc::new(config),
            prober,
            controller,
            store,
            presenter,
            scoped_access: backend.scoped_access,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn controller(&self) -> &ScanController {
        &self.controller
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub async fn check_capability(&self) -> CapabilityReport {
        self.prober.probe_off_thread().await
    }

    /// Probes afresh and opens a session, returning as soon as capture starts.
    pub async fn begin_scan(&self) -> Result<ScanTicket, BridgeError> {
        let report = self.prober.probe_off_thread().await;
        self.controller.start(report).await
    }

    /// Runs a whole scan session and resolves with its terminal outcome.
    pub async fn start_scan(&self) -> Result<ScanResponse, BridgeError> {
        let ticket = self.begin_scan().await?;
        Self::await_completion(ticket).await
    }

    pub async fn finish_scan(&self) -> Result<SessionSnapshot, BridgeError> {
        self.controller.finish().await
    }

    pub async fn save_scan(&self, file_name: Option<String>) -> Result<SessionSnapshot, BridgeError> {
        self.controller.save(file_name).await
    }

    pub async fn cancel_scan(&self) -> SessionSnapshot {
        self.controller.cancel().await
    }

    /// Commits the result kept from a failed save and resolves like `start_scan`.
    pub async fn retry_commit(&self) -> Result<ScanResponse, BridgeError> {
        let ticket = self.controller.retry_commit().await?;
        Self::await_completion(ticket).await
    }

    pub fn scan_state(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    pub async fn list_artifacts(&self) -> Result<Vec<ArtifactEntry>, BridgeError> {
        let store = self.store.clone();
        let artifacts = run_blocking(move || store.list()).await?;
        Ok(artifacts.iter().map(ArtifactEntry::from).collect())
    }

    /// Hands an existing scene file to the presenter's preview.
    pub async fn open_artifact(&self, file_name: String) -> Result<(), BridgeError> {
        let store = self.store.clone();
        let artifact = run_blocking(move || store.open(&file_name)).await?;
        self.presenter.preview(&artifact.file_path).map_err(|message| {
            log_warn!("preview of {} failed: {message}", artifact.file_name);
            BridgeError::Storage(io::Error::new(io::ErrorKind::Other, message))
        })
    }

    pub async fn delete_artifact(&self, file_name: String) -> Result<(), BridgeError> {
        let store = self.store.clone();
        run_blocking(move || store.delete(&file_name))
            .await
            .map_err(|err| match err {
                BridgeError::InvalidInput(_) | BridgeError::FileDeleteError(_) => err,
                other => BridgeError::FileDeleteError(other.to_string()),
            })
    }

    /// Copies a user-picked file into the store. `None` means the picker was dismissed.
    pub async fn import_artifact(&self, source: Option<PathBuf>) -> Result<ImportResponse, BridgeError> {
        let Some(source) = source else {
            return Err(BridgeError::UserCancelled);
        };
        let store = self.store.clone();
        let access = self.scoped_access.clone();
        let artifact = run_blocking(move || store.import(&source, access.as_ref())).await?;

        Ok(ImportResponse {
            file_name: artifact.file_name,
            file_path: artifact.file_path.to_string_lossy().into_owned(),
        })
    }

    async fn await_completion(ticket: ScanTicket) -> Result<ScanResponse, BridgeError> {
        let completion = ticket.outcome().await?;
        Ok(ScanResponse {
            success: true,
            message: completion.message,
            file_name: Some(completion.artifact.file_name),
            file_path: Some(completion.artifact.file_path.to_string_lossy().into_owned()),
            summary: Some(completion.summary),
        })
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, BridgeError>
where
    F: FnOnce() -> Result<T, BridgeError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|join_err| {
        BridgeError::Storage(io::Error::new(
            io::ErrorKind::Other,
            format!("store task failed: {join_err}"),
        ))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{DetectionMethod, PlatformVersion},
        platform::{EngineEvent, NoScopedAccess},
        scan::SessionState,
        testing::{sample_room, wait_for_state, FakeCapabilitySource, FakeEngine, RecordingPresenter},
    };
    use std::{fs, time::Duration};
    use tempfile::TempDir;

    struct Harness {
        bridge: RoomScanBridge,
        engine: Arc<FakeEngine>,
        presenter: Arc<RecordingPresenter>,
        dir: TempDir,
    }

    fn harness_with(source: FakeCapabilitySource) -> Harness {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let presenter = Arc::new(RecordingPresenter::default());
        let backend = PlatformBackend {
            capability: Arc::new(source),
            engine: engine.clone(),
            scoped_access: Arc::new(NoScopedAccess),
        };
        let bridge = RoomScanBridge::new(
            BridgeConfig::default(),
            dir.path(),
            backend,
            presenter.clone(),
        )
        .unwrap();
        Harness {
            bridge,
            engine,
            presenter,
            dir,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeCapabilitySource::capable())
    }

    /// Runs one scan to completion, saving under `file_name`.
    async fn scan_and_save(h: &Harness, file_name: Option<&str>) -> ScanResponse {
        let bridge = h.bridge.clone();
        let scan = tokio::spawn(async move { bridge.start_scan().await });

        wait_for_state(h.bridge.controller(), SessionState::CapturingInteractive).await;
        h.bridge.finish_scan().await.unwrap();
        assert!(h.engine.emit(EngineEvent::Processed(sample_room("room-1"))));
        wait_for_state(h.bridge.controller(), SessionState::AwaitingUserDecision).await;
        h.bridge
            .save_scan(file_name.map(str::to_string))
            .await
            .unwrap();

        scan.await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn old_platform_reports_required_version() {
        let h = harness_with(FakeCapabilitySource {
            os_version: Some(PlatformVersion::new(15, 4, 0)),
            ..FakeCapabilitySource::capable()
        });

        let report = h.bridge.check_capability().await;
        assert!(!report.supported);
        assert_eq!(report.detection_method, DetectionMethod::Unavailable);
        assert!(report.diagnostic.contains("16.0"));

        let err = h.bridge.start_scan().await.unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_OS_VERSION");
        assert_eq!(h.engine.start_count(), 0);
    }

    #[tokio::test]
    async fn unreadable_version_stays_distinct_from_unsupported() {
        let h = harness_with(FakeCapabilitySource {
            os_version: None,
            ..FakeCapabilitySource::capable()
        });

        let report = h.bridge.check_capability().await;
        assert_eq!(report.verdict(), crate::models::CapabilityVerdict::Indeterminate);

        let err = h.bridge.start_scan().await.unwrap_err();
        assert_eq!(err.code(), "ENGINE_NOT_AVAILABLE");
        assert_eq!(err.category(), crate::ErrorCategory::Unavailable);
    }

    #[tokio::test]
    async fn supported_device_completes_with_file_path() {
        let h = harness();
        let response = scan_and_save(&h, None).await;

        assert!(response.success);
        assert_eq!(response.message, "Room scan saved successfully");
        let path = PathBuf::from(response.file_path.unwrap());
        assert!(path.is_file());
        assert!(path.starts_with(h.dir.path().join("RoomScans")));
        assert_eq!(response.summary.unwrap().surface_count, 3);
    }

    #[tokio::test]
    async fn second_start_is_rejected_and_first_continues() {
        let h = harness();
        let bridge = h.bridge.clone();
        let first = tokio::spawn(async move { bridge.start_scan().await });
        let capturing =
            wait_for_state(h.bridge.controller(), SessionState::CapturingInteractive).await;

        let err = h.bridge.start_scan().await.unwrap_err();
        assert_eq!(err.code(), "SESSION_ALREADY_ACTIVE");
        let state = h.bridge.scan_state();
        assert_eq!(state.state, SessionState::CapturingInteractive);
        assert_eq!(state.session_id, capturing.session_id);

        h.bridge.cancel_scan().await;
        assert_eq!(first.await.unwrap().unwrap_err().code(), "SCAN_CANCELLED");
    }

    #[tokio::test]
    async fn import_rejects_wrong_extension_without_touching_store() {
        let h = harness();
        let source = h.dir.path().join("notes.txt");
        fs::write(&source, b"not a scene").unwrap();

        let err = h.bridge.import_artifact(Some(source)).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_FILE_TYPE");
        assert!(!h.bridge.store().dir().exists());
    }

    #[tokio::test]
    async fn import_without_selection_is_user_cancelled() {
        let h = harness();
        let err = h.bridge.import_artifact(None).await.unwrap_err();
        assert_eq!(err.code(), "USER_CANCELLED");
    }

    #[tokio::test]
    async fn import_copies_scene_into_store() {
        let h = harness();
        let source = h.dir.path().join("Garage.usdz");
        fs::write(&source, b"scene").unwrap();

        let imported = h.bridge.import_artifact(Some(source.clone())).await.unwrap();
        assert_eq!(imported.file_name, "Garage.usdz");
        assert!(source.exists());

        let listed = h.bridge.list_artifacts().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].file_path, imported.file_path);
    }

    #[tokio::test]
    async fn same_name_saved_twice_lists_both() {
        let h = harness();
        let first = scan_and_save(&h, Some("scan.usdz")).await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        let second = scan_and_save(&h, Some("scan.usdz")).await;

        assert_eq!(first.file_name.as_deref(), Some("scan.usdz"));
        let renamed = second.file_name.unwrap();
        assert_ne!(renamed, "scan.usdz");
        assert!(renamed.starts_with("scan_"));

        let listed = h.bridge.list_artifacts().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_ne!(listed[0].created_at, listed[1].created_at);
        assert_eq!(listed[0].file_name, renamed);
    }

    #[tokio::test]
    async fn open_hands_file_to_presenter() {
        let h = harness();
        let saved = scan_and_save(&h, Some("Office")).await;
        assert_eq!(saved.file_name.as_deref(), Some("Office.usdz"));

        h.bridge.open_artifact("Office.usdz".into()).await.unwrap();
        assert!(h
            .presenter
            .events()
            .contains(&"preview:Office.usdz".to_string()));

        let err = h.bridge.open_artifact("Missing.usdz".into()).await.unwrap_err();
        assert_eq!(err.code(), "FILE_NOT_FOUND");
    }

    #[tokio::test]
    async fn delete_errors_use_delete_code() {
        let h = harness();
        let err = h.bridge.delete_artifact("ghost.usdz".into()).await.unwrap_err();
        assert_eq!(err.code(), "FILE_DELETE_ERROR");

        let err = h.bridge.delete_artifact("../x.usdz".into()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENTS");

        scan_and_save(&h, Some("Hall.usdz")).await;
        h.bridge.delete_artifact("Hall.usdz".into()).await.unwrap();
        assert!(h.bridge.list_artifacts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_is_empty_before_first_save() {
        let h = harness();
        assert!(h.bridge.list_artifacts().await.unwrap().is_empty());
        assert!(!h.bridge.store().dir().exists());
    }

    #[tokio::test]
    async fn retry_commit_resolves_like_start() {
        let h = harness();
        h.engine
            .export_failures
            .store(1, std::sync::atomic::Ordering::SeqCst);

        let bridge = h.bridge.clone();
        let scan = tokio::spawn(async move { bridge.start_scan().await });
        wait_for_state(h.bridge.controller(), SessionState::CapturingInteractive).await;
        h.bridge.finish_scan().await.unwrap();
        h.engine.emit(EngineEvent::Processed(sample_room("room-9")));
        wait_for_state(h.bridge.controller(), SessionState::AwaitingUserDecision).await;
        h.bridge.save_scan(None).await.unwrap();
        assert_eq!(scan.await.unwrap().unwrap_err().code(), "SCAN_FAILED");
        assert!(h.bridge.scan_state().retry_available);

        let response = h.bridge.retry_commit().await.unwrap();
        assert!(response.success);
        assert!(PathBuf::from(response.file_path.unwrap()).is_file());
    }

    #[test]
    fn responses_serialize_camel_case() {
        let response = ScanResponse {
            success: true,
            message: "ok".into(),
            file_name: None,
            file_path: Some("/data/RoomScans/a.usdz".into()),
            summary: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["filePath"], "/data/RoomScans/a.usdz");
        assert!(json.get("file_path").is_none());
    }
}
