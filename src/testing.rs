//! Scripted collaborators for unit tests.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
    time::Duration,
};

use crate::{
    models::{
        CapabilityReport, CapturedObject, CapturedSurface, ConfidenceTier, DetectionMethod,
        PlatformVersion, ProcessedRoom, RawCapture, RoomDimensions, RoomSummary,
    },
    platform::{CapabilitySource, EngineEvent, LookupError, ScanEngine, ScanPresenter},
    scan::{EngineEventSink, ScanController, SessionSnapshot, SessionState},
};

pub struct FakeCapabilitySource {
    pub os_version: Option<PlatformVersion>,
    pub simulated: bool,
    pub engine_platform: bool,
    pub direct: Option<bool>,
    pub reflective: Option<Result<bool, LookupError>>,
    pub heuristic: bool,
    pub delay: Option<Duration>,
}

impl FakeCapabilitySource {
    /// A recent device with the engine linked and reporting support.
    pub fn capable() -> Self {
        Self {
            os_version: Some(PlatformVersion::new(17, 2, 0)),
            simulated: false,
            engine_platform: true,
            direct: Some(true),
            reflective: None,
            heuristic: true,
            delay: None,
        }
    }
}

impl CapabilitySource for FakeCapabilitySource {
    fn os_version(&self) -> Option<PlatformVersion> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.os_version
    }

    fn device_model(&self) -> String {
        "iPhone15,3".into()
    }

    fn engine_platform(&self) -> bool {
        self.engine_platform
    }

    fn is_simulated(&self) -> bool {
        self.simulated
    }

    fn try_direct(&self) -> Option<bool> {
        self.direct
    }

    fn try_reflective(&self) -> Option<Result<bool, LookupError>> {
        self.reflective.clone()
    }

    fn try_heuristic(&self) -> bool {
        self.heuristic
    }
}

pub fn supported_report() -> CapabilityReport {
    CapabilityReport {
        os_version_satisfied: true,
        framework_present: true,
        hardware_hint: true,
        supported: true,
        detection_method: DetectionMethod::DirectQuery,
        diagnostic: "supported".into(),
        os_version: "17.2".into(),
        required_os_version: "16.0".into(),
        simulated_environment: false,
        device_model: "iPhone15,3".into(),
    }
}

pub fn sample_room(token: &str) -> ProcessedRoom {
    ProcessedRoom {
        token: token.into(),
        confidence: ConfidenceTier::High,
        dimensions: Some(RoomDimensions {
            width: 3.5,
            height: 2.4,
            length: 4.2,
        }),
        surfaces: ["wall", "wall", "floor"]
            .into_iter()
            .map(|category| CapturedSurface {
                category: category.into(),
                confidence: ConfidenceTier::High,
            })
            .collect(),
        objects: vec![CapturedObject {
            category: "bed".into(),
            confidence: ConfidenceTier::Medium,
            dimensions: None,
        }],
    }
}

#[derive(Default)]
pub struct FakeEngine {
    sink: Mutex<Option<EngineEventSink>>,
    pub starts: AtomicU32,
    pub stops: AtomicU32,
    pub start_error: Mutex<Option<String>>,
    pub refine_error: Mutex<Option<String>>,
    pub refine_delay: Mutex<Option<Duration>>,
    pub export_delay: Mutex<Option<Duration>>,
    pub export_failures: AtomicU32,
}

impl FakeEngine {
    /// Delivers an engine callback for the most recently started session.
    pub fn emit(&self, event: EngineEvent) -> bool {
        let sink = self.sink.lock().unwrap().clone();
        sink.map(|sink| sink.emit(event)).unwrap_or(false)
    }

    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
}

impl ScanEngine for FakeEngine {
    fn start_session(&self, sink: EngineEventSink) -> Result<(), String> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.start_error.lock().unwrap().clone() {
            return Err(message);
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop_session(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn refine(&self, raw: RawCapture) -> Result<ProcessedRoom, String> {
        if let Some(delay) = *self.refine_delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        match self.refine_error.lock().unwrap().clone() {
            Some(message) => Err(message),
            None => Ok(sample_room(&raw.token)),
        }
    }

    fn export(&self, room: &ProcessedRoom) -> Result<Vec<u8>, String> {
        if let Some(delay) = *self.export_delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        let failures = self.export_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.export_failures.store(failures - 1, Ordering::SeqCst);
            return Err("export failed".into());
        }
        Ok(format!("scene:{}", room.token).into_bytes())
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    pub events: Mutex<Vec<String>>,
}

impl RecordingPresenter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ScanPresenter for RecordingPresenter {
    fn present_capture(&self, _session_id: &str) {
        self.record("capture".into());
    }

    fn present_summary(&self, _session_id: &str, summary: &RoomSummary) {
        self.record(format!("summary:{}", summary.object_count));
    }

    fn dismiss(&self) {
        self.record("dismiss".into());
    }

    fn preview(&self, path: &Path) -> Result<(), String> {
        self.record(format!(
            "preview:{}",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));
        Ok(())
    }
}

/// Waits until the controller publishes `state`, failing the test after two seconds.
pub async fn wait_for_state(controller: &ScanController, state: SessionState) -> SessionSnapshot {
    let mut rx = controller.subscribe();
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        rx.wait_for(|snapshot| snapshot.state == state)
            .await
            .map(|snapshot| snapshot.clone())
    })
    .await;

    match result {
        Ok(Ok(snapshot)) => snapshot,
        _ => panic!(
            "timed out waiting for {:?}; last state {:?}",
            state,
            controller.snapshot().state
        ),
    }
}
