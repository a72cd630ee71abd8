//! FFI backend over the Swift shim that wraps the system room-capture framework.
//!
//! The shim owns every framework object. Rust sees opaque tokens, JSON-encoded
//! processed rooms, and byte buffers; every pointer the shim returns is freed
//! through the matching `ios_roomscan_free_*` call.

use anyhow::{anyhow, bail, Context, Result};
use std::ffi::{c_char, CStr, CString};
use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use crate::{
    models::{ConfidenceTier, PlatformVersion, ProcessedRoom, RawCapture},
    scan::EngineEventSink,
};

use super::{
    is_simulated_environment, CapabilitySource, EngineEvent, LookupError, PlatformBackend,
    ProgressKind, ProgressUpdate, ScanEngine, ScopedAccess,
};

// Capability query results shared by the direct and reflective entry points.
const QUERY_SUPPORTED: i32 = 1;
const QUERY_UNSUPPORTED: i32 = 0;
const QUERY_NOT_LINKED: i32 = -1;
const QUERY_SYMBOL_MISSING: i32 = -2;
const QUERY_PROPERTY_UNREADABLE: i32 = -3;

const CAPABILITY_PROPERTY: &str = "RoomCaptureSession.isSupported";

extern "C" {
    fn ios_roomscan_os_version(major: *mut u32, minor: *mut u32, patch: *mut u32) -> bool;
    fn ios_roomscan_device_model() -> *mut c_char;
    fn ios_roomscan_is_simulator() -> bool;
    fn ios_roomscan_direct_supported() -> i32;
    fn ios_roomscan_reflective_supported() -> i32;
    fn ios_roomscan_has_depth_sensor() -> bool;

    fn ios_roomscan_start_session(session_id: *const c_char) -> *mut c_char;
    fn ios_roomscan_stop_session();
    fn ios_roomscan_refine(token: *const c_char, out_error: *mut *mut c_char) -> *mut c_char;
    fn ios_roomscan_export(
        token: *const c_char,
        out_length: *mut usize,
        out_error: *mut *mut c_char,
    ) -> *mut u8;

    fn ios_roomscan_begin_access(path: *const c_char) -> bool;
    fn ios_roomscan_end_access(path: *const c_char);

    fn ios_roomscan_free_string(ptr: *mut c_char);
    fn ios_roomscan_free_buffer(ptr: *mut u8);

    fn ios_roomscan_set_callbacks(
        on_progress: extern "C" fn(kind: i32, surfaces: u32, objects: u32, confidence: f64),
        on_raw_captured: extern "C" fn(token: *const c_char),
        on_processed: extern "C" fn(room_json: *const c_char),
        on_failed: extern "C" fn(message: *const c_char),
    );
}

/// Where shim callbacks go. Holds only the sink of the session the engine is
/// running; the session itself lives in the controller.
static EVENT_ROUTE: Mutex<Option<EngineEventSink>> = Mutex::new(None);
static CALLBACKS: Once = Once::new();

fn route(event: EngineEvent) {
    let sink = match EVENT_ROUTE.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    match sink {
        Some(sink) => {
            if !sink.emit(event) {
                log::warn!("scan controller gone; dropping engine callback");
            }
        }
        None => log::debug!("engine callback with no active session"),
    }
}

fn set_route(sink: Option<EngineEventSink>) {
    match EVENT_ROUTE.lock() {
        Ok(mut guard) => *guard = sink,
        Err(poisoned) => *poisoned.into_inner() = sink,
    }
}

extern "C" fn rust_progress_callback(kind: i32, surfaces: u32, objects: u32, confidence: f64) {
    let kind = match kind {
        0 => ProgressKind::Added,
        1 => ProgressKind::Changed,
        3 => ProgressKind::Removed,
        _ => ProgressKind::Updated,
    };
    route(EngineEvent::Progress(ProgressUpdate {
        kind,
        surface_count: surfaces,
        object_count: objects,
        confidence: ConfidenceTier::from_score(confidence),
    }));
}

extern "C" fn rust_raw_captured_callback(token: *const c_char) {
    match unsafe { c_ptr_to_string(token) } {
        Ok(token) => route(EngineEvent::RawCaptured(RawCapture { token })),
        Err(err) => route(EngineEvent::Failed(format!("unreadable capture token: {err:#}"))),
    }
}

extern "C" fn rust_processed_callback(room_json: *const c_char) {
    let decoded = unsafe { c_ptr_to_string(room_json) }.and_then(|json| decode_room(&json));
    match decoded {
        Ok(room) => route(EngineEvent::Processed(room)),
        Err(err) => route(EngineEvent::Failed(format!("{err:#}"))),
    }
}

extern "C" fn rust_failed_callback(message: *const c_char) {
    let message = unsafe { c_ptr_to_string(message) }
        .unwrap_or_else(|err| format!("engine failure (unreadable message: {err})"));
    route(EngineEvent::Failed(message));
}

fn decode_room(json: &str) -> Result<ProcessedRoom> {
    serde_json::from_str(json).context("Failed to decode processed room from engine")
}

unsafe fn c_ptr_to_string(ptr: *const c_char) -> Result<String> {
    if ptr.is_null() {
        return Ok(String::new());
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(|s| s.to_owned())
        .map_err(|e| anyhow!(e))
}

/// Takes ownership of a shim-allocated string.
unsafe fn take_shim_string(ptr: *mut c_char) -> Result<Option<String>> {
    if ptr.is_null() {
        return Ok(None);
    }
    let value = c_ptr_to_string(ptr);
    ios_roomscan_free_string(ptr);
    value.map(Some)
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).with_context(|| format!("'{value}' contains an interior null byte"))
}

pub struct IosCapabilitySource;

impl CapabilitySource for IosCapabilitySource {
    fn os_version(&self) -> Option<PlatformVersion> {
        let (mut major, mut minor, mut patch) = (0u32, 0u32, 0u32);
        let known = unsafe { ios_roomscan_os_version(&mut major, &mut minor, &mut patch) };
        known.then(|| PlatformVersion::new(major, minor, patch))
    }

    fn device_model(&self) -> String {
        match unsafe { take_shim_string(ios_roomscan_device_model()) } {
            Ok(Some(model)) if !model.is_empty() => model,
            Ok(_) => "unknown".into(),
            Err(err) => {
                log::debug!("device model unreadable: {err:#}");
                "unknown".into()
            }
        }
    }

    fn is_simulated(&self) -> bool {
        unsafe { ios_roomscan_is_simulator() } || is_simulated_environment()
    }

    fn try_direct(&self) -> Option<bool> {
        match unsafe { ios_roomscan_direct_supported() } {
            QUERY_SUPPORTED => Some(true),
            QUERY_UNSUPPORTED => Some(false),
            _ => None,
        }
    }

    fn try_reflective(&self) -> Option<Result<bool, LookupError>> {
        match unsafe { ios_roomscan_reflective_supported() } {
            QUERY_SUPPORTED => Some(Ok(true)),
            QUERY_UNSUPPORTED => Some(Ok(false)),
            QUERY_NOT_LINKED => None,
            QUERY_SYMBOL_MISSING => Some(Err(LookupError::SymbolMissing(
                CAPABILITY_PROPERTY.into(),
            ))),
            QUERY_PROPERTY_UNREADABLE => Some(Err(LookupError::PropertyUnreadable(
                CAPABILITY_PROPERTY.into(),
            ))),
            other => Some(Err(LookupError::PropertyUnreadable(format!(
                "{CAPABILITY_PROPERTY} (status {other})"
            )))),
        }
    }

    fn try_heuristic(&self) -> bool {
        unsafe { ios_roomscan_has_depth_sensor() }
    }
}

pub struct IosEngine;

impl IosEngine {
    fn start(&self, sink: EngineEventSink) -> Result<()> {
        let session_id = c_string(&sink.session_id())?;
        set_route(Some(sink));

        let error = unsafe { take_shim_string(ios_roomscan_start_session(session_id.as_ptr()))? };
        if let Some(message) = error {
            set_route(None);
            bail!(message);
        }
        Ok(())
    }

    fn refine_raw(&self, raw: &RawCapture) -> Result<ProcessedRoom> {
        let token = c_string(&raw.token)?;
        let mut error: *mut c_char = std::ptr::null_mut();

        unsafe {
            let json = ios_roomscan_refine(token.as_ptr(), &mut error);
            if let Some(message) = take_shim_string(error)? {
                if !json.is_null() {
                    ios_roomscan_free_string(json);
                }
                bail!(message);
            }
            let json = take_shim_string(json)?
                .ok_or_else(|| anyhow!("engine returned no processed room"))?;
            decode_room(&json)
        }
    }

    fn export_room(&self, room: &ProcessedRoom) -> Result<Vec<u8>> {
        let token = c_string(&room.token)?;
        let mut length: usize = 0;
        let mut error: *mut c_char = std::ptr::null_mut();

        unsafe {
            let ptr = ios_roomscan_export(token.as_ptr(), &mut length, &mut error);
            if let Some(message) = take_shim_string(error)? {
                if !ptr.is_null() {
                    ios_roomscan_free_buffer(ptr);
                }
                bail!(message);
            }
            if ptr.is_null() || length == 0 {
                bail!("engine returned an empty scene export");
            }

            let data = std::slice::from_raw_parts(ptr, length).to_vec();
            ios_roomscan_free_buffer(ptr);
            Ok(data)
        }
    }
}

impl ScanEngine for IosEngine {
    fn start_session(&self, sink: EngineEventSink) -> Result<(), String> {
        self.start(sink).map_err(|err| format!("{err:#}"))
    }

    fn stop_session(&self) {
        unsafe { ios_roomscan_stop_session() };
    }

    fn refine(&self, raw: RawCapture) -> Result<ProcessedRoom, String> {
        self.refine_raw(&raw).map_err(|err| format!("{err:#}"))
    }

    fn export(&self, room: &ProcessedRoom) -> Result<Vec<u8>, String> {
        self.export_room(room).map_err(|err| format!("{err:#}"))
    }
}

pub struct IosScopedAccess;

impl ScopedAccess for IosScopedAccess {
    fn begin(&self, path: &Path) -> bool {
        match c_string(&path.to_string_lossy()) {
            Ok(path) => unsafe { ios_roomscan_begin_access(path.as_ptr()) },
            Err(err) => {
                log::warn!("cannot request access: {err:#}");
                false
            }
        }
    }

    fn end(&self, path: &Path) {
        if let Ok(path) = c_string(&path.to_string_lossy()) {
            unsafe { ios_roomscan_end_access(path.as_ptr()) };
        }
    }
}

pub fn backend() -> PlatformBackend {
    CALLBACKS.call_once(|| unsafe {
        ios_roomscan_set_callbacks(
            rust_progress_callback,
            rust_raw_captured_callback,
            rust_processed_callback,
            rust_failed_callback,
        );
    });

    PlatformBackend {
        capability: Arc::new(IosCapabilitySource),
        engine: Arc::new(IosEngine),
        scoped_access: Arc::new(IosScopedAccess),
    }
}
