//! Backend for desktop and CI targets, which have no room-scanning engine.

use sysinfo::System;

use crate::models::{PlatformVersion, ProcessedRoom, RawCapture};
use crate::scan::EngineEventSink;

use super::{is_simulated_environment, CapabilitySource, LookupError, ScanEngine};

pub struct HostCapabilitySource {
    os_version: Option<PlatformVersion>,
    device_model: String,
}

impl HostCapabilitySource {
    pub fn new() -> Self {
        let os_version = System::os_version().and_then(|raw| match raw.parse() {
            Ok(version) => Some(version),
            Err(err) => {
                log::debug!("host OS version '{raw}' not comparable: {err}");
                None
            }
        });
        let device_model = format!(
            "{} {} ({})",
            System::name().unwrap_or_else(|| "unknown".into()),
            System::os_version().unwrap_or_default(),
            std::env::consts::ARCH
        );

        Self {
            os_version,
            device_model,
        }
    }
}

impl Default for HostCapabilitySource {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilitySource for HostCapabilitySource {
    fn os_version(&self) -> Option<PlatformVersion> {
        self.os_version
    }

    fn device_model(&self) -> String {
        self.device_model.clone()
    }

    fn engine_platform(&self) -> bool {
        false
    }

    fn is_simulated(&self) -> bool {
        is_simulated_environment()
    }

    fn try_direct(&self) -> Option<bool> {
        None
    }

    fn try_reflective(&self) -> Option<Result<bool, LookupError>> {
        None
    }

    fn try_heuristic(&self) -> bool {
        false
    }
}

/// Engine stand-in that refuses every session.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEngine;

const NO_ENGINE: &str = "no room-scanning engine on this platform";

impl ScanEngine for NoEngine {
    fn start_session(&self, _sink: EngineEventSink) -> Result<(), String> {
        Err(NO_ENGINE.into())
    }

    fn stop_session(&self) {}

    fn refine(&self, _raw: RawCapture) -> Result<ProcessedRoom, String> {
        Err(NO_ENGINE.into())
    }

    fn export(&self, _room: &ProcessedRoom) -> Result<Vec<u8>, String> {
        Err(NO_ENGINE.into())
    }
}
