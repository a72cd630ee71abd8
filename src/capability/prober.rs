use std::{sync::Arc, time::Duration};

use crate::{
    models::{CapabilityReport, DetectionMethod, PlatformVersion, UNKNOWN_VERSION},
    platform::CapabilitySource,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Answers whether this device can scan a room right now.
///
/// Every call queries the source afresh; reports are never cached.
#[derive(Clone)]
pub struct CapabilityProber {
    source: Arc<dyn CapabilitySource>,
    minimum_version: PlatformVersion,
    probe_timeout: Duration,
}

impl CapabilityProber {
    pub fn new(
        source: Arc<dyn CapabilitySource>,
        minimum_version: PlatformVersion,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            source,
            minimum_version,
            probe_timeout,
        }
    }

    pub fn minimum_version(&self) -> PlatformVersion {
        self.minimum_version
    }

    pub fn probe(&self) -> CapabilityReport {
        let source = self.source.as_ref();
        let required = self.minimum_version.to_string();
        let os_version = source.os_version();
        let device_model = source.device_model();
        let hardware_hint = source.try_heuristic();

        let mut report = CapabilityReport {
            os_version_satisfied: false,
            framework_present: false,
            hardware_hint,
            supported: false,
            detection_method: DetectionMethod::Unavailable,
            diagnostic: String::new(),
            os_version: os_version
                .map(|v| v.to_string())
                .unwrap_or_else(|| UNKNOWN_VERSION.into()),
            required_os_version: required.clone(),
            simulated_environment: false,
            device_model,
        };

        if !source.engine_platform() {
            // No minimum applies off the engine's own platform.
            report.os_version_satisfied = true;
            report.diagnostic = format!(
                "No room scanning engine on this platform ({})",
                report.device_model
            );
            log_info!("capability probe: {}", report.diagnostic);
            return report;
        }

        match os_version {
            Some(version) if version >= self.minimum_version => {
                report.os_version_satisfied = true;
            }
            Some(version) => {
                report.diagnostic = format!(
                    "Room scanning requires platform version {required} or later (found {version})"
                );
                log_info!("capability probe: {}", report.diagnostic);
                return report;
            }
            None => {
                report.diagnostic = format!(
                    "Could not determine platform version; room scanning requires {required} or later"
                );
                log_warn!("capability probe: {}", report.diagnostic);
                return report;
            }
        }

        if source.is_simulated() {
            report.simulated_environment = true;
            report.diagnostic =
                "Running in a simulated environment; depth sensors are not available".into();
            log_info!("capability probe: {}", report.diagnostic);
            return report;
        }

        if let Some(verdict) = source.try_direct() {
            report.framework_present = true;
            report.supported = verdict;
            report.detection_method = DetectionMethod::DirectQuery;
            report.diagnostic = if verdict {
                "Room scanning supported (direct capability query)".into()
            } else {
                "Room scanning not supported on this device (direct capability query)".into()
            };
            log_debug!("capability probe: {}", report.diagnostic);
            return report;
        }

        match source.try_reflective() {
            Some(Ok(verdict)) => {
                report.framework_present = true;
                report.supported = verdict;
                report.detection_method = DetectionMethod::ReflectionQuery;
                report.diagnostic = if verdict {
                    "Room scanning supported (runtime capability lookup)".into()
                } else {
                    "Room scanning not supported on this device (runtime capability lookup)".into()
                };
                log_debug!("capability probe: {}", report.diagnostic);
                return report;
            }
            Some(Err(err)) => {
                report.framework_present = true;
                report.detection_method = DetectionMethod::Unavailable;
                report.diagnostic = format!("Unable to determine room scanning support: {err}");
                log_warn!("capability probe: {}", report.diagnostic);
                return report;
            }
            None => {}
        }

        // The heuristic never grants support; it only explains the negative.
        report.detection_method = DetectionMethod::HardwareHeuristic;
        report.diagnostic = if hardware_hint {
            "Low confidence: depth sensing hardware detected but the room scanning engine is not available".into()
        } else {
            "Low confidence: no depth sensing hardware detected and the room scanning engine is not available".into()
        };
        log_info!("capability probe: {}", report.diagnostic);
        report
    }

    /// Runs [`probe`](Self::probe) on the blocking pool, bounded by the probe timeout.
    pub async fn probe_off_thread(&self) -> CapabilityReport {
        let prober = self.clone();
        let task = tokio::task::spawn_blocking(move || prober.probe());

        match tokio::time::timeout(self.probe_timeout, task).await {
            Ok(Ok(report)) => report,
            Ok(Err(join_err)) => {
                log_warn!("capability probe task failed: {join_err}");
                self.indeterminate(format!("Capability probe failed: {join_err}"))
            }
            Err(_) => {
                log_warn!(
                    "capability probe timed out after {}ms",
                    self.probe_timeout.as_millis()
                );
                self.indeterminate(format!(
                    "Capability probe did not finish within {}ms",
                    self.probe_timeout.as_millis()
                ))
            }
        }
    }

    fn indeterminate(&self, diagnostic: String) -> CapabilityReport {
        CapabilityReport {
            os_version_satisfied: false,
            framework_present: false,
            hardware_hint: false,
            supported: false,
            detection_method: DetectionMethod::Unavailable,
            diagnostic,
            os_version: UNKNOWN_VERSION.into(),
            required_os_version: self.minimum_version.to_string(),
            simulated_environment: false,
            device_model: "unknown".into(),
        }
    }
}
