use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DetectionMethod {
    DirectQuery,
    ReflectionQuery,
    HardwareHeuristic,
    Unavailable,
}

/// What a host should tell the user about a report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CapabilityVerdict {
    Supported,
    Unsupported,
    Indeterminate,
}

impl CapabilityVerdict {
    pub fn user_message(&self) -> &'static str {
        match self {
            CapabilityVerdict::Supported => "Room scanning is available",
            CapabilityVerdict::Unsupported => "Room scanning is not supported on this device",
            CapabilityVerdict::Indeterminate => "Could not verify room scanning support, try again",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityReport {
    pub os_version_satisfied: bool,
    pub framework_present: bool,
    pub hardware_hint: bool,
    pub supported: bool,
    pub detection_method: DetectionMethod,
    pub diagnostic: String,
    pub os_version: String,
    pub required_os_version: String,
    pub simulated_environment: bool,
    pub device_model: String,
}

impl CapabilityReport {
    pub fn verdict(&self) -> CapabilityVerdict {
        if self.supported {
            return CapabilityVerdict::Supported;
        }
        if !self.os_version_satisfied && self.os_version != UNKNOWN_VERSION {
            return CapabilityVerdict::Unsupported;
        }
        if self.simulated_environment {
            return CapabilityVerdict::Unsupported;
        }
        match self.detection_method {
            DetectionMethod::DirectQuery | DetectionMethod::ReflectionQuery => {
                CapabilityVerdict::Unsupported
            }
            DetectionMethod::HardwareHeuristic | DetectionMethod::Unavailable => {
                CapabilityVerdict::Indeterminate
            }
        }
    }

    /// Maps the report onto the error a scan request must be rejected with, if any.
    pub fn admit(&self) -> Result<(), BridgeError> {
        if self.supported {
            return Ok(());
        }
        if !self.os_version_satisfied && self.os_version == UNKNOWN_VERSION {
            return Err(BridgeError::EngineNotAvailable(self.diagnostic.clone()));
        }
        if !self.os_version_satisfied {
            return Err(BridgeError::UnsupportedOsVersion {
                required: self.required_os_version.clone(),
            });
        }
        if self.simulated_environment {
            return Err(BridgeError::DeviceNotSupported(self.diagnostic.clone()));
        }
        match self.detection_method {
            DetectionMethod::DirectQuery | DetectionMethod::ReflectionQuery => {
                Err(BridgeError::DeviceNotSupported(self.diagnostic.clone()))
            }
            DetectionMethod::HardwareHeuristic | DetectionMethod::Unavailable => {
                Err(BridgeError::EngineNotAvailable(self.diagnostic.clone()))
            }
        }
    }
}

pub const UNKNOWN_VERSION: &str = "unknown";

/// Dotted platform version, compared component-wise. Missing components are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlatformVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PlatformVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

impl FromStr for PlatformVersion {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("empty version string".into());
        }

        let mut parts = [0u32; 3];
        for (index, piece) in trimmed.split('.').enumerate() {
            if index >= parts.len() {
                return Err(format!("too many components in version '{trimmed}'"));
            }
            parts[index] = piece
                .parse()
                .map_err(|_| format!("invalid version component '{piece}' in '{trimmed}'"))?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}
