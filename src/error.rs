//! Error taxonomy shared by every inbound operation.
//!
//! Each variant maps to a stable string code that hosts match on; the display
//! text is for humans only.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    /// Capability could not be determined. Not the same as unsupported.
    Unavailable,
    Unsupported,
    SessionConflict,
    EngineFailure,
    StorageFailure,
    InvalidInput,
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Room scanning requires platform version {required} or later")]
    UnsupportedOsVersion { required: String },

    #[error("Room scanning engine is not available: {0}")]
    EngineNotAvailable(String),

    #[error("Room scanning is not supported on this device: {0}")]
    DeviceNotSupported(String),

    #[error("A scan session is already active")]
    SessionAlreadyActive,

    #[error("Room scan failed: {0}")]
    ScanFailed(String),

    #[error("Room scan was cancelled by user")]
    ScanCancelled,

    #[error("Operation not valid while session is {0}")]
    InvalidState(String),

    #[error("Scene file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to delete scene file: {0}")]
    FileDeleteError(String),

    #[error("Unsupported file type: {0}")]
    InvalidFileType(String),

    #[error("No file was selected")]
    UserCancelled,

    #[error("Failed to import scene file: {0}")]
    ImportFailed(String),

    #[error("Invalid argument: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl BridgeError {
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::UnsupportedOsVersion { .. } => "UNSUPPORTED_OS_VERSION",
            BridgeError::EngineNotAvailable(_) => "ENGINE_NOT_AVAILABLE",
            BridgeError::DeviceNotSupported(_) => "DEVICE_NOT_SUPPORTED",
            BridgeError::SessionAlreadyActive => "SESSION_ALREADY_ACTIVE",
            BridgeError::ScanFailed(_) => "SCAN_FAILED",
            BridgeError::ScanCancelled => "SCAN_CANCELLED",
            BridgeError::InvalidState(_) => "INVALID_STATE",
            BridgeError::FileNotFound(_) => "FILE_NOT_FOUND",
            BridgeError::FileDeleteError(_) => "FILE_DELETE_ERROR",
            BridgeError::InvalidFileType(_) => "INVALID_FILE_TYPE",
            BridgeError::UserCancelled => "USER_CANCELLED",
            BridgeError::ImportFailed(_) => "IMPORT_FAILED",
            BridgeError::InvalidInput(_) => "INVALID_ARGUMENTS",
            BridgeError::Storage(_) => "STORAGE_FAILURE",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::EngineNotAvailable(_) => ErrorCategory::Unavailable,
            BridgeError::UnsupportedOsVersion { .. } | BridgeError::DeviceNotSupported(_) => {
                ErrorCategory::Unsupported
            }
            BridgeError::SessionAlreadyActive | BridgeError::InvalidState(_) => {
                ErrorCategory::SessionConflict
            }
            BridgeError::ScanFailed(_) | BridgeError::ScanCancelled => ErrorCategory::EngineFailure,
            BridgeError::FileNotFound(_)
            | BridgeError::FileDeleteError(_)
            | BridgeError::ImportFailed(_)
            | BridgeError::Storage(_) => ErrorCategory::StorageFailure,
            BridgeError::InvalidFileType(_)
            | BridgeError::UserCancelled
            | BridgeError::InvalidInput(_) => ErrorCategory::InvalidInput,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            category: self.category(),
        }
    }
}

/// Structured error handed across the host boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub category: ErrorCategory,
}

impl From<BridgeError> for ErrorPayload {
    fn from(err: BridgeError) -> Self {
        err.to_payload()
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
