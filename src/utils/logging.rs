//! Logger setup plus conditional logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! A module opts in by declaring the flag and importing the macros from the crate root:
//!
//! ```text
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_info};
//! ```

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes env_logger once per process.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug` when
/// `ROOMSCAN_DEBUG` is `1`/`true`. Safe to call from several host entry points.
pub fn init_logging() {
    INIT.call_once(|| {
        let level = if debug_enabled() {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };

        let mut builder = env_logger::Builder::new();
        builder.filter_level(level);
        if let Ok(spec) = std::env::var("RUST_LOG") {
            builder.parse_filters(&spec);
        }
        // A host may already have installed its own logger.
        let _ = builder.try_init();
    });
}

pub fn debug_enabled() -> bool {
    std::env::var("ROOMSCAN_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Conditional debug logging; requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Conditional info logging; requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Conditional warn logging; requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Conditional error logging; requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
