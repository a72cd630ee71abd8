#[cfg(feature = "tauri")]
pub mod commands;
pub mod prober;

pub use prober::CapabilityProber;
