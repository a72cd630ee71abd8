#[cfg(feature = "tauri")]
pub mod commands;
pub mod store;

pub use store::{validate_file_name, ArtifactStore};
