use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::models::PlatformVersion;

pub const SETTINGS_FILE_NAME: &str = "roomscan.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    pub minimum_os_version: String,
    /// How long to wait after stopping capture for the engine's final data.
    pub grace_delay_ms: u64,
    pub processing_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub artifact_dir_name: String,
    pub scene_extension: String,
    pub default_file_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            minimum_os_version: "16.0".into(),
            grace_delay_ms: 5_000,
            processing_timeout_ms: 30_000,
            probe_timeout_ms: 2_000,
            artifact_dir_name: "RoomScans".into(),
            scene_extension: "usdz".into(),
            default_file_prefix: "room_scan".into(),
        }
    }
}

impl BridgeConfig {
    /// Reads the settings file, falling back to defaults when it is missing or unparsable.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring malformed settings at {}: {err}; using defaults",
                    path.display()
                );
                BridgeConfig::default()
            })
        } else {
            BridgeConfig::default()
        };

        Ok(config.with_env_overrides())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(grace) = std::env::var("ROOMSCAN_GRACE_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
        {
            self.grace_delay_ms = grace;
        }
        self
    }

    pub fn minimum_version(&self) -> Result<PlatformVersion> {
        self.minimum_os_version
            .parse()
            .map_err(|err| anyhow!("invalid minimumOsVersion: {err}"))
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn artifact_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.artifact_dir_name)
    }
}
