use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::room::RoomSummary;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanArtifact {
    pub file_name: String,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RoomSummary>,
}

/// Listing row handed to hosts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEntry {
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub file_path: String,
}

impl From<&ScanArtifact> for ArtifactEntry {
    fn from(artifact: &ScanArtifact) -> Self {
        Self {
            file_name: artifact.file_name.clone(),
            created_at: artifact.created_at,
            file_path: artifact.file_path.to_string_lossy().into_owned(),
        }
    }
}
