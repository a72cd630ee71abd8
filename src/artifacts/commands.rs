use std::path::PathBuf;

use tauri::State;

use crate::{error::ErrorPayload, models::ArtifactEntry, ImportResponse, RoomScanBridge};

#[tauri::command]
pub async fn list_artifacts(
    state: State<'_, RoomScanBridge>,
) -> Result<Vec<ArtifactEntry>, ErrorPayload> {
    state.list_artifacts().await.map_err(ErrorPayload::from)
}

#[tauri::command]
pub async fn open_artifact(
    state: State<'_, RoomScanBridge>,
    file_name: String,
) -> Result<(), ErrorPayload> {
    state.open_artifact(file_name).await.map_err(ErrorPayload::from)
}

#[tauri::command]
pub async fn delete_artifact(
    state: State<'_, RoomScanBridge>,
    file_name: String,
) -> Result<(), ErrorPayload> {
    state
        .delete_artifact(file_name)
        .await
        .map_err(ErrorPayload::from)
}

/// `path` is whatever the host's file picker returned; absent when it was dismissed.
#[tauri::command]
pub async fn import_artifact(
    state: State<'_, RoomScanBridge>,
    path: Option<PathBuf>,
) -> Result<ImportResponse, ErrorPayload> {
    state.import_artifact(path).await.map_err(ErrorPayload::from)
}
