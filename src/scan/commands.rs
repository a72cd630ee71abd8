use tauri::State;

use crate::{
    error::ErrorPayload,
    scan::SessionSnapshot,
    RoomScanBridge, ScanResponse,
};

fn bridge_from_state(state: &State<'_, RoomScanBridge>) -> RoomScanBridge {
    state.inner().clone()
}

/// Resolves once the session reaches a terminal state.
#[tauri::command]
pub async fn start_scan(state: State<'_, RoomScanBridge>) -> Result<ScanResponse, ErrorPayload> {
    let bridge = bridge_from_state(&state);
    bridge.start_scan().await.map_err(ErrorPayload::from)
}

#[tauri::command]
pub async fn finish_scan(state: State<'_, RoomScanBridge>) -> Result<SessionSnapshot, ErrorPayload> {
    let bridge = bridge_from_state(&state);
    bridge.finish_scan().await.map_err(ErrorPayload::from)
}

#[tauri::command]
pub async fn save_scan(
    state: State<'_, RoomScanBridge>,
    file_name: Option<String>,
) -> Result<SessionSnapshot, ErrorPayload> {
    let bridge = bridge_from_state(&state);
    bridge.save_scan(file_name).await.map_err(ErrorPayload::from)
}

#[tauri::command]
pub async fn cancel_scan(state: State<'_, RoomScanBridge>) -> Result<SessionSnapshot, ErrorPayload> {
    let bridge = bridge_from_state(&state);
    Ok(bridge.cancel_scan().await)
}

#[tauri::command]
pub async fn retry_commit(state: State<'_, RoomScanBridge>) -> Result<ScanResponse, ErrorPayload> {
    let bridge = bridge_from_state(&state);
    bridge.retry_commit().await.map_err(ErrorPayload::from)
}

#[tauri::command]
pub async fn get_scan_state(state: State<'_, RoomScanBridge>) -> Result<SessionSnapshot, ErrorPayload> {
    Ok(state.scan_state())
}
