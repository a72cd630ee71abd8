use tauri::State;

use crate::{error::ErrorPayload, models::CapabilityReport, RoomScanBridge};

#[tauri::command]
pub async fn check_capability(state: State<'_, RoomScanBridge>) -> Result<CapabilityReport, ErrorPayload> {
    Ok(state.check_capability().await)
}
