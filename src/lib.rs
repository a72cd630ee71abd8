pub mod artifacts;
pub mod bridge;
pub mod capability;
pub mod error;
pub mod models;
pub mod platform;
pub mod scan;
pub mod settings;
pub mod utils;

#[cfg(test)]
mod testing;

pub use bridge::{ImportResponse, RoomScanBridge, ScanResponse};
pub use error::{BridgeError, ErrorCategory, ErrorPayload};
pub use settings::BridgeConfig;

#[cfg(feature = "tauri")]
mod host_plugin {
    use std::{path::Path, sync::Arc};

    use tauri::{
        plugin::{Builder, TauriPlugin},
        AppHandle, Emitter, Manager, Runtime,
    };
    use tauri_plugin_opener::OpenerExt;

    use crate::{
        artifacts::commands::{delete_artifact, import_artifact, list_artifacts, open_artifact},
        capability::commands::check_capability,
        models::RoomSummary,
        platform::{default_backend, ScanPresenter},
        scan::{
            commands::{
                cancel_scan, finish_scan, get_scan_state, retry_commit, save_scan, start_scan,
            },
            SessionSnapshot,
        },
        settings::{BridgeConfig, SETTINGS_FILE_NAME},
        utils::init_logging,
        RoomScanBridge,
    };

    pub const SESSION_STATE_EVENT: &str = "roomscan://session-state";
    pub const CAPTURE_STARTED_EVENT: &str = "roomscan://capture-started";
    pub const SUMMARY_READY_EVENT: &str = "roomscan://summary-ready";
    pub const DISMISSED_EVENT: &str = "roomscan://dismissed";

    /// Forwards presenter calls to the webview as events.
    struct TauriPresenter<R: Runtime> {
        app: AppHandle<R>,
    }

    impl<R: Runtime> TauriPresenter<R> {
        fn emit<S: serde::Serialize + Clone>(&self, event: &str, payload: S) {
            if let Err(err) = self.app.emit(event, payload) {
                log::warn!("failed to emit {event}: {err}");
            }
        }
    }

    #[derive(serde::Serialize, Clone)]
    #[serde(rename_all = "camelCase")]
    struct SummaryReady<'a> {
        session_id: &'a str,
        summary: &'a RoomSummary,
    }

    impl<R: Runtime> ScanPresenter for TauriPresenter<R> {
        fn present_capture(&self, session_id: &str) {
            self.emit(CAPTURE_STARTED_EVENT, session_id);
        }

        fn present_summary(&self, session_id: &str, summary: &RoomSummary) {
            self.emit(SUMMARY_READY_EVENT, SummaryReady { session_id, summary });
        }

        fn dismiss(&self) {
            self.emit(DISMISSED_EVENT, ());
        }

        fn preview(&self, path: &Path) -> Result<(), String> {
            self.app
                .opener()
                .open_path(path.to_string_lossy(), None::<&str>)
                .map_err(|err| err.to_string())
        }

        fn state_changed(&self, snapshot: &SessionSnapshot) {
            self.emit(SESSION_STATE_EVENT, snapshot.clone());
        }
    }

    /// Room scanning plugin. The app must also register `tauri_plugin_opener`
    /// for artifact previews.
    pub fn init<R: Runtime>() -> TauriPlugin<R> {
        Builder::new("roomscan")
            .setup(|app, _api| {
                init_logging();

                let result = (|| -> anyhow::Result<()> {
                    let app_data_dir = app
                        .path()
                        .app_data_dir()
                        .map_err(|err| anyhow::anyhow!(err))?;
                    std::fs::create_dir_all(&app_data_dir)?;

                    let config = BridgeConfig::load(&app_data_dir.join(SETTINGS_FILE_NAME))?;
                    let presenter = Arc::new(TauriPresenter { app: app.clone() });

                    // The session actor is spawned onto Tauri's runtime.
                    let bridge = tauri::async_runtime::block_on(async {
                        RoomScanBridge::new(config, &app_data_dir, default_backend(), presenter)
                    })?;
                    app.manage(bridge);

                    log::info!("roomscan plugin initialized");
                    Ok(())
                })();

                result.map_err(|err| err.into())
            })
            .invoke_handler(tauri::generate_handler![
                check_capability,
                start_scan,
                finish_scan,
                save_scan,
                cancel_scan,
                retry_commit,
                get_scan_state,
                list_artifacts,
                open_artifact,
                delete_artifact,
                import_artifact,
            ])
            .build()
    }
}

#[cfg(feature = "tauri")]
pub use host_plugin::{
    init, CAPTURE_STARTED_EVENT, DISMISSED_EVENT, SESSION_STATE_EVENT, SUMMARY_READY_EVENT,
};
