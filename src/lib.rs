pub mod analysis;
pub mod cli;
pub mod commands;
pub mod error;
pub mod models;

#[cfg(feature = "desktop")]
use commands::ipc::{analyze, submit_feedback, AppState};

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run(data_dir: std::path::PathBuf) {
    let result = tauri::Builder::default()
        .manage(AppState { data_dir })
        .invoke_handler(tauri::generate_handler![analyze, submit_feedback])
        .run(tauri::generate_context!());
    if let Err(e) = result {
        log::error!("dashboard exited with an error: {e}");
    }
}
