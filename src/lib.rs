use std::sync::{Arc, Mutex};

use tauri::{Manager, WindowEvent};

pub mod commands;

use commands::recording::{RecorderState, RecordingController};

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Sweep temp files a previous run left behind before anything records.
    commands::recording::initialize_recording();

    let recorder: RecorderState = Arc::new(Mutex::new(RecordingController::new()));

    tauri::Builder::default()
        .manage(recorder)
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .invoke_handler(tauri::generate_handler![
            commands::permissions::check_screen_permission,
            commands::permissions::request_screen_permission,
            commands::permissions::open_privacy_settings,
            commands::sources::list_sources,
            commands::recording::get_recording_state,
            commands::recording::select_source,
            commands::recording::start_recording,
            commands::recording::stop_recording,
            commands::recording::sweep_temp_files,
        ])
        .on_window_event(|window, event| {
            if matches!(event, WindowEvent::CloseRequested { .. } | WindowEvent::Destroyed) {
                // A live capture process must not outlive the window.
                let state: tauri::State<'_, RecorderState> = window.state();
                if let Ok(mut controller) = state.lock() {
                    controller.shutdown();
                };
            }
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
