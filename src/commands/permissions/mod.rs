// Platform-specific permission implementations
#[cfg(target_os = "macos")]
mod macos;

#[cfg(not(target_os = "macos"))]
mod stub;

// Re-export the platform-specific implementation
#[cfg(target_os = "macos")]
pub use macos::PlatformPermissions;

#[cfg(not(target_os = "macos"))]
pub use stub::PlatformPermissions;

use serde::{Deserialize, Serialize};

/// Deep link into the macOS Screen Recording privacy pane.
pub const SCREEN_RECORDING_SETTINGS_URL: &str =
    "x-apple.systempreferences:com.apple.preference.security?Privacy_ScreenCapture";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    NotDetermined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResult {
    pub status: PermissionStatus,
    pub can_record: bool,
    pub message: String,
}

impl PermissionResult {
    pub fn new(status: PermissionStatus) -> Self {
        let message = match status {
            PermissionStatus::Granted => "Screen recording is authorized.",
            PermissionStatus::Denied => {
                "Screen recording permission is denied. Enable it in the system privacy settings."
            }
            PermissionStatus::NotDetermined => {
                "Screen recording permission has not been requested yet."
            }
        };

        Self {
            status,
            can_record: status == PermissionStatus::Granted,
            message: message.to_string(),
        }
    }
}

/// Trait for platform-specific permission handling
pub trait PermissionHandler {
    /// Check screen-recording authorization without prompting the user
    fn check_screen_recording() -> PermissionStatus;

    /// Request screen-recording authorization, prompting if undetermined
    fn request_screen_recording() -> PermissionStatus;
}

pub fn screen_recording_granted() -> bool {
    PlatformPermissions::check_screen_recording() == PermissionStatus::Granted
}

// ============================================================================
// Tauri Commands
// ============================================================================

#[tauri::command]
pub async fn check_screen_permission() -> PermissionResult {
    PermissionResult::new(PlatformPermissions::check_screen_recording())
}

#[tauri::command]
pub async fn request_screen_permission() -> PermissionResult {
    PermissionResult::new(PlatformPermissions::request_screen_recording())
}

/// Open the OS privacy settings at the screen-recording pane so the user can
/// grant access and retry.
#[tauri::command]
pub async fn open_privacy_settings() -> Result<(), String> {
    tauri_plugin_opener::open_url(SCREEN_RECORDING_SETTINGS_URL, None::<&str>)
        .map_err(|e| format!("Failed to open privacy settings: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_granted_can_record() {
        assert!(PermissionResult::new(PermissionStatus::Granted).can_record);
        assert!(!PermissionResult::new(PermissionStatus::Denied).can_record);
        assert!(!PermissionResult::new(PermissionStatus::NotDetermined).can_record);
    }
}
