use super::{PermissionHandler, PermissionStatus};

/// Stub implementation for platforms without a screen-recording gate
pub struct PlatformPermissions;

impl PermissionHandler for PlatformPermissions {
    fn check_screen_recording() -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn request_screen_recording() -> PermissionStatus {
        PermissionStatus::Granted
    }
}
