use super::{PermissionHandler, PermissionStatus};

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGPreflightScreenCaptureAccess() -> bool;
    fn CGRequestScreenCaptureAccess() -> bool;
}

/// macOS-specific permission implementation
pub struct PlatformPermissions;

impl PermissionHandler for PlatformPermissions {
    fn check_screen_recording() -> PermissionStatus {
        // Preflight never prompts; it only reports the current grant.
        let granted = unsafe { CGPreflightScreenCaptureAccess() };
        if granted {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    fn request_screen_recording() -> PermissionStatus {
        // Shows the system prompt the first time; afterwards the user has to
        // flip the toggle in the privacy settings themselves.
        let granted = unsafe { CGRequestScreenCaptureAccess() };
        if granted {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }
}
