// Platform-specific capture source enumeration
#[cfg(target_os = "macos")]
mod macos;

#[cfg(not(target_os = "macos"))]
mod stub;

// Re-export the platform-specific implementation
#[cfg(target_os = "macos")]
pub use macos::PlatformEnumerator;

#[cfg(not(target_os = "macos"))]
pub use stub::PlatformEnumerator;

use super::permissions;
use super::recording::RecorderError;
use serde::{Deserialize, Serialize};

/// Kind of capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Screen,
    Window,
}

/// Screen or window available for recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSource {
    /// Unique identifier for this source
    pub id: String,
    /// Display name shown in the picker
    pub name: String,
    /// Whether this is a whole screen or a single window
    pub kind: SourceKind,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// X position in the virtual desktop
    pub x: i32,
    /// Y position in the virtual desktop
    pub y: i32,
    /// Whether this is the primary display
    pub is_primary: bool,
}

impl CaptureSource {
    pub fn new(id: String, name: String, kind: SourceKind, width: u32, height: u32) -> Self {
        Self {
            id,
            name,
            kind,
            width,
            height,
            x: 0,
            y: 0,
            is_primary: false,
        }
    }

    pub fn with_position(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }
}

/// Trait for platform-specific source enumeration
pub trait SourceEnumerator {
    /// Enumerate all available screens
    fn enumerate_screens() -> Result<Vec<CaptureSource>, RecorderError>;

    /// Enumerate all available windows
    fn enumerate_windows() -> Result<Vec<CaptureSource>, RecorderError>;

    /// Enumerate screens first, then windows
    fn enumerate_all() -> Result<Vec<CaptureSource>, RecorderError> {
        let mut sources = Self::enumerate_screens()?;
        sources.extend(Self::enumerate_windows()?);
        Ok(sources)
    }
}

/// Window filter shared by platform implementations: normal layer, actually
/// on screen, and big enough to be a real window rather than a UI element.
pub fn keep_window(layer: i32, width: u32, height: u32, on_screen: bool) -> bool {
    layer == 0 && on_screen && width >= 50 && height >= 50
}

/// A successful query with zero entries is its own failure mode; the picker
/// must never open on an empty list.
fn require_sources(sources: Vec<CaptureSource>) -> Result<Vec<CaptureSource>, RecorderError> {
    if sources.is_empty() {
        Err(RecorderError::NoSourcesAvailable)
    } else {
        Ok(sources)
    }
}

// ============================================================================
// Tauri Commands
// ============================================================================

/// List every capturable screen and window. Authorization is checked up
/// front so the caller can steer the user to the privacy settings instead of
/// showing a silently empty picker.
#[tauri::command]
pub async fn list_sources() -> Result<Vec<CaptureSource>, String> {
    if !permissions::screen_recording_granted() {
        return Err(RecorderError::PermissionDenied.to_string());
    }

    let sources = PlatformEnumerator::enumerate_all().map_err(|e| e.to_string())?;
    require_sources(sources).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(name: &str) -> CaptureSource {
        CaptureSource::new(
            format!("screen:{}", name),
            name.to_string(),
            SourceKind::Screen,
            1920,
            1080,
        )
    }

    #[test]
    fn zero_sources_is_an_error() {
        assert!(matches!(
            require_sources(Vec::new()),
            Err(RecorderError::NoSourcesAvailable)
        ));
    }

    #[test]
    fn non_empty_list_passes_through_in_order() {
        let sources = vec![screen("one"), screen("two")];
        let kept = require_sources(sources).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].name, "one");
        assert_eq!(kept[1].name, "two");
    }

    #[test]
    fn window_filter_drops_system_ui_and_slivers() {
        assert!(keep_window(0, 800, 600, true));
        assert!(!keep_window(25, 800, 600, true)); // menu bar / dock layer
        assert!(!keep_window(0, 40, 600, true)); // too narrow
        assert!(!keep_window(0, 800, 10, true)); // too short
        assert!(!keep_window(0, 800, 600, false)); // off screen
    }

    #[test]
    fn source_kind_serializes_lowercase() {
        let json = serde_json::to_string(&screen("main")).unwrap();
        assert!(json.contains("\"kind\":\"screen\""));
        assert!(json.contains("\"isPrimary\":false"));
    }
}
