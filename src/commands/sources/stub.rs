use super::{CaptureSource, SourceEnumerator};
use crate::commands::recording::RecorderError;

/// Stub implementation for platforms without an enumeration backend yet
pub struct PlatformEnumerator;

impl SourceEnumerator for PlatformEnumerator {
    fn enumerate_screens() -> Result<Vec<CaptureSource>, RecorderError> {
        Err(RecorderError::CaptureUnavailable {
            reason: "screen enumeration is not implemented for this platform".to_string(),
        })
    }

    fn enumerate_windows() -> Result<Vec<CaptureSource>, RecorderError> {
        Err(RecorderError::CaptureUnavailable {
            reason: "window enumeration is not implemented for this platform".to_string(),
        })
    }
}
