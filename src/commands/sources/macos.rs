use core_foundation::base::{CFType, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::display::CGDisplay;
use core_graphics::geometry::CGRect;
use core_graphics::window::{
    copy_window_info, kCGNullWindowID, kCGWindowListExcludeDesktopElements,
    kCGWindowListOptionOnScreenOnly,
};

use super::{keep_window, CaptureSource, SourceEnumerator, SourceKind};
use crate::commands::recording::RecorderError;

/// macOS-specific source enumerator backed by CoreGraphics
pub struct PlatformEnumerator;

type WindowInfo = CFDictionary<CFString, CFType>;

fn dict_i64(dict: &WindowInfo, key: &'static str) -> Option<i64> {
    dict.find(CFString::from_static_string(key))
        .and_then(|value| value.downcast::<CFNumber>())
        .and_then(|number| number.to_i64())
}

fn dict_string(dict: &WindowInfo, key: &'static str) -> Option<String> {
    dict.find(CFString::from_static_string(key))
        .and_then(|value| value.downcast::<CFString>())
        .map(|s| s.to_string())
}

fn dict_bool(dict: &WindowInfo, key: &'static str) -> Option<bool> {
    dict.find(CFString::from_static_string(key))
        .and_then(|value| value.downcast::<CFBoolean>())
        .map(Into::into)
}

fn dict_rect(dict: &WindowInfo, key: &'static str) -> Option<CGRect> {
    dict.find(CFString::from_static_string(key))
        .and_then(|value| value.downcast::<CFDictionary>())
        .and_then(|bounds| CGRect::from_dict_representation(&bounds))
}

impl SourceEnumerator for PlatformEnumerator {
    fn enumerate_screens() -> Result<Vec<CaptureSource>, RecorderError> {
        let display_ids = CGDisplay::active_displays().map_err(|code| {
            RecorderError::CaptureUnavailable {
                reason: format!("display query failed with CGError {}", code),
            }
        })?;

        let mut screens = Vec::with_capacity(display_ids.len());
        for (index, id) in display_ids.into_iter().enumerate() {
            let display = CGDisplay::new(id);
            let bounds = display.bounds();
            // The id is the position in the active-display list, which is the
            // order avfoundation assigns its screen devices in.
            screens.push(
                CaptureSource::new(
                    format!("screen:{}", index),
                    format!("Screen {}", index + 1),
                    SourceKind::Screen,
                    display.pixels_wide() as u32,
                    display.pixels_high() as u32,
                )
                .with_position(bounds.origin.x as i32, bounds.origin.y as i32)
                .with_primary(display.is_main()),
            );
        }
        Ok(screens)
    }

    fn enumerate_windows() -> Result<Vec<CaptureSource>, RecorderError> {
        let info = copy_window_info(
            kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements,
            kCGNullWindowID,
        )
        .ok_or_else(|| RecorderError::CaptureUnavailable {
            reason: "window list query returned nothing".to_string(),
        })?;

        let mut windows = Vec::new();
        for item in info.iter() {
            let dict = unsafe { WindowInfo::wrap_under_get_rule(*item as CFDictionaryRef) };

            let Some(number) = dict_i64(&dict, "kCGWindowNumber") else {
                continue;
            };
            let Some(rect) = dict_rect(&dict, "kCGWindowBounds") else {
                continue;
            };

            let layer = dict_i64(&dict, "kCGWindowLayer").unwrap_or(0) as i32;
            let on_screen = dict_bool(&dict, "kCGWindowIsOnscreen").unwrap_or(true);
            let width = rect.size.width as u32;
            let height = rect.size.height as u32;

            if !keep_window(layer, width, height, on_screen) {
                continue;
            }

            let owner = dict_string(&dict, "kCGWindowOwnerName");
            let title = dict_string(&dict, "kCGWindowName").filter(|t| !t.is_empty());
            let name = match (owner, title) {
                (Some(owner), Some(title)) => format!("{}: {}", owner, title),
                (Some(owner), None) => owner,
                (None, Some(title)) => title,
                (None, None) => continue,
            };

            windows.push(
                CaptureSource::new(
                    format!("window:{}", number),
                    name,
                    SourceKind::Window,
                    width,
                    height,
                )
                .with_position(rect.origin.x as i32, rect.origin.y as i32),
            );
        }
        Ok(windows)
    }
}
