use std::path::{Path, PathBuf};
use std::process::Command;

/// Find ffprobe executable in common locations
pub fn find_ffprobe() -> Option<PathBuf> {
    find_executable("ffprobe")
}

/// Find ffmpeg executable in common locations
pub fn find_ffmpeg() -> Option<PathBuf> {
    find_executable("ffmpeg")
}

fn find_executable(name: &str) -> Option<PathBuf> {
    // First, try to find it in PATH
    if let Ok(output) = Command::new("which").arg(name).output() {
        if output.status.success() {
            let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path_str.is_empty() {
                return Some(PathBuf::from(path_str));
            }
        }
    }

    // Common installation locations
    let common_paths = vec![
        format!("/usr/local/bin/{}", name),
        format!("/opt/homebrew/bin/{}", name),
        format!("/usr/bin/{}", name),
        format!("/opt/local/bin/{}", name), // MacPorts
    ];

    for path_str in common_paths {
        let path = PathBuf::from(&path_str);
        if path.exists() {
            return Some(path);
        }
    }

    None
}

/// Check whether the ffmpeg build at `ffmpeg` ships a given encoder.
pub fn encoder_available(ffmpeg: &Path, encoder: &str) -> bool {
    match Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output()
    {
        Ok(output) => listing_has_encoder(&String::from_utf8_lossy(&output.stdout), encoder),
        Err(e) => {
            eprintln!("[FFmpeg] Failed to query encoders: {}", e);
            false
        }
    }
}

/// Parse the `ffmpeg -encoders` listing. Each entry line looks like
/// ` V....D libx264              libx264 H.264 / AVC ...` — flags column,
/// encoder name, description.
fn listing_has_encoder(listing: &str, encoder: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(encoder))
}

/// Probe the duration of a media file in seconds, if ffprobe is present.
/// Capture-native files cut short by a killed encoder often have no duration
/// header, so `None` is a normal answer.
pub fn probe_duration_secs(input: &Path) -> Option<f64> {
    let ffprobe = find_ffprobe()?;
    let output = Command::new(&ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}
