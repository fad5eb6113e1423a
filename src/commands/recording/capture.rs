// Capture sessions drive an ffmpeg child reading the OS capture device and
// streaming the capture-native container to stdout, chunk by chunk.

use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::super::ffmpeg_utils;
use super::{CaptureEvent, CodecProfile, RecorderError, SessionHandle};
use crate::commands::sources::CaptureSource;
#[cfg(target_os = "macos")]
use crate::commands::sources::SourceKind;

#[cfg(target_os = "macos")]
use core_graphics::display::CGDisplay;

/// Stdout read size; one read becomes one chunk event.
const CHUNK_SIZE: usize = 64 * 1024;

/// Input argument list plus an optional pixel-space crop for the filter chain.
type CaptureInput = (Vec<String>, Option<(u32, u32, u32, u32)>);

pub const CAPTURE_FRAMERATE: u32 = 30;

/// Resolution policy for a capture request. Sources above the maximum are
/// scaled down, sources below the minimum are scaled up; neither is a hard
/// rejection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionBounds {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ResolutionBounds {
    fn default() -> Self {
        Self {
            min_width: 1280,
            min_height: 720,
            max_width: 4000,
            max_height: 4000,
        }
    }
}

fn even(v: u32) -> u32 {
    std::cmp::max(2, v / 2 * 2)
}

impl ResolutionBounds {
    /// Scale filter clause enforcing the bounds, or `None` when the source
    /// already fits. The maximum always wins over the minimum, and output
    /// dimensions stay even for the encoder.
    pub fn scale_filter(&self, width: u32, height: u32) -> Option<String> {
        if width == 0 || height == 0 {
            return None;
        }
        let (w, h) = (width as f64, height as f64);
        let cap = f64::min(self.max_width as f64 / w, self.max_height as f64 / h);
        let need = f64::max(self.min_width as f64 / w, self.min_height as f64 / h);

        let ratio = need.max(1.0).min(cap);
        if (ratio - 1.0).abs() < 1e-9 {
            return None;
        }

        Some(format!(
            "scale={}:{}",
            even((w * ratio).round() as u32),
            even((h * ratio).round() as u32)
        ))
    }
}

/// One attached display: desktop bounds in points plus the pixel size of its
/// backing frame. On a Retina display the two differ by the backing scale
/// factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayFrame {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl DisplayFrame {
    fn overlap_area(&self, x: i32, y: i32, width: u32, height: u32) -> i64 {
        let left = i64::from(x.max(self.x));
        let top = i64::from(y.max(self.y));
        let right = i64::from(x) + i64::from(width);
        let bottom = i64::from(y) + i64::from(height);
        let right = right.min(i64::from(self.x) + i64::from(self.width));
        let bottom = bottom.min(i64::from(self.y) + i64::from(self.height));
        (right - left).max(0) * (bottom - top).max(0)
    }
}

/// Index of the display showing the largest part of the window, if any part
/// of it is on a display at all.
pub fn containing_display(
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    frames: &[DisplayFrame],
) -> Option<usize> {
    frames
        .iter()
        .enumerate()
        .map(|(index, frame)| (index, frame.overlap_area(x, y, width, height)))
        .filter(|(_, area)| *area > 0)
        .max_by_key(|(_, area)| *area)
        .map(|(index, _)| index)
}

/// Crop rectangle for a window inside its display's pixel frame. The window
/// bounds arrive in global desktop points; the captured frame is one
/// display's pixel buffer, so the origin becomes display-relative and points
/// are scaled to pixels, clamped to the frame with even dimensions. Returned
/// as `(width, height, x, y)` to match ffmpeg's `crop=` order.
pub fn window_crop_rect(
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    frame: &DisplayFrame,
) -> Option<(u32, u32, u32, u32)> {
    if frame.width == 0 || frame.height == 0 {
        return None;
    }
    let scale = frame.pixel_width as f64 / frame.width as f64;
    let left = (f64::from(x - frame.x) * scale).max(0.0);
    let top = (f64::from(y - frame.y) * scale).max(0.0);
    let right =
        (f64::from(x - frame.x + width as i32) * scale).min(frame.pixel_width as f64);
    let bottom =
        (f64::from(y - frame.y + height as i32) * scale).min(frame.pixel_height as f64);

    let crop_x = left.round() as u32;
    let crop_y = top.round() as u32;
    let crop_w = (right.round() as u32).saturating_sub(crop_x) / 2 * 2;
    let crop_h = (bottom.round() as u32).saturating_sub(crop_y) / 2 * 2;
    if crop_w < 2 || crop_h < 2 {
        return None;
    }
    Some((crop_w, crop_h, crop_x, crop_y))
}

// ============================================================================
// ffmpeg argument assembly (pure, so it is testable on any platform)
// ============================================================================

/// avfoundation input for a screen device. Screens are indexed after the
/// cameras in ffmpeg's device list; the trailing `:` leaves audio unbound.
pub fn avfoundation_args(device_index: usize, framerate: u32) -> Vec<String> {
    vec![
        "-f".to_string(),
        "avfoundation".to_string(),
        "-framerate".to_string(),
        framerate.to_string(),
        "-capture_cursor".to_string(),
        "1".to_string(),
        "-i".to_string(),
        format!("{}:", device_index),
    ]
}

/// x11grab input for a desktop region.
pub fn x11grab_args(
    display: &str,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    framerate: u32,
) -> Vec<String> {
    vec![
        "-f".to_string(),
        "x11grab".to_string(),
        "-framerate".to_string(),
        framerate.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", even(width), even(height)),
        "-i".to_string(),
        format!("{}+{},{}", display, x, y),
    ]
}

/// Video filter chain for one source: crop to the window rect when the input
/// grabs a whole display, then clamp to the resolution bounds. The scale is
/// computed from the cropped frame, not the source.
pub fn capture_filters(
    source: &CaptureSource,
    bounds: &ResolutionBounds,
    crop: Option<(u32, u32, u32, u32)>,
) -> Option<String> {
    let mut parts = Vec::new();
    let (frame_w, frame_h) = match crop {
        Some((w, h, x, y)) => {
            parts.push(format!("crop={}:{}:{}:{}", w, h, x, y));
            (w, h)
        }
        None => (source.width, source.height),
    };
    if let Some(scale) = bounds.scale_filter(frame_w, frame_h) {
        parts.push(scale);
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}

/// Encoding tail of the capture command: video only, capture-native encoder,
/// container streamed to stdout.
pub fn encode_args(profile: &CodecProfile, filter: Option<&str>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(filter) = filter {
        args.push("-vf".to_string());
        args.push(filter.to_string());
    }
    args.push("-an".to_string());
    args.push("-c:v".to_string());
    args.push(profile.capture_encoder.to_string());
    args.push("-pix_fmt".to_string());
    args.push("yuv420p".to_string());
    if profile.capture_encoder == "libvpx" {
        // Realtime deadline so encoding keeps up with the screen.
        args.push("-deadline".to_string());
        args.push("realtime".to_string());
        args.push("-cpu-used".to_string());
        args.push("8".to_string());
    }
    args.push("-f".to_string());
    args.push(profile.capture_format.to_string());
    args.push("pipe:1".to_string());
    args
}

/// Count the camera entries that precede the screen devices in an
/// avfoundation `-list_devices` dump.
pub fn count_cameras_in_device_listing(listing: &str) -> usize {
    let mut camera_count = 0;
    let mut in_video_section = false;
    for line in listing.lines() {
        if line.contains("AVFoundation video devices:") {
            in_video_section = true;
        } else if line.contains("AVFoundation audio devices:") {
            break;
        } else if in_video_section && line.contains("[AVFoundation") && line.contains("] [") {
            let lower = line.to_lowercase();
            if lower.contains("capture screen") {
                break;
            }
            camera_count += 1;
        }
    }
    camera_count
}

#[cfg(target_os = "macos")]
fn detect_camera_count(ffmpeg: &Path) -> usize {
    match Command::new(ffmpeg)
        .args(["-f", "avfoundation", "-list_devices", "true", "-i", ""])
        .stderr(Stdio::piped())
        .output()
    {
        Ok(output) => {
            count_cameras_in_device_listing(&String::from_utf8_lossy(&output.stderr))
        }
        Err(e) => {
            eprintln!("[Capture] Device listing failed, assuming no cameras: {}", e);
            0
        }
    }
}

/// Attached displays in active-display order, which is the order avfoundation
/// assigns its screen devices in.
#[cfg(target_os = "macos")]
fn display_frames() -> Result<Vec<DisplayFrame>, RecorderError> {
    let ids = CGDisplay::active_displays().map_err(|code| RecorderError::CaptureUnavailable {
        reason: format!("display query failed with CGError {}", code),
    })?;
    Ok(ids
        .into_iter()
        .map(|id| {
            let display = CGDisplay::new(id);
            let bounds = display.bounds();
            DisplayFrame {
                x: bounds.origin.x as i32,
                y: bounds.origin.y as i32,
                width: bounds.size.width as u32,
                height: bounds.size.height as u32,
                pixel_width: display.pixels_wide() as u32,
                pixel_height: display.pixels_high() as u32,
            }
        })
        .collect())
}

// ============================================================================
// CaptureSession
// ============================================================================

/// One opened source, optionally with a live ffmpeg child streaming chunks.
#[derive(Debug)]
pub struct CaptureSession {
    source: CaptureSource,
    bounds: ResolutionBounds,
    child: Option<Child>,
    reader: Option<thread::JoinHandle<()>>,
    stderr_buf: Arc<Mutex<String>>,
}

impl CaptureSession {
    /// Bind a source. Validation happens here so a vanished or degenerate
    /// source fails at selection time rather than mid-recording.
    pub fn open(source: CaptureSource, bounds: ResolutionBounds) -> Result<Self, RecorderError> {
        if source.width == 0 || source.height == 0 {
            return Err(RecorderError::CaptureUnavailable {
                reason: format!("source '{}' reports no usable dimensions", source.name),
            });
        }
        Ok(Self {
            source,
            bounds,
            child: None,
            reader: None,
            stderr_buf: Arc::new(Mutex::new(String::new())),
        })
    }

    #[cfg(target_os = "macos")]
    fn input_args(&self, ffmpeg: &Path) -> Result<CaptureInput, RecorderError> {
        let cameras = detect_camera_count(ffmpeg);
        match self.source.kind {
            SourceKind::Screen => {
                let screen_index = self
                    .source
                    .id
                    .strip_prefix("screen:")
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(0);
                Ok((
                    avfoundation_args(cameras + screen_index, CAPTURE_FRAMERATE),
                    None,
                ))
            }
            // Windows are grabbed off the display showing them and cropped
            // in that display's pixel frame.
            SourceKind::Window => {
                let frames = display_frames()?;
                let index = containing_display(
                    self.source.x,
                    self.source.y,
                    self.source.width,
                    self.source.height,
                    &frames,
                )
                .ok_or_else(|| RecorderError::CaptureUnavailable {
                    reason: format!(
                        "window '{}' is not on any attached display",
                        self.source.name
                    ),
                })?;
                let crop = window_crop_rect(
                    self.source.x,
                    self.source.y,
                    self.source.width,
                    self.source.height,
                    &frames[index],
                )
                .ok_or_else(|| RecorderError::CaptureUnavailable {
                    reason: format!(
                        "window '{}' has no visible area to capture",
                        self.source.name
                    ),
                })?;
                Ok((
                    avfoundation_args(cameras + index, CAPTURE_FRAMERATE),
                    Some(crop),
                ))
            }
        }
    }

    #[cfg(target_os = "linux")]
    fn input_args(&self, _ffmpeg: &Path) -> Result<CaptureInput, RecorderError> {
        // x11grab takes the region directly, so no crop filter is needed.
        let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0.0".to_string());
        Ok((
            x11grab_args(
                &display,
                self.source.x,
                self.source.y,
                self.source.width,
                self.source.height,
                CAPTURE_FRAMERATE,
            ),
            None,
        ))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    fn input_args(&self, _ffmpeg: &Path) -> Result<CaptureInput, RecorderError> {
        Err(RecorderError::CaptureUnavailable {
            reason: "screen capture is not implemented for this platform".to_string(),
        })
    }

    fn stderr_tail(&self) -> String {
        let buf = self
            .stderr_buf
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default();
        let trimmed = buf.trim();
        match trimmed.char_indices().rev().nth(499) {
            Some((idx, _)) => trimmed[idx..].to_string(),
            None => trimmed.to_string(),
        }
    }
}

impl SessionHandle for CaptureSession {
    fn begin_capture(
        &mut self,
        profile: &CodecProfile,
    ) -> Result<Receiver<CaptureEvent>, RecorderError> {
        if self.child.is_some() {
            return Err(RecorderError::CaptureUnavailable {
                reason: "a capture is already running for this session".to_string(),
            });
        }

        let ffmpeg = ffmpeg_utils::find_ffmpeg().ok_or(RecorderError::DependencyMissing {
            name: "ffmpeg".to_string(),
        })?;
        if !ffmpeg_utils::encoder_available(&ffmpeg, profile.capture_encoder) {
            return Err(RecorderError::UnsupportedFormat {
                codec: profile.capture_encoder.to_string(),
            });
        }

        let mut command = Command::new(&ffmpeg);
        command.args(["-hide_banner", "-loglevel", "error", "-nostats"]);
        let (input, crop) = self.input_args(&ffmpeg)?;
        command.args(input);

        let filter = capture_filters(&self.source, &self.bounds, crop);
        command.args(encode_args(profile, filter.as_deref()));

        println!("[Capture] Spawning: {:?}", command);
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecorderError::CaptureUnavailable {
                reason: format!("failed to start ffmpeg: {}", e),
            })?;
        println!("[Capture] ffmpeg started with PID {}", child.id());

        let stdout = child.stdout.take().ok_or_else(|| RecorderError::Io {
            message: "could not attach to the capture output".to_string(),
        })?;

        // Drain stderr so ffmpeg never blocks on a full pipe; keep the text
        // for error reporting.
        if let Some(stderr) = child.stderr.take() {
            let buf = self.stderr_buf.clone();
            thread::spawn(move || {
                let mut output = String::new();
                let _ = BufReader::new(stderr).read_to_string(&mut output);
                if let Ok(mut buf) = buf.lock() {
                    buf.push_str(&output);
                }
            });
        }

        let (tx, rx) = mpsc::channel();
        self.reader = Some(thread::spawn(move || read_chunks(stdout, tx)));
        self.child = Some(child);
        Ok(rx)
    }

    fn request_stop(&mut self) -> Result<(), RecorderError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        println!("[Capture] Stopping ffmpeg (PID {})", child.id());

        // Ask ffmpeg to finish the container; fall back to SIGINT, then kill.
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(b"q");
            let _ = stdin.flush();
        }

        let mut status = None;
        for _ in 0..50 {
            if let Ok(Some(s)) = child.try_wait() {
                status = Some(s);
                break;
            }
            thread::sleep(Duration::from_millis(100));
        }

        let mut interrupted = false;
        if status.is_none() {
            #[cfg(unix)]
            {
                println!("[Capture] ffmpeg did not react to 'q', sending SIGINT");
                interrupted = true;
                unsafe {
                    libc::kill(child.id() as i32, libc::SIGINT);
                }
                for _ in 0..50 {
                    if let Ok(Some(s)) = child.try_wait() {
                        status = Some(s);
                        break;
                    }
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }

        let status = match status {
            Some(status) => status,
            None => {
                println!("[Capture] ffmpeg unresponsive, killing");
                let _ = child.kill();
                child.wait().map_err(|e| RecorderError::Io {
                    message: format!("failed to reap capture process: {}", e),
                })?
            }
        };

        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }

        // A capture that died on its own (device rejected, permission pulled
        // mid-session) surfaces here as a failed exit before any stop signal.
        if !status.success() && !interrupted {
            let stderr = self.stderr_tail();
            let reason = if stderr.is_empty() {
                format!("capture process exited with {}", status)
            } else {
                stderr
            };
            return Err(RecorderError::CaptureUnavailable { reason });
        }

        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            println!("[Capture] Closing live session, killing ffmpeg");
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }

    fn source(&self) -> &CaptureSource {
        &self.source
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Turn the capture stream into ordered events: one `Data` per read, then a
/// final `Stopped` on EOF or `Error` on read failure.
fn read_chunks<R: Read>(mut stream: R, events: Sender<CaptureEvent>) {
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                let _ = events.send(CaptureEvent::Stopped);
                break;
            }
            Ok(n) => {
                if events.send(CaptureEvent::Data(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = events.send(CaptureEvent::Error(format!(
                    "capture stream read failed: {}",
                    e
                )));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::sources::{CaptureSource, SourceKind};
    use std::io::Cursor;

    fn screen_source(width: u32, height: u32) -> CaptureSource {
        CaptureSource::new(
            "screen:0".to_string(),
            "Screen 1".to_string(),
            SourceKind::Screen,
            width,
            height,
        )
    }

    fn window_source() -> CaptureSource {
        CaptureSource::new(
            "window:42".to_string(),
            "Editor".to_string(),
            SourceKind::Window,
            800,
            600,
        )
        .with_position(100, 50)
    }

    #[test]
    fn in_bounds_sources_need_no_scaling() {
        let bounds = ResolutionBounds::default();
        assert_eq!(bounds.scale_filter(1920, 1080), None);
        assert_eq!(bounds.scale_filter(1280, 720), None);
        assert_eq!(bounds.scale_filter(4000, 4000), None);
    }

    #[test]
    fn oversized_sources_scale_down_to_the_maximum() {
        let bounds = ResolutionBounds::default();
        assert_eq!(
            bounds.scale_filter(5120, 2880).as_deref(),
            Some("scale=4000:2250")
        );
    }

    #[test]
    fn undersized_sources_scale_up_to_the_minimum() {
        let bounds = ResolutionBounds::default();
        // 640x480 doubles to satisfy the 1280 width floor.
        assert_eq!(
            bounds.scale_filter(640, 480).as_deref(),
            Some("scale=1280:960")
        );
    }

    #[test]
    fn the_maximum_wins_over_the_minimum() {
        let bounds = ResolutionBounds::default();
        // A 100x4000 sliver cannot be upscaled without blowing the height cap.
        assert_eq!(bounds.scale_filter(100, 4000), None);
    }

    #[test]
    fn scaled_dimensions_stay_even() {
        let bounds = ResolutionBounds::default();
        let filter = bounds.scale_filter(4001, 3001).unwrap();
        let dims: Vec<u32> = filter
            .trim_start_matches("scale=")
            .split(':')
            .map(|d| d.parse().unwrap())
            .collect();
        assert!(dims[0] % 2 == 0 && dims[1] % 2 == 0);
        assert!(dims[0] <= 4000 && dims[1] <= 4000);
    }

    #[test]
    fn window_capture_crops_then_scales_the_cropped_frame() {
        let bounds = ResolutionBounds::default();
        let filter = capture_filters(&window_source(), &bounds, Some((800, 600, 100, 50))).unwrap();
        assert!(filter.starts_with("crop=800:600:100:50"));
        // 800x600 after the crop needs upscaling to the 1280 floor.
        assert!(filter.ends_with(",scale=1280:960"));
    }

    #[test]
    fn screen_capture_in_bounds_needs_no_filter() {
        let bounds = ResolutionBounds::default();
        assert_eq!(capture_filters(&screen_source(1920, 1080), &bounds, None), None);
    }

    fn retina_frame() -> DisplayFrame {
        DisplayFrame {
            x: 0,
            y: 0,
            width: 1728,
            height: 1117,
            pixel_width: 3456,
            pixel_height: 2234,
        }
    }

    fn secondary_frame() -> DisplayFrame {
        DisplayFrame {
            x: 1728,
            y: 0,
            width: 1920,
            height: 1080,
            pixel_width: 1920,
            pixel_height: 1080,
        }
    }

    #[test]
    fn windows_map_to_their_containing_display() {
        let frames = [retina_frame(), secondary_frame()];
        assert_eq!(containing_display(100, 50, 800, 600, &frames), Some(0));
        assert_eq!(containing_display(2000, 100, 800, 600, &frames), Some(1));
        // Straddling windows go to the display showing the bigger part.
        assert_eq!(containing_display(1600, 100, 800, 600, &frames), Some(1));
        assert_eq!(containing_display(9000, 9000, 800, 600, &frames), None);
    }

    #[test]
    fn retina_window_crop_scales_points_to_pixels() {
        let crop = window_crop_rect(100, 50, 800, 600, &retina_frame()).unwrap();
        assert_eq!(crop, (1600, 1200, 200, 100));
    }

    #[test]
    fn secondary_display_crop_is_display_relative() {
        let crop = window_crop_rect(1828, 50, 800, 600, &secondary_frame()).unwrap();
        assert_eq!(crop, (800, 600, 100, 50));
    }

    #[test]
    fn partially_visible_windows_clamp_to_the_frame() {
        let crop = window_crop_rect(-100, -50, 800, 600, &secondary_frame());
        assert_eq!(crop, None); // entirely left of the secondary display

        // Hangs off the top-left corner; only the on-display part is cropped.
        let crop = window_crop_rect(1628, -50, 800, 600, &secondary_frame()).unwrap();
        assert_eq!(crop, (700, 550, 0, 0));
    }

    #[test]
    fn offscreen_window_yields_no_crop() {
        assert_eq!(window_crop_rect(9000, 9000, 800, 600, &retina_frame()), None);
    }

    #[test]
    fn avfoundation_input_binds_screen_only() {
        let args = avfoundation_args(3, 30);
        assert_eq!(args.last().unwrap(), "3:");
        assert!(args.contains(&"avfoundation".to_string()));
        assert!(args.contains(&"30".to_string()));
    }

    #[test]
    fn x11grab_input_carries_region_and_display() {
        let args = x11grab_args(":0.0", 100, 50, 801, 600, 30);
        assert!(args.contains(&"x11grab".to_string()));
        assert!(args.contains(&"800x600".to_string())); // even-aligned
        assert_eq!(args.last().unwrap(), ":0.0+100,50");
    }

    #[test]
    fn encode_args_stream_video_only_webm_to_stdout() {
        let profile = CodecProfile::default();
        let args = encode_args(&profile, Some("crop=1:2:3:4"));
        assert_eq!(args[0], "-vf");
        assert!(args.contains(&"-an".to_string()));
        assert!(args.contains(&"libvpx".to_string()));
        assert!(args.contains(&"realtime".to_string()));
        assert!(args.contains(&"webm".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn camera_count_stops_at_the_first_screen_device() {
        let listing = "\
[AVFoundation indev @ 0x7f8] AVFoundation video devices:
[AVFoundation indev @ 0x7f8] [0] FaceTime HD Camera
[AVFoundation indev @ 0x7f8] [1] Desk View Camera
[AVFoundation indev @ 0x7f8] [2] Capture screen 0
[AVFoundation indev @ 0x7f8] AVFoundation audio devices:
[AVFoundation indev @ 0x7f8] [0] MacBook Pro Microphone
";
        assert_eq!(count_cameras_in_device_listing(listing), 2);
        assert_eq!(count_cameras_in_device_listing(""), 0);
    }

    #[test]
    fn chunk_reader_preserves_order_and_signals_eof() {
        let payload: Vec<u8> = (0..(CHUNK_SIZE + 100)).map(|i| (i % 251) as u8).collect();
        let (tx, rx) = mpsc::channel();
        read_chunks(Cursor::new(payload.clone()), tx);

        let mut collected = Vec::new();
        let mut stopped = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                CaptureEvent::Data(chunk) => {
                    assert!(!stopped, "data after stop");
                    collected.extend_from_slice(&chunk);
                }
                CaptureEvent::Stopped => stopped = true,
                CaptureEvent::Error(e) => panic!("unexpected error: {}", e),
            }
        }
        assert!(stopped);
        assert_eq!(collected, payload);
    }

    #[test]
    fn open_rejects_degenerate_sources() {
        let err =
            CaptureSession::open(screen_source(0, 1080), ResolutionBounds::default()).unwrap_err();
        assert!(matches!(err, RecorderError::CaptureUnavailable { .. }));
    }

    #[test]
    fn stopping_an_idle_session_is_harmless() {
        let mut session =
            CaptureSession::open(screen_source(1920, 1080), ResolutionBounds::default()).unwrap();
        session.request_stop().unwrap();
        session.close();
        session.close();
    }
}
