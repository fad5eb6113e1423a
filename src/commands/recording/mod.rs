pub mod capture;

pub use capture::{CaptureSession, ResolutionBounds};

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Emitter, State};
use tauri_plugin_dialog::DialogExt;

use super::convert::{self, ConversionJob};
use super::sources::CaptureSource;

/// How long to wait for the capture stream to flush its last chunks after a
/// stop request. The encoder is already reaped by then, so this only guards
/// against a wedged reader thread.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Temp files older than this are considered leftovers from a crashed run.
const ORPHAN_MAX_AGE: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// Errors
// ============================================================================

/// Everything that can go wrong between picking a source and a saved file.
/// A cancelled save dialog is deliberately not here; see [`StopOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "snake_case")]
pub enum RecorderError {
    PermissionDenied,
    NoSourcesAvailable,
    CaptureUnavailable { reason: String },
    MissingSource,
    UnsupportedFormat { codec: String },
    EmptyRecording,
    Io { message: String },
    ConversionFailed { cause: String },
    DependencyMissing { name: String },
}

impl RecorderError {
    /// Short message suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied => {
                "ClipCast needs screen recording permission to list sources.".to_string()
            }
            Self::NoSourcesAvailable => {
                "No screens or windows are available to record.".to_string()
            }
            Self::CaptureUnavailable { .. } => {
                "The selected source can no longer be captured.".to_string()
            }
            Self::MissingSource => "No capture source is selected.".to_string(),
            Self::UnsupportedFormat { codec } => {
                format!("The required encoder '{}' is not available.", codec)
            }
            Self::EmptyRecording => "The recording contained no data.".to_string(),
            Self::Io { .. } => "A disk operation failed.".to_string(),
            Self::ConversionFailed { .. } => {
                "Converting the recording to MP4 failed.".to_string()
            }
            Self::DependencyMissing { name } => {
                format!("{} was not found on this system.", name)
            }
        }
    }

    /// What the user can do about it, when there is anything to do.
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::PermissionDenied => Some(
                "Open System Settings → Privacy & Security → Screen Recording, \
                 enable ClipCast, then try again."
                    .to_string(),
            ),
            Self::NoSourcesAvailable => {
                Some("Check that a display is connected and try again.".to_string())
            }
            Self::CaptureUnavailable { .. } => Some("Pick a source again.".to_string()),
            Self::MissingSource => Some("Choose a screen or window first.".to_string()),
            Self::UnsupportedFormat { .. } => Some(
                "Install an FFmpeg build with libvpx and libx264 support.".to_string(),
            ),
            Self::EmptyRecording => {
                Some("Record for at least a moment before stopping.".to_string())
            }
            Self::Io { .. } => None,
            Self::ConversionFailed { .. } => {
                Some("The captured data was discarded; record again.".to_string())
            }
            Self::DependencyMissing { .. } => Some(
                "Install FFmpeg (for example `brew install ffmpeg`) and restart.".to_string(),
            ),
        }
    }
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "screen recording permission denied"),
            Self::NoSourcesAvailable => write!(f, "no capture sources available"),
            Self::CaptureUnavailable { reason } => write!(f, "capture unavailable: {}", reason),
            Self::MissingSource => write!(f, "no capture source selected"),
            Self::UnsupportedFormat { codec } => write!(f, "unsupported format: {}", codec),
            Self::EmptyRecording => write!(f, "recording produced no data"),
            Self::Io { message } => write!(f, "io error: {}", message),
            Self::ConversionFailed { cause } => write!(f, "conversion failed: {}", cause),
            Self::DependencyMissing { name } => write!(f, "missing dependency: {}", name),
        }
    }
}

impl std::error::Error for RecorderError {}

impl From<io::Error> for RecorderError {
    fn from(e: io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

// ============================================================================
// State machine types
// ============================================================================

/// One recording cycle. `Saved`/`Failed` are momentary: both collapse back to
/// `SourceSelected` (or `NoSource` when the session had to be torn down), so
/// the machine only ever rests in one of these five states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    NoSource,
    SourceSelected,
    Recording,
    Stopped,
    Converting,
}

/// Event delivered by the capture stream, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Data(Vec<u8>),
    Stopped,
    Error(String),
}

/// Fixed codec profile for one capture/convert cycle. There is exactly one;
/// support is verified before recording starts rather than silently falling
/// back to something else.
#[derive(Debug, Clone)]
pub struct CodecProfile {
    /// Encoder for the capture-native intermediate
    pub capture_encoder: &'static str,
    /// Container for the intermediate stream
    pub capture_format: &'static str,
    /// Encoder for the distributed file
    pub target_encoder: &'static str,
    pub preset: &'static str,
    pub crf: u32,
    pub faststart: bool,
}

impl Default for CodecProfile {
    fn default() -> Self {
        Self {
            capture_encoder: "libvpx",
            capture_format: "webm",
            target_encoder: "libx264",
            preset: "medium",
            crf: 23,
            faststart: true,
        }
    }
}

/// Seam between the controller and the live capture process, so transition
/// logic is testable with a fake session and synthetic events.
pub trait SessionHandle: Send {
    /// Spawn the encoder and return the ordered capture event stream.
    fn begin_capture(
        &mut self,
        profile: &CodecProfile,
    ) -> Result<Receiver<CaptureEvent>, RecorderError>;

    /// Ask the encoder to finish the container and exit.
    fn request_stop(&mut self) -> Result<(), RecorderError>;

    /// Release the underlying capture handle. Idempotent.
    fn close(&mut self);

    fn source(&self) -> &CaptureSource;
}

// ============================================================================
// RecordingController
// ============================================================================

/// Sole owner of the session, the chunk buffer, and the cycle state. One
/// recording at a time is a property of this machine, not of outside locking.
pub struct RecordingController {
    session: Option<Box<dyn SessionHandle>>,
    events: Option<Receiver<CaptureEvent>>,
    state: RecordingState,
    chunks: Vec<Vec<u8>>,
    profile: CodecProfile,
    temp_files: TempFileManager,
}

impl RecordingController {
    pub fn new() -> Self {
        Self {
            session: None,
            events: None,
            state: RecordingState::NoSource,
            chunks: Vec::new(),
            profile: CodecProfile::default(),
            temp_files: TempFileManager::new(),
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn source_name(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.source().name.clone())
    }

    pub fn temp_files(&self) -> &TempFileManager {
        &self.temp_files
    }

    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Bind a newly opened session. Any prior session is closed first so OS
    /// capture handles never leak across selections.
    pub fn select_source(&mut self, session: Box<dyn SessionHandle>) -> Result<(), RecorderError> {
        match self.state {
            RecordingState::NoSource | RecordingState::SourceSelected => {}
            _ => {
                return Err(RecorderError::CaptureUnavailable {
                    reason: "cannot switch sources while a recording cycle is active".to_string(),
                });
            }
        }

        if let Some(mut previous) = self.session.take() {
            previous.close();
        }
        println!("[Recording] Source selected: {}", session.source().name);
        self.session = Some(session);
        self.events = None;
        self.chunks.clear();
        self.state = RecordingState::SourceSelected;
        Ok(())
    }

    /// Begin a recording. Returns `Ok(false)` for the no-op cases (a cycle is
    /// already in flight); `MissingSource` when nothing is selected, without
    /// touching any state.
    pub fn start(&mut self) -> Result<bool, RecorderError> {
        match self.state {
            RecordingState::Recording
            | RecordingState::Stopped
            | RecordingState::Converting => {
                println!(
                    "[Recording] Start requested in state {:?}; already busy, ignoring",
                    self.state
                );
                return Ok(false);
            }
            RecordingState::NoSource | RecordingState::SourceSelected => {}
        }

        let Some(session) = self.session.as_mut() else {
            return Err(RecorderError::MissingSource);
        };

        let events = session.begin_capture(&self.profile)?;
        self.chunks.clear();
        self.events = Some(events);
        self.state = RecordingState::Recording;
        println!("[Recording] Recording started");
        Ok(true)
    }

    /// Feed one capture event through the machine. Chunks are appended only
    /// while recording and only when non-empty; an error event tears the
    /// session down so it is never left dangling.
    pub fn apply_event(&mut self, event: CaptureEvent) -> Result<(), RecorderError> {
        match event {
            CaptureEvent::Data(chunk) => {
                if self.state == RecordingState::Recording && !chunk.is_empty() {
                    self.chunks.push(chunk);
                }
                Ok(())
            }
            CaptureEvent::Stopped => {
                if self.state == RecordingState::Recording {
                    self.state = RecordingState::Stopped;
                }
                Ok(())
            }
            CaptureEvent::Error(reason) => {
                eprintln!("[Recording] Capture error: {}", reason);
                self.teardown_session();
                Err(RecorderError::CaptureUnavailable { reason })
            }
        }
    }

    /// Apply whatever events have arrived without blocking. Lets the UI poll
    /// pick up capture errors between user actions.
    pub fn pump_events(&mut self) -> Result<(), RecorderError> {
        let Some(events) = self.events.take() else {
            return Ok(());
        };

        loop {
            match events.try_recv() {
                Ok(event) => self.apply_event(event)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        if self.state == RecordingState::Recording {
            self.events = Some(events);
        }
        self.confirm_capture_exit()
    }

    /// A stream that ended without a stop request still has an encoder exit
    /// status to check: EOF alone cannot distinguish a finished container
    /// from a crashed process and a truncated buffer. Reaps the child; a
    /// failed exit is a capture error, not a stop.
    pub fn confirm_capture_exit(&mut self) -> Result<(), RecorderError> {
        if self.state != RecordingState::Stopped {
            return Ok(());
        }
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.request_stop() {
                eprintln!("[Recording] Capture exited abnormally: {}", e);
                self.teardown_session();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop the capture and drain the remaining chunks in arrival order.
    /// No-op when nothing is recording.
    pub fn finish_recording(&mut self) -> Result<(), RecorderError> {
        if self.state != RecordingState::Recording {
            println!(
                "[Recording] Stop requested in state {:?}; nothing to do",
                self.state
            );
            return Ok(());
        }

        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.request_stop() {
                self.teardown_session();
                return Err(e);
            }
        }

        let events = match self.events.take() {
            Some(events) => events,
            None => {
                self.state = RecordingState::Stopped;
                return Ok(());
            }
        };

        loop {
            let event = match events.recv_timeout(FLUSH_TIMEOUT) {
                Ok(event) => event,
                Err(RecvTimeoutError::Disconnected) => CaptureEvent::Stopped,
                Err(RecvTimeoutError::Timeout) => {
                    self.teardown_session();
                    return Err(RecorderError::Io {
                        message: "capture stream did not flush in time".to_string(),
                    });
                }
            };
            let stopped = matches!(event, CaptureEvent::Stopped);
            self.apply_event(event)?;
            if stopped {
                break;
            }
        }

        println!(
            "[Recording] Recording stopped with {} buffered bytes",
            self.buffered_bytes()
        );
        Ok(())
    }

    /// Hand the buffered recording to the save pipeline. Zero bytes after a
    /// stop is a failure, not an empty file.
    pub fn take_recording(&mut self) -> Result<Vec<u8>, RecorderError> {
        if self.state != RecordingState::Stopped {
            return Err(RecorderError::Io {
                message: format!("no stopped recording to collect in state {:?}", self.state),
            });
        }

        let total = self.buffered_bytes();
        if total == 0 {
            return Err(RecorderError::EmptyRecording);
        }

        let mut bytes = Vec::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    /// Stopped → Converting handoff.
    pub fn begin_convert(&mut self) -> Result<(), RecorderError> {
        if self.state != RecordingState::Stopped {
            return Err(RecorderError::Io {
                message: format!("cannot start conversion in state {:?}", self.state),
            });
        }
        self.state = RecordingState::Converting;
        Ok(())
    }

    /// End of a cycle, successful or not: buffer cleared, controls usable
    /// again. The selection survives unless the session was torn down.
    pub fn reset_cycle(&mut self) {
        self.chunks.clear();
        self.events = None;
        self.state = if self.session.is_some() {
            RecordingState::SourceSelected
        } else {
            RecordingState::NoSource
        };
    }

    fn teardown_session(&mut self) {
        self.chunks.clear();
        self.events = None;
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.state = RecordingState::NoSource;
    }

    /// App shutdown: a live capture process must not outlive the window.
    pub fn shutdown(&mut self) {
        if self.state == RecordingState::Recording {
            println!("[Recording] Shutting down with an active recording; stopping capture");
            if let Some(session) = self.session.as_mut() {
                let _ = session.request_stop();
            }
        }
        self.teardown_session();
    }
}

impl Default for RecordingController {
    fn default() -> Self {
        Self::new()
    }
}

/// Managed Tauri state wrapping the one controller instance.
pub type RecorderState = Arc<Mutex<RecordingController>>;

fn lock_controller(state: &RecorderState) -> Result<MutexGuard<'_, RecordingController>, RecorderError> {
    state.lock().map_err(|_| RecorderError::Io {
        message: "recorder state lock poisoned".to_string(),
    })
}

// ============================================================================
// Temp files
// ============================================================================

/// Owns the private temp directory the intermediate capture files live in.
#[derive(Debug, Clone)]
pub struct TempFileManager {
    dir: PathBuf,
}

impl TempFileManager {
    pub fn new() -> Self {
        Self::with_dir(std::env::temp_dir().join("clipcast"))
    }

    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the full recording before conversion begins. The file carries a
    /// millisecond timestamp so concurrent app instances never collide.
    pub fn write_temp(&self, bytes: &[u8]) -> Result<PathBuf, RecorderError> {
        fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(format!("temp-{}.webm", Utc::now().timestamp_millis()));
        fs::write(&path, bytes)?;
        println!(
            "[TempFiles] Wrote {} bytes to {}",
            bytes.len(),
            path.display()
        );
        Ok(path)
    }

    /// Best-effort removal; a leftover temp file is only worth a log line.
    pub fn cleanup_temp(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => println!("[TempFiles] Removed {}", path.display()),
            Err(e) => eprintln!("[TempFiles] Failed to remove {}: {}", path.display(), e),
        }
    }

    /// Sweep temp files a crashed run left behind. Only our own naming
    /// pattern is touched, and only files past the orphan age.
    pub fn cleanup_orphaned(&self) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        let cutoff = SystemTime::now() - ORPHAN_MAX_AGE;

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let matches_pattern = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("temp-") && n.ends_with(".webm"))
                .unwrap_or(false);
            if !matches_pattern {
                continue;
            }

            let is_old = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false);
            if is_old && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            println!("[TempFiles] Removed {} orphaned temp files", removed);
        }
        removed
    }
}

impl Default for TempFileManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Default name offered in the save dialog.
pub fn suggested_file_name() -> String {
    format!("recording-{}.mp4", Utc::now().timestamp_millis())
}

// ============================================================================
// Events toward the UI
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatePayload {
    pub state: RecordingState,
    pub source_name: Option<String>,
}

impl RecordingStatePayload {
    fn of(controller: &RecordingController) -> Self {
        Self {
            state: controller.state(),
            source_name: controller.source_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload<'a> {
    error: &'a RecorderError,
    user_message: String,
    recovery_suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SavedPayload {
    path: String,
    source_name: Option<String>,
}

fn emit_state(app: &AppHandle, controller: &RecordingController) {
    let _ = app.emit("recording-state", RecordingStatePayload::of(controller));
}

fn emit_error(app: &AppHandle, error: &RecorderError) {
    let _ = app.emit(
        "recording-error",
        ErrorPayload {
            error,
            user_message: error.user_message(),
            recovery_suggestion: error.recovery_suggestion(),
        },
    );
}

/// Result of a stop request. Cancellation is a normal outcome and never an
/// error; `NotRecording` covers stop clicks that raced a finished cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum StopOutcome {
    Saved { path: String },
    Cancelled,
    NotRecording,
}

// ============================================================================
// Tauri Commands
// ============================================================================

/// Startup housekeeping: sweep temp files a previous run left behind.
pub fn initialize_recording() {
    TempFileManager::new().cleanup_orphaned();
}

#[tauri::command]
pub async fn get_recording_state(
    app: AppHandle,
    state: State<'_, RecorderState>,
) -> Result<RecordingStatePayload, String> {
    let mut controller = lock_controller(&state).map_err(|e| e.to_string())?;
    if let Err(e) = controller.pump_events() {
        emit_state(&app, &controller);
        emit_error(&app, &e);
    }
    Ok(RecordingStatePayload::of(&controller))
}

/// Bind the picked source. The platform session is opened first; only a
/// session that actually opened replaces the current one.
#[tauri::command]
pub async fn select_source(
    app: AppHandle,
    state: State<'_, RecorderState>,
    source: CaptureSource,
) -> Result<RecordingStatePayload, String> {
    let result = (|| -> Result<RecordingStatePayload, RecorderError> {
        let session = CaptureSession::open(source, ResolutionBounds::default())?;
        let mut controller = lock_controller(&state)?;
        controller.select_source(Box::new(session))?;
        emit_state(&app, &controller);
        Ok(RecordingStatePayload::of(&controller))
    })();

    result.map_err(|e| {
        emit_error(&app, &e);
        e.to_string()
    })
}

#[tauri::command]
pub async fn start_recording(
    app: AppHandle,
    state: State<'_, RecorderState>,
) -> Result<bool, String> {
    let mut controller = lock_controller(&state).map_err(|e| e.to_string())?;
    match controller.start() {
        Ok(started) => {
            if started {
                emit_state(&app, &controller);
            }
            Ok(started)
        }
        Err(e) => {
            emit_error(&app, &e);
            Err(e.to_string())
        }
    }
}

/// Stop the capture and run the whole save pipeline: collect chunks, prompt
/// for a destination, write the temp file, convert, clean up.
#[tauri::command]
pub async fn stop_recording(
    app: AppHandle,
    state: State<'_, RecorderState>,
) -> Result<StopOutcome, String> {
    let state = state.inner().clone();
    tauri::async_runtime::spawn_blocking(move || run_save_pipeline(&app, &state))
        .await
        .map_err(|e| format!("save pipeline task failed: {}", e))?
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn sweep_temp_files(state: State<'_, RecorderState>) -> Result<usize, String> {
    let controller = lock_controller(&state).map_err(|e| e.to_string())?;
    Ok(controller.temp_files().cleanup_orphaned())
}

fn run_save_pipeline(app: &AppHandle, state: &RecorderState) -> Result<StopOutcome, RecorderError> {
    // Phase 1: stop the capture and collect the recording.
    let (bytes, temp_files, source_name) = {
        let mut controller = lock_controller(state)?;
        if let Err(e) = controller.pump_events() {
            emit_state(app, &controller);
            emit_error(app, &e);
            return Err(e);
        }

        match controller.state() {
            RecordingState::Recording => {
                if let Err(e) = controller.finish_recording() {
                    emit_state(app, &controller);
                    emit_error(app, &e);
                    return Err(e);
                }
            }
            // The stream ended on its own; the exit status still decides
            // whether the buffer can be trusted.
            RecordingState::Stopped => {
                if let Err(e) = controller.confirm_capture_exit() {
                    emit_state(app, &controller);
                    emit_error(app, &e);
                    return Err(e);
                }
            }
            other => {
                println!("[Recording] Stop requested in state {:?}; ignoring", other);
                return Ok(StopOutcome::NotRecording);
            }
        }
        emit_state(app, &controller);

        let bytes = match controller.take_recording() {
            Ok(bytes) => bytes,
            Err(e) => {
                controller.reset_cycle();
                emit_state(app, &controller);
                emit_error(app, &e);
                return Err(e);
            }
        };
        (
            bytes,
            controller.temp_files().clone(),
            controller.source_name(),
        )
    };

    // Phase 2: pick a destination. The lock is not held while the dialog is
    // up; the Stopped state keeps the machine from starting a new cycle.
    let picked = app
        .dialog()
        .file()
        .set_file_name(&suggested_file_name())
        .add_filter("MP4 Video", &["mp4"])
        .blocking_save_file();

    let Some(picked) = picked else {
        // Normal outcome. Nothing was written yet, so only the buffer and
        // state need unwinding.
        println!("[Recording] Save cancelled; recording discarded");
        let mut controller = lock_controller(state)?;
        controller.reset_cycle();
        emit_state(app, &controller);
        return Ok(StopOutcome::Cancelled);
    };
    let target = picked.into_path().map_err(|e| RecorderError::Io {
        message: format!("unusable save path: {}", e),
    })?;

    // Phase 3: full temp write, then conversion.
    let temp_path = match temp_files.write_temp(&bytes) {
        Ok(path) => path,
        Err(e) => {
            let mut controller = lock_controller(state)?;
            controller.reset_cycle();
            emit_state(app, &controller);
            emit_error(app, &e);
            return Err(e);
        }
    };
    drop(bytes);

    {
        let mut controller = lock_controller(state)?;
        if let Err(e) = controller.begin_convert() {
            controller.reset_cycle();
            emit_state(app, &controller);
            emit_error(app, &e);
            temp_files.cleanup_temp(&temp_path);
            return Err(e);
        }
        emit_state(app, &controller);
    }

    let mut job = ConversionJob::new(temp_path.clone(), target.clone());
    let result = convert::convert_file(app, &mut job, &CodecProfile::default());

    // Best-effort either way; never blocks the outcome.
    temp_files.cleanup_temp(&temp_path);

    let mut controller = lock_controller(state)?;
    controller.reset_cycle();
    emit_state(app, &controller);

    match result {
        Ok(()) => {
            let path = target.to_string_lossy().to_string();
            let _ = app.emit(
                "recording-saved",
                SavedPayload {
                    path: path.clone(),
                    source_name,
                },
            );
            println!("[Recording] Saved {}", path);
            Ok(StopOutcome::Saved { path })
        }
        Err(e) => {
            emit_error(app, &e);
            Err(e)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::sources::SourceKind;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{self, Sender};

    fn test_source() -> CaptureSource {
        CaptureSource::new(
            "screen:0".to_string(),
            "Screen 1".to_string(),
            SourceKind::Screen,
            1920,
            1080,
        )
    }

    struct FakeSession {
        source: CaptureSource,
        sender: Option<Sender<CaptureEvent>>,
        receiver: Option<Receiver<CaptureEvent>>,
        stop_error: Option<RecorderError>,
        stopped: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    }

    impl FakeSession {
        fn new() -> (Self, Sender<CaptureEvent>, Arc<AtomicBool>, Arc<AtomicBool>) {
            let (tx, rx) = mpsc::channel();
            let stopped = Arc::new(AtomicBool::new(false));
            let closed = Arc::new(AtomicBool::new(false));
            let session = Self {
                source: test_source(),
                sender: Some(tx.clone()),
                receiver: Some(rx),
                stop_error: None,
                stopped: stopped.clone(),
                closed: closed.clone(),
            };
            (session, tx, stopped, closed)
        }
    }

    impl SessionHandle for FakeSession {
        fn begin_capture(
            &mut self,
            _profile: &CodecProfile,
        ) -> Result<Receiver<CaptureEvent>, RecorderError> {
            self.receiver.take().ok_or_else(|| RecorderError::Io {
                message: "fake capture already started".to_string(),
            })
        }

        fn request_stop(&mut self) -> Result<(), RecorderError> {
            if let Some(e) = self.stop_error.take() {
                return Err(e);
            }
            self.stopped.store(true, Ordering::SeqCst);
            if let Some(sender) = self.sender.take() {
                let _ = sender.send(CaptureEvent::Stopped);
            }
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn source(&self) -> &CaptureSource {
            &self.source
        }
    }

    fn recording_controller() -> (RecordingController, Sender<CaptureEvent>, Arc<AtomicBool>) {
        let (session, tx, _stopped, closed) = FakeSession::new();
        let mut controller = RecordingController::new();
        controller.select_source(Box::new(session)).unwrap();
        assert!(controller.start().unwrap());
        (controller, tx, closed)
    }

    #[test]
    fn start_without_session_is_missing_source() {
        let mut controller = RecordingController::new();
        let err = controller.start().unwrap_err();
        assert_eq!(err, RecorderError::MissingSource);
        assert_eq!(controller.state(), RecordingState::NoSource);
        assert_eq!(controller.buffered_bytes(), 0);
    }

    #[test]
    fn select_then_start_enters_recording() {
        let (controller, _tx, _closed) = recording_controller();
        assert_eq!(controller.state(), RecordingState::Recording);
        assert_eq!(controller.source_name().as_deref(), Some("Screen 1"));
    }

    #[test]
    fn start_while_recording_is_a_noop() {
        let (mut controller, tx, _closed) = recording_controller();
        tx.send(CaptureEvent::Data(vec![1, 2, 3])).unwrap();
        controller.pump_events().unwrap();

        assert!(!controller.start().unwrap());
        assert_eq!(controller.state(), RecordingState::Recording);
        assert_eq!(controller.buffered_bytes(), 3);
    }

    #[test]
    fn switching_sources_mid_cycle_is_rejected() {
        let (mut controller, _tx, _closed) = recording_controller();
        let (other, _tx2, _s, _c) = FakeSession::new();
        let err = controller.select_source(Box::new(other)).unwrap_err();
        assert!(matches!(err, RecorderError::CaptureUnavailable { .. }));
        assert_eq!(controller.state(), RecordingState::Recording);
    }

    #[test]
    fn chunks_keep_arrival_order_and_drop_empties() {
        let (mut controller, tx, _closed) = recording_controller();
        tx.send(CaptureEvent::Data(vec![1])).unwrap();
        tx.send(CaptureEvent::Data(Vec::new())).unwrap();
        tx.send(CaptureEvent::Data(vec![2, 3])).unwrap();
        tx.send(CaptureEvent::Data(vec![4])).unwrap();

        controller.finish_recording().unwrap();
        assert_eq!(controller.state(), RecordingState::Stopped);

        let bytes = controller.take_recording().unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        assert_eq!(controller.buffered_bytes(), 0);
    }

    #[test]
    fn stop_when_not_recording_is_a_noop() {
        let (session, _tx, _stopped, _closed) = FakeSession::new();
        let mut controller = RecordingController::new();
        controller.select_source(Box::new(session)).unwrap();

        controller.finish_recording().unwrap();
        assert_eq!(controller.state(), RecordingState::SourceSelected);
    }

    #[test]
    fn stop_with_no_data_is_empty_recording() {
        let (mut controller, _tx, _closed) = recording_controller();
        controller.finish_recording().unwrap();
        let err = controller.take_recording().unwrap_err();
        assert_eq!(err, RecorderError::EmptyRecording);
    }

    #[test]
    fn capture_error_tears_the_session_down() {
        let (mut controller, tx, closed) = recording_controller();
        tx.send(CaptureEvent::Data(vec![9])).unwrap();
        tx.send(CaptureEvent::Error("device unplugged".to_string()))
            .unwrap();

        let err = controller.pump_events().unwrap_err();
        assert!(matches!(err, RecorderError::CaptureUnavailable { .. }));
        assert_eq!(controller.state(), RecordingState::NoSource);
        assert_eq!(controller.buffered_bytes(), 0);
        assert!(controller.source_name().is_none());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn crash_eof_is_not_a_clean_stop() {
        let (mut session, tx, _stopped, closed) = FakeSession::new();
        session.stop_error = Some(RecorderError::CaptureUnavailable {
            reason: "capture process exited with signal 11".to_string(),
        });
        let mut controller = RecordingController::new();
        controller.select_source(Box::new(session)).unwrap();
        assert!(controller.start().unwrap());

        // The encoder dies on its own: chunks, then EOF, no stop requested.
        tx.send(CaptureEvent::Data(vec![1, 2, 3])).unwrap();
        tx.send(CaptureEvent::Stopped).unwrap();

        let err = controller.pump_events().unwrap_err();
        assert!(matches!(err, RecorderError::CaptureUnavailable { .. }));
        assert_eq!(controller.state(), RecordingState::NoSource);
        assert_eq!(controller.buffered_bytes(), 0);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn clean_self_stop_keeps_the_buffer() {
        let (mut controller, tx, _closed) = recording_controller();
        tx.send(CaptureEvent::Data(vec![5])).unwrap();
        tx.send(CaptureEvent::Stopped).unwrap();

        controller.pump_events().unwrap();
        assert_eq!(controller.state(), RecordingState::Stopped);
        assert_eq!(controller.take_recording().unwrap(), vec![5]);
    }

    #[test]
    fn chunks_after_stop_are_ignored() {
        let (mut controller, tx, _closed) = recording_controller();
        tx.send(CaptureEvent::Data(vec![1])).unwrap();
        controller.finish_recording().unwrap();

        controller
            .apply_event(CaptureEvent::Data(vec![7, 7]))
            .unwrap();
        assert_eq!(controller.take_recording().unwrap(), vec![1]);
    }

    #[test]
    fn reset_after_stop_returns_to_source_selected_with_empty_buffer() {
        let (mut controller, tx, _closed) = recording_controller();
        tx.send(CaptureEvent::Data(vec![1, 2])).unwrap();
        controller.finish_recording().unwrap();

        controller.reset_cycle();
        assert_eq!(controller.state(), RecordingState::SourceSelected);
        assert_eq!(controller.buffered_bytes(), 0);

        // The selection survives: a fresh start consults the session again
        // (this fake only arms a single capture, so it reports an error).
        let err = controller.start().unwrap_err();
        assert!(matches!(err, RecorderError::Io { .. }));
    }

    #[test]
    fn convert_handoff_requires_a_stopped_cycle() {
        let (mut controller, tx, _closed) = recording_controller();
        assert!(controller.begin_convert().is_err());

        tx.send(CaptureEvent::Data(vec![1])).unwrap();
        controller.finish_recording().unwrap();
        controller.begin_convert().unwrap();
        assert_eq!(controller.state(), RecordingState::Converting);

        controller.reset_cycle();
        assert_eq!(controller.state(), RecordingState::SourceSelected);
    }

    #[test]
    fn shutdown_closes_the_session() {
        let (mut controller, _tx, closed) = recording_controller();
        controller.shutdown();
        assert_eq!(controller.state(), RecordingState::NoSource);
        assert!(controller.source_name().is_none());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn temp_write_and_cleanup_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempFileManager::with_dir(dir.path().join("clipcast"));

        let path = manager.write_temp(b"webm bytes").unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("temp-"));
        assert!(name.ends_with(".webm"));
        assert_eq!(fs::read(&path).unwrap(), b"webm bytes");

        manager.cleanup_temp(&path);
        assert!(!path.exists());

        // Cleaning up a missing file is only worth a log line.
        manager.cleanup_temp(&path);
    }

    #[test]
    fn orphan_sweep_leaves_fresh_and_foreign_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempFileManager::with_dir(dir.path().to_path_buf());

        let fresh = manager.write_temp(b"fresh").unwrap();
        let foreign = dir.path().join("notes.txt");
        fs::write(&foreign, b"keep me").unwrap();

        assert_eq!(manager.cleanup_orphaned(), 0);
        assert!(fresh.exists());
        assert!(foreign.exists());
    }

    #[test]
    fn orphan_sweep_of_missing_dir_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempFileManager::with_dir(dir.path().join("never-created"));
        assert_eq!(manager.cleanup_orphaned(), 0);
    }

    #[test]
    fn suggested_name_is_a_timestamped_mp4() {
        let name = suggested_file_name();
        assert!(name.starts_with("recording-"));
        assert!(name.ends_with(".mp4"));
    }

    #[test]
    fn error_payloads_serialize_with_remediation() {
        let err = RecorderError::PermissionDenied;
        let json = serde_json::to_string(&ErrorPayload {
            error: &err,
            user_message: err.user_message(),
            recovery_suggestion: err.recovery_suggestion(),
        })
        .unwrap();
        assert!(json.contains("permission_denied"));
        assert!(json.contains("Screen Recording"));
    }

    #[test]
    fn stop_outcome_serializes_tagged() {
        let json = serde_json::to_string(&StopOutcome::Saved {
            path: "/tmp/out.mp4".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"outcome\":\"saved\""));
        assert!(
            serde_json::to_string(&StopOutcome::Cancelled)
                .unwrap()
                .contains("cancelled")
        );
    }
}
