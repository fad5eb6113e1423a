// Conversion of the capture-native intermediate into the distributed MP4.
// The rest of the pipeline only depends on the narrow contract here: one
// blocking call, one success/failure outcome, advisory progress events.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use serde::Serialize;
use tauri::{AppHandle, Emitter};

use super::ffmpeg_utils;
use super::recording::{CodecProfile, RecorderError};

/// One conversion: capture-native input, user-chosen output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub status: ConversionStatus,
}

impl ConversionJob {
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            status: ConversionStatus::Pending,
        }
    }
}

/// Advisory progress toward the UI. `percent` is absent when the input
/// duration could not be probed; correctness never depends on it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionProgress {
    pub percent: Option<f32>,
    pub message: String,
}

/// Argument list for one transcode: H.264 in an MP4 laid out for fast start,
/// video only, with machine-readable progress on stdout.
pub fn transcode_args(input: &Path, output: &Path, profile: &CodecProfile) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-nostats".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-c:v".to_string(),
        profile.target_encoder.to_string(),
        "-preset".to_string(),
        profile.preset.to_string(),
        "-crf".to_string(),
        profile.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-an".to_string(),
    ];
    if profile.faststart {
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
    }
    args.push("-y".to_string());
    args.push(output.to_string_lossy().to_string());
    args
}

/// Incremental parser for ffmpeg's `-progress` key/value stream.
pub struct ProgressParser {
    duration_secs: Option<f64>,
    out_time_secs: f64,
}

impl ProgressParser {
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs,
            out_time_secs: 0.0,
        }
    }

    /// Feed one line; a completed progress block yields an update.
    pub fn push_line(&mut self, line: &str) -> Option<ConversionProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // Microseconds, despite the name.
            "out_time_ms" => {
                if let Ok(us) = value.trim().parse::<i64>() {
                    self.out_time_secs = us as f64 / 1_000_000.0;
                }
                None
            }
            "progress" => Some(self.report(value.trim() == "end")),
            _ => None,
        }
    }

    fn report(&self, done: bool) -> ConversionProgress {
        if done {
            return ConversionProgress {
                percent: Some(100.0),
                message: "Conversion complete".to_string(),
            };
        }
        let percent = self
            .duration_secs
            .map(|d| ((self.out_time_secs / d) * 100.0).clamp(0.0, 100.0) as f32);
        ConversionProgress {
            percent,
            message: format!("Converted {:.1}s", self.out_time_secs),
        }
    }
}

/// Run one conversion to completion. Failure is terminal for the cycle; the
/// partially written output is never offered to the user.
pub fn convert_file(
    app: &AppHandle,
    job: &mut ConversionJob,
    profile: &CodecProfile,
) -> Result<(), RecorderError> {
    let ffmpeg = ffmpeg_utils::find_ffmpeg().ok_or(RecorderError::DependencyMissing {
        name: "ffmpeg".to_string(),
    })?;
    if !ffmpeg_utils::encoder_available(&ffmpeg, profile.target_encoder) {
        job.status = ConversionStatus::Failed;
        return Err(RecorderError::UnsupportedFormat {
            codec: profile.target_encoder.to_string(),
        });
    }

    // Truncated capture files often carry no duration header; the progress
    // stream then degrades to messages without a percentage.
    let duration = ffmpeg_utils::probe_duration_secs(&job.input);

    println!(
        "[Convert] {} -> {}",
        job.input.display(),
        job.output.display()
    );
    let mut child = Command::new(&ffmpeg)
        .args(transcode_args(&job.input, &job.output, profile))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            job.status = ConversionStatus::Failed;
            RecorderError::ConversionFailed {
                cause: format!("failed to start ffmpeg: {}", e),
            }
        })?;
    job.status = ConversionStatus::Running;
    println!("[Convert] ffmpeg started with PID {}", child.id());

    // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
    let stderr_task = child.stderr.take().map(|stderr| {
        thread::spawn(move || -> String {
            let mut output = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut output);
            output
        })
    });

    if let Some(stdout) = child.stdout.take() {
        let mut parser = ProgressParser::new(duration);
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if let Some(update) = parser.push_line(&line) {
                let _ = app.emit("conversion-progress", update);
            }
        }
    }

    let status = child.wait().map_err(|e| {
        job.status = ConversionStatus::Failed;
        RecorderError::ConversionFailed {
            cause: format!("failed to wait on ffmpeg: {}", e),
        }
    })?;
    let stderr_output = stderr_task
        .and_then(|task| task.join().ok())
        .unwrap_or_default();

    if !status.success() {
        job.status = ConversionStatus::Failed;
        let cause = stderr_output.trim();
        return Err(RecorderError::ConversionFailed {
            cause: if cause.is_empty() {
                format!("ffmpeg exited with {}", status)
            } else {
                format!("ffmpeg exited with {}: {}", status, cause)
            },
        });
    }

    if !job.output.exists() {
        job.status = ConversionStatus::Failed;
        return Err(RecorderError::ConversionFailed {
            cause: "conversion reported success but produced no output".to_string(),
        });
    }

    job.status = ConversionStatus::Done;
    Ok(())
}
