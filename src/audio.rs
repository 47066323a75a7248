use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::AudioConfig;

/// Errors at the external transcoder boundary.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The transcoder ran but could not decode or resample the input.
    /// Treated as a non-retryable input error.
    #[error("ffmpeg exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    /// The transcoder exceeded its hard deadline.
    #[error("ffmpeg timed out after {0:?}")]
    TimedOut(Duration),

    /// The transcoder binary itself is missing or broken. Raised by the
    /// startup probe, never per-request.
    #[error("ffmpeg unavailable: {0}")]
    ToolUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Resamples arbitrary input audio to the mono 16 kHz WAV the recognition
/// backend expects, by shelling out to ffmpeg.
#[derive(Debug, Clone)]
pub struct AudioNormalizer {
    ffmpeg_bin: String,
    target_sample_rate: u32,
    timeout: Duration,
}

impl AudioNormalizer {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            target_sample_rate: config.target_sample_rate,
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    /// Override the transcoder binary (tests substitute a stub here).
    pub fn with_binary(mut self, bin: impl Into<String>) -> Self {
        self.ffmpeg_bin = bin.into();
        self
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Probe the transcoder once at startup, before serving requests.
    pub async fn ensure_available(&self) -> Result<(), NormalizeError> {
        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match cmd.status().await {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(NormalizeError::ToolUnavailable(format!(
                "`{} -version` exited with {}",
                self.ffmpeg_bin, status
            ))),
            Err(e) => Err(NormalizeError::ToolUnavailable(format!(
                "cannot run {}: {}",
                self.ffmpeg_bin, e
            ))),
        }
    }

    /// Transcode `input` into mono 16 kHz PCM WAV at `output`, overwriting
    /// any existing file, under a hard timeout.
    pub async fn normalize(&self, input: &Path, output: &Path) -> Result<(), NormalizeError> {
        debug!(
            "Normalizing {} -> {} ({}Hz mono)",
            input.display(),
            output.display(),
            self.target_sample_rate
        );

        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.arg("-i")
            .arg(input)
            .arg("-ar")
            .arg(self.target_sample_rate.to_string())
            .arg("-ac")
            .arg("1")
            .arg("-y")
            .arg(output)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let run = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| NormalizeError::TimedOut(self.timeout))??;

        if !run.status.success() {
            let stderr = String::from_utf8_lossy(&run.stderr);
            // ffmpeg puts the actual failure on the last non-empty line
            let detail = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("")
                .to_string();
            return Err(NormalizeError::Failed {
                status: run.status.code().unwrap_or(-1),
                stderr: detail,
            });
        }

        Ok(())
    }
}
