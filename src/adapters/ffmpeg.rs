//! FFmpeg transcoder adapter.
//!
//! Spawns the `ffmpeg` binary once per file and captures its stderr as the
//! diagnostic stream.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use super::{EncodingProfile, TranscodeOutput, Transcoder};

/// Transcoder backed by the ffmpeg CLI
pub struct FfmpegTranscoder {
    /// Path to the ffmpeg binary (default: "ffmpeg")
    binary_path: String,

    /// Upper bound for a single conversion
    run_timeout: Duration,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTranscoder {
    /// Create a transcoder using `ffmpeg` from PATH
    pub fn new() -> Self {
        Self::with_binary_path("ffmpeg")
    }

    /// Create a transcoder with a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            run_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    /// Arguments for one conversion.
    ///
    /// `-y` forces overwrite, `-q:a` selects the VBR quality level.
    fn build_args(input: &Path, output: &Path, profile: &EncodingProfile) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-codec:a".into(),
            profile.codec.clone().into(),
            "-q:a".into(),
            profile.vbr_quality.to_string().into(),
            output.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn run(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncodingProfile,
    ) -> Result<TranscodeOutput> {
        let child = Command::new(&self.binary_path)
            .args(Self::build_args(input, output, profile))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {} for {}", self.binary_path, input.display()))?;

        let result = timeout(self.run_timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "{} timed out after {:?} converting {}",
                    self.binary_path,
                    self.run_timeout,
                    input.display()
                )
            })?
            .with_context(|| format!("Failed to wait for {}", self.binary_path))?;

        Ok(TranscodeOutput {
            exit_code: result.status.code().unwrap_or(-1),
            diagnostic: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        })
    }

    async fn health_check(&self) -> Result<()> {
        let output = Command::new(&self.binary_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {} -version", self.binary_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} health check failed: {}", self.binary_path, stderr.trim());
        }

        Ok(())
    }
}
