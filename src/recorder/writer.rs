//! External encoder process that turns raw PCM into a playable file.
//!
//! The encoder reads s16le/48kHz/stereo PCM on stdin and writes the
//! container file once stdin is closed and it exits.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use super::error::RecorderError;
use crate::config::EncoderConfig;

/// Input format arguments matching the audio transport's PCM stream.
const PCM_INPUT_ARGS: [&str; 8] = ["-f", "s16le", "-ar", "48000", "-ac", "2", "-i", "-"];

/// Launches encoder processes.
#[derive(Debug, Clone)]
pub struct Encoder {
    command: Vec<String>,
    timeout: Duration,
}

impl Encoder {
    /// # Arguments
    /// * `command` - Program plus leading arguments, e.g. `["ffmpeg"]`
    /// * `timeout` - How long to wait for the process to exit once input ends
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn from_config(config: &EncoderConfig) -> Self {
        Self::new(config.command.clone(), config.timeout())
    }

    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("ffmpeg")
    }

    /// Whether the encoder program can be found on PATH.
    pub fn is_available(&self) -> bool {
        which::which(self.program()).is_ok()
    }

    /// Spawn an encoder writing to `output`.
    pub fn spawn(&self, output: &Path) -> Result<ArtifactWriter, RecorderError> {
        let mut cmd = Command::new(self.program());
        cmd.args(self.command.iter().skip(1))
            .args(PCM_INPUT_ARGS)
            .arg("-y")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(RecorderError::EncoderSpawn)?;
        let stdin = child.stdin.take();

        debug!("Encoder started for {:?} (pid {:?})", output, child.id());

        Ok(ArtifactWriter {
            child,
            stdin,
            output: output.to_path_buf(),
            timeout: self.timeout,
        })
    }
}

/// A running encoder process and the file it produces.
pub struct ArtifactWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    output: PathBuf,
    timeout: Duration,
}

impl ArtifactWriter {
    /// The pipe feeding the encoder. Dropping it signals end of input.
    pub fn take_input(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Close input and wait for the encoder to exit.
    ///
    /// The input handle must already have been released by whoever took it.
    /// On timeout the process is killed and `EncoderTimeout` returned.
    pub async fn finish(mut self) -> Result<(), RecorderError> {
        drop(self.stdin.take());

        match tokio::time::timeout(self.timeout, self.child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                info!("Encoder finished writing {:?}", self.output);
                Ok(())
            }
            Ok(Ok(status)) => Err(RecorderError::EncoderFault(status.to_string())),
            Ok(Err(e)) => Err(RecorderError::EncoderFault(e.to_string())),
            Err(_) => {
                warn!(
                    "Encoder for {:?} did not exit within {}s, killing it",
                    self.output,
                    self.timeout.as_secs()
                );
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill encoder: {}", e);
                }
                Err(RecorderError::EncoderTimeout(self.timeout))
            }
        }
    }

    /// Kill the encoder without waiting for output. Used when a start fails halfway.
    pub async fn abort(mut self) {
        drop(self.stdin.take());
        if let Err(e) = self.child.kill().await {
            debug!("Encoder already gone: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Copies stdin to the last argument, like a lossless "encoder".
    pub const COPY_SCRIPT: &str = r#"for a; do out="$a"; done; cat > "$out""#;
    /// Like `COPY_SCRIPT`, but lingers for a second after input closes.
    pub const SLOW_COPY_SCRIPT: &str = r#"for a; do out="$a"; done; cat > "$out"; sleep 1"#;
    /// Drains input, then fails.
    pub const FAIL_SCRIPT: &str = "cat > /dev/null; exit 3";
    /// Never exits on its own.
    pub const HANG_SCRIPT: &str = "exec sleep 30";

    pub fn sh_encoder(script: &str, timeout: Duration) -> Encoder {
        Encoder::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                script.to_string(),
                "fake-ffmpeg".to_string(),
            ],
            timeout,
        )
    }
}
