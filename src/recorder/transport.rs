//! Audio transport: joins a voice channel and yields its raw PCM stream.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::calendar::{ChannelRef, GuildId};
use crate::config::TransportConfig;

/// Signed 16-bit little-endian PCM, 48 kHz, stereo.
pub type PcmStream = Box<dyn AsyncRead + Send + Unpin>;

/// A live capture from one voice channel.
#[async_trait]
pub trait AudioConnection: Send {
    /// Hand out the PCM stream. Returns `None` once taken.
    fn take_stream(&mut self) -> Option<PcmStream>;

    async fn disconnect(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait AudioTransport: Send + Sync {
    async fn connect(&self, guild: GuildId, channel: &ChannelRef) -> Result<Box<dyn AudioConnection>>;
}

const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs a voice bridge command per connection and reads PCM from its stdout.
///
/// `{guild_id}` and `{channel_id}` in the arguments are replaced before spawning.
pub struct CommandAudioTransport {
    command: Vec<String>,
}

impl CommandAudioTransport {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.command.clone())
    }

    fn render_args(&self, guild: GuildId, channel: &ChannelRef) -> Vec<String> {
        let guild = guild.to_string();
        let channel = channel.id.to_string();
        self.command
            .iter()
            .skip(1)
            .map(|arg| {
                arg.replace("{guild_id}", &guild)
                    .replace("{channel_id}", &channel)
            })
            .collect()
    }
}

#[async_trait]
impl AudioTransport for CommandAudioTransport {
    async fn connect(&self, guild: GuildId, channel: &ChannelRef) -> Result<Box<dyn AudioConnection>> {
        let Some(program) = self.command.first() else {
            bail!("No capture command configured");
        };

        let mut child = Command::new(program)
            .args(self.render_args(guild, channel))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to run capture command {program:?}"))?;

        if let Some(status) = child.try_wait()? {
            bail!("Capture command exited immediately with {status}");
        }

        let stdout = child
            .stdout
            .take()
            .context("Capture command has no stdout")?;

        info!(
            "Connected to voice channel {} ({}) in guild {}",
            channel.name, channel.id, guild
        );

        Ok(Box::new(CommandConnection {
            child,
            stream: Some(Box::new(stdout)),
        }))
    }
}

struct CommandConnection {
    child: Child,
    stream: Option<PcmStream>,
}

#[async_trait]
impl AudioConnection for CommandConnection {
    fn take_stream(&mut self) -> Option<PcmStream> {
        self.stream.take()
    }

    async fn disconnect(mut self: Box<Self>) -> Result<()> {
        drop(self.stream.take());

        if self.child.try_wait()?.is_none() {
            self.child
                .start_kill()
                .context("Failed to stop capture command")?;
        }

        match tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Capture command exited with {}", status),
            Ok(Err(e)) => warn!("Failed to reap capture command: {}", e),
            Err(_) => warn!("Capture command did not exit after kill"),
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory transport delivering a fixed PCM buffer per connection.
    #[derive(Default)]
    pub struct FakeTransport {
        pub pcm: Vec<u8>,
        pub fail: bool,
        pub connects: Arc<AtomicUsize>,
        pub disconnects: Arc<AtomicUsize>,
    }

    impl FakeTransport {
        pub fn with_pcm(pcm: Vec<u8>) -> Self {
            Self {
                pcm,
                ..Default::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn live(&self) -> usize {
            self.connects.load(Ordering::SeqCst) - self.disconnects.load(Ordering::SeqCst)
        }
    }

    struct FakeConnection {
        stream: Option<PcmStream>,
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AudioConnection for FakeConnection {
        fn take_stream(&mut self) -> Option<PcmStream> {
            self.stream.take()
        }

        async fn disconnect(self: Box<Self>) -> Result<()> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl AudioTransport for FakeTransport {
        async fn connect(&self, _guild: GuildId, _channel: &ChannelRef) -> Result<Box<dyn AudioConnection>> {
            if self.fail {
                bail!("voice gateway unavailable");
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeConnection {
                stream: Some(Box::new(std::io::Cursor::new(self.pcm.clone()))),
                disconnects: self.disconnects.clone(),
            }))
        }
    }
}
