//! A live recording bound to one guild.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::RecorderError;
use super::transport::{AudioConnection, PcmStream};
use super::writer::ArtifactWriter;
use crate::calendar::{CalendarEvent, GuildId};

/// Read-only view of a session, safe to hand to API handlers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub guild_id: GuildId,
    pub event_id: crate::calendar::EventId,
    pub event_name: String,
    pub provisional_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// Owns the audio connection and encoder for one guild while recording.
pub struct RecordingSession {
    guild_id: GuildId,
    event: CalendarEvent,
    provisional_path: PathBuf,
    started_at: DateTime<Utc>,
    connection: Box<dyn AudioConnection>,
    writer: ArtifactWriter,
    pump: JoinHandle<u64>,
    stop_pump: CancellationToken,
}

/// What is left once the pipeline has been torn down.
pub struct StoppedSession {
    pub guild_id: GuildId,
    pub event: CalendarEvent,
    pub provisional_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub bytes_captured: u64,
    pub encoder_result: Result<(), RecorderError>,
}

impl RecordingSession {
    /// Wire `stream` into the writer's input and start pumping.
    ///
    /// Fails only if the writer's input was already taken.
    pub fn start(
        guild_id: GuildId,
        event: CalendarEvent,
        connection: Box<dyn AudioConnection>,
        mut writer: ArtifactWriter,
        stream: PcmStream,
    ) -> Result<Self, (Box<dyn AudioConnection>, ArtifactWriter)> {
        let Some(input) = writer.take_input() else {
            return Err((connection, writer));
        };

        let stop_pump = CancellationToken::new();
        let pump = tokio::spawn(pump_audio(stream, input, stop_pump.clone(), guild_id));

        Ok(Self {
            guild_id,
            event,
            provisional_path: writer.output().to_path_buf(),
            started_at: Utc::now(),
            connection,
            writer,
            pump,
            stop_pump,
        })
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            guild_id: self.guild_id,
            event_id: self.event.id,
            event_name: self.event.name.clone(),
            provisional_path: self.provisional_path.clone(),
            started_at: self.started_at,
        }
    }

    pub fn event(&self) -> &CalendarEvent {
        &self.event
    }

    /// End of input → encoder exit → disconnect.
    ///
    /// Never fails as a whole; the encoder outcome is carried in the result.
    pub async fn stop(self) -> StoppedSession {
        self.stop_pump.cancel();
        let bytes_captured = match self.pump.await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Audio pump for guild {} panicked: {}", self.guild_id, e);
                0
            }
        };

        let encoder_result = self.writer.finish().await;

        if let Err(e) = self.connection.disconnect().await {
            warn!(
                "Failed to disconnect audio for guild {}: {}",
                self.guild_id, e
            );
        }

        StoppedSession {
            guild_id: self.guild_id,
            event: self.event,
            provisional_path: self.provisional_path,
            started_at: self.started_at,
            finished_at: Utc::now(),
            bytes_captured,
            encoder_result,
        }
    }
}

/// Copy PCM into the encoder until the stream ends or we are told to stop.
/// Returns the number of bytes forwarded. Dropping `input` closes the pipe.
async fn pump_audio(
    mut stream: PcmStream,
    mut input: tokio::process::ChildStdin,
    stop: CancellationToken,
    guild_id: GuildId,
) -> u64 {
    let mut forwarded = 0u64;
    let mut buf = vec![0u8; 16 * 1024];

    loop {
        let read = tokio::select! {
            _ = stop.cancelled() => break,
            read = tokio::io::AsyncReadExt::read(&mut stream, &mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!("Audio stream for guild {} ended", guild_id);
                break;
            }
            Ok(n) => {
                if let Err(e) = input.write_all(&buf[..n]).await {
                    warn!("Encoder input for guild {} closed: {}", guild_id, e);
                    break;
                }
                forwarded += n as u64;
            }
            Err(e) => {
                warn!("Audio stream for guild {} failed: {}", guild_id, e);
                break;
            }
        }
    }

    if let Err(e) = input.shutdown().await {
        debug!("Encoder input shutdown for guild {}: {}", guild_id, e);
    }
    forwarded
}
