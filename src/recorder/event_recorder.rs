//! Starts and stops recordings for calendar events.
//!
//! Every collaborator is injected; the reconciliation loop and the manual
//! command handlers share one `EventRecorder` and therefore one registry.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::RecorderError;
use super::finalizer::{MeetingRecord, RecordStore};
use super::registry::SessionRegistry;
use super::session::{RecordingSession, SessionInfo};
use super::transport::{AudioConnection, AudioTransport};
use super::writer::{ArtifactWriter, Encoder};
use crate::calendar::{CalendarEvent, EventId, GuildId};
use crate::notify::{self, Notifier};

/// Outcome of stopping a recording. Faults past the point of no return are
/// reported here instead of failing the stop.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeReport {
    pub guild_id: GuildId,
    pub event_id: EventId,
    pub event_name: String,
    pub duration_seconds: i64,
    pub bytes_captured: u64,
    pub record: Option<MeetingRecord>,
    pub metadata_path: Option<PathBuf>,
    pub audio_path: Option<PathBuf>,
    pub encoder_error: Option<String>,
    pub persistence_error: Option<String>,
}

impl FinalizeReport {
    pub fn is_clean(&self) -> bool {
        self.encoder_error.is_none() && self.persistence_error.is_none()
    }
}

pub struct EventRecorder {
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn AudioTransport>,
    notifier: Arc<dyn Notifier>,
    encoder: Encoder,
    store: RecordStore,
    temp_dir: PathBuf,
    connect_timeout: Duration,
}

impl EventRecorder {
    pub fn new(
        registry: Arc<SessionRegistry>,
        transport: Arc<dyn AudioTransport>,
        notifier: Arc<dyn Notifier>,
        encoder: Encoder,
        store: RecordStore,
    ) -> Self {
        Self {
            registry,
            transport,
            notifier,
            encoder,
            store,
            temp_dir: std::env::temp_dir(),
            connect_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = dir;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub async fn is_recording(&self, guild: GuildId) -> bool {
        self.registry.is_recording(guild).await
    }

    pub async fn active(&self) -> Vec<SessionInfo> {
        self.registry.snapshot().await
    }

    /// Start recording `event` in `guild`.
    ///
    /// Holds the guild's slot for the whole sequence. On failure every
    /// resource acquired so far is released and nothing is registered.
    pub async fn begin(
        &self,
        guild: GuildId,
        event: CalendarEvent,
    ) -> Result<SessionInfo, RecorderError> {
        let mut slot = self.registry.lock(guild).await;
        if slot.is_some() {
            return Err(RecorderError::AlreadyRecording(guild));
        }

        let channel = event
            .voice_channel()
            .cloned()
            .ok_or(RecorderError::NoTargetChannel)?;

        let mut connection = match tokio::time::timeout(
            self.connect_timeout,
            self.transport.connect(guild, &channel),
        )
        .await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(RecorderError::ConnectionFailure(format!("{e:#}"))),
            Err(_) => {
                return Err(RecorderError::ConnectionFailure(format!(
                    "timed out after {}s",
                    self.connect_timeout.as_secs()
                )))
            }
        };

        let provisional = match self.provision_temp_file().await {
            Ok(path) => path,
            Err(e) => {
                release(connection, None, None).await;
                return Err(e);
            }
        };

        let writer = match self.encoder.spawn(&provisional) {
            Ok(writer) => writer,
            Err(e) => {
                release(connection, None, Some(&provisional)).await;
                return Err(e);
            }
        };

        let Some(stream) = connection.take_stream() else {
            release(connection, Some(writer), Some(&provisional)).await;
            return Err(RecorderError::ConnectionFailure(
                "audio connection has no stream".to_string(),
            ));
        };

        let notice_event = event.clone();
        let session = match RecordingSession::start(guild, event, connection, writer, stream) {
            Ok(session) => session,
            Err((connection, writer)) => {
                release(connection, Some(writer), Some(&provisional)).await;
                return Err(RecorderError::EncoderFault(
                    "encoder input unavailable".to_string(),
                ));
            }
        };

        let info = session.info();
        *slot = Some(session);
        drop(slot);

        info!(
            "Recording started for event {} ({}) in guild {} -> {:?}",
            info.event_name, info.event_id, guild, info.provisional_path
        );

        notify::notify_event(
            self.notifier.as_ref(),
            &notice_event,
            &notify::recording_started(&notice_event),
        )
        .await;

        Ok(info)
    }

    /// Stop the guild's recording and commit it to the recordings directory.
    ///
    /// Finalization runs in its own task that owns the guild's slot, so it
    /// completes even if the caller stops waiting for it.
    pub async fn end(&self, guild: GuildId) -> Result<FinalizeReport, RecorderError> {
        let mut slot = self.registry.lock(guild).await;
        let Some(session) = slot.take() else {
            return Err(RecorderError::NotRecording(guild));
        };

        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let finalizing = tokio::spawn(async move {
            let event = session.event().clone();
            let report = finalize(&store, session).await;
            drop(slot);

            if report.is_clean() {
                info!(
                    "Recording finished for event {} in guild {}: {:?}",
                    report.event_name, guild, report.metadata_path
                );
            } else {
                warn!(
                    "Recording for event {} in guild {} finished with faults (encoder: {:?}, persistence: {:?})",
                    report.event_name, guild, report.encoder_error, report.persistence_error
                );
            }

            notify::notify_event(
                notifier.as_ref(),
                &event,
                &notify::recording_finished(&event),
            )
            .await;

            report
        });

        finalizing.await.map_err(|e| {
            RecorderError::PersistenceFailure(format!(
                "finalizing recording for guild {guild} failed: {e}"
            ))
        })
    }

    /// Stop every live recording through the normal `end` path.
    pub async fn end_all(&self) -> Vec<(GuildId, Result<FinalizeReport, RecorderError>)> {
        let guilds = self.registry.recording_guilds().await;
        if !guilds.is_empty() {
            info!("Stopping {} active recording(s)", guilds.len());
        }

        let mut results = Vec::with_capacity(guilds.len());
        for guild in guilds {
            let result = self.end(guild).await;
            if let Err(e) = &result {
                if !e.is_noop() {
                    error!("Failed to stop recording for guild {}: {}", guild, e);
                }
            }
            results.push((guild, result));
        }
        results
    }

    async fn provision_temp_file(&self) -> Result<PathBuf, RecorderError> {
        let dir = self.temp_dir.clone();
        tokio::task::spawn_blocking(move || create_temp_file(&dir))
            .await
            .map_err(|e| {
                RecorderError::PersistenceFailure(format!("create temporary recording: {e}"))
            })?
    }
}

/// Drain the session and commit whatever it produced.
async fn finalize(store: &RecordStore, session: RecordingSession) -> FinalizeReport {
    let stopped = session.stop().await;

    let encoder_error = stopped.encoder_result.as_ref().err().map(|e| e.to_string());
    if let Some(e) = &encoder_error {
        warn!(
            "Encoder fault for guild {}: {}. Keeping whatever was written.",
            stopped.guild_id, e
        );
    }

    let record = store.derive_record(
        &stopped.event,
        &stopped.provisional_path,
        stopped.started_at,
        stopped.finished_at,
        encoder_error.clone(),
    );

    let (record, metadata_path, audio_path, persistence_error) =
        match store.commit(record, &stopped.provisional_path).await {
            Ok(outcome) => (
                Some(outcome.record),
                Some(outcome.metadata_path),
                outcome.audio_path,
                outcome.error.map(|e| e.to_string()),
            ),
            Err(e) => (None, None, None, Some(e.to_string())),
        };

    if let Some(e) = &persistence_error {
        error!("Persistence fault for guild {}: {}", stopped.guild_id, e);
    }

    if audio_path.is_none() {
        remove_temp_file(&stopped.provisional_path).await;
    }

    FinalizeReport {
        guild_id: stopped.guild_id,
        event_id: stopped.event.id,
        event_name: stopped.event.name.clone(),
        duration_seconds: (stopped.finished_at - stopped.started_at).num_seconds().max(0),
        bytes_captured: stopped.bytes_captured,
        record,
        metadata_path,
        audio_path,
        encoder_error,
        persistence_error,
    }
}

/// Create an empty `guildscribe-*.wav` in `dir` that outlives its handle.
fn create_temp_file(dir: &Path) -> Result<PathBuf, RecorderError> {
    let failure = |e: std::io::Error| {
        RecorderError::PersistenceFailure(format!("create temporary recording in {dir:?}: {e}"))
    };

    std::fs::create_dir_all(dir).map_err(failure)?;
    let file = tempfile::Builder::new()
        .prefix("guildscribe-")
        .suffix(".wav")
        .tempfile_in(dir)
        .map_err(failure)?;

    file.into_temp_path().keep().map_err(|e| failure(e.error))
}

async fn release(
    connection: Box<dyn AudioConnection>,
    writer: Option<ArtifactWriter>,
    provisional: Option<&Path>,
) {
    if let Some(writer) = writer {
        writer.abort().await;
    }
    if let Err(e) = connection.disconnect().await {
        warn!("Failed to disconnect after aborted start: {}", e);
    }
    if let Some(path) = provisional {
        remove_temp_file(path).await;
    }
}

async fn remove_temp_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed temporary recording {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temporary recording {:?}: {}", path, e),
    }
}
