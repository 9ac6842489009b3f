//! Durable meeting records and the two-phase artifact commit.
//!
//! Layout: `<recordings_dir>/<stem>.json` next to `<stem>.wav`.
//!
//! Commit order:
//! 1. write the record as `pending`, linked to the provisional audio path
//! 2. move the audio into the recordings directory
//! 3. rewrite the record as `finalized`, linked to the final path
//!
//! A crash between steps leaves a `pending` record that [`RecordStore::recover_pending`]
//! can repair. There is never an audio file without a record.

use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::error::RecorderError;
use crate::calendar::{CalendarEvent, EventId, GuildId};

/// Portfolio used when neither the description nor the category names one.
pub const UNSPECIFIED_PORTFOLIO: &str = "unspecified";

const AUDIO_EXTENSION: &str = "wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    /// Records written before the status field existed are complete.
    #[default]
    Finalized,
    /// Pending record whose audio is gone.
    Orphaned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub meeting_date: String,
    pub meeting_name: String,
    pub portfolio_id: String,
    pub recording_file_link: String,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub event_id: Option<EventId>,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder_error: Option<String>,
}

fn portfolio_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^portfolio_id:(.*)$").expect("portfolio pattern is valid"))
}

/// `portfolio_id:` line in the description, else the channel category, else
/// [`UNSPECIFIED_PORTFOLIO`]. Only the first `portfolio_id:` line counts.
pub fn resolve_portfolio(event: &CalendarEvent) -> String {
    let from_description = event
        .description
        .as_deref()
        .and_then(|d| portfolio_line().captures(d))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|p| !p.is_empty());

    from_description
        .or_else(|| event.category().map(|c| c.name.trim().to_string()))
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| UNSPECIFIED_PORTFOLIO.to_string())
}

/// Event start date in the display offset, `YYYY-MM-DD`.
pub fn meeting_date(event: &CalendarEvent, offset: &FixedOffset) -> String {
    event
        .start_time
        .with_timezone(offset)
        .format("%Y-%m-%d")
        .to_string()
}

pub fn meeting_name(event: &CalendarEvent, date: &str) -> String {
    format!("{}_{}", event.name, date)
}

/// Make a meeting name safe to use as a file stem.
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = stem.trim_matches('.').to_string();
    if stem.is_empty() {
        "meeting".to_string()
    } else {
        stem
    }
}

/// Where a committed recording ended up.
#[derive(Debug)]
pub struct CommitOutcome {
    pub record: MeetingRecord,
    pub metadata_path: PathBuf,
    pub audio_path: Option<PathBuf>,
    /// Set when the audio could not be relocated; the record stays `pending`.
    pub error: Option<RecorderError>,
}

impl CommitOutcome {
    pub fn relocated(&self) -> bool {
        self.audio_path.is_some()
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RecoveryReport {
    pub finalized: Vec<PathBuf>,
    pub orphaned: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// The `recordings/` directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
    offset: FixedOffset,
}

impl RecordStore {
    pub fn new(dir: PathBuf, offset: FixedOffset) -> Self {
        Self { dir, offset }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Build the record for a finished session. Not yet written anywhere.
    pub fn derive_record(
        &self,
        event: &CalendarEvent,
        provisional: &Path,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        encoder_error: Option<String>,
    ) -> MeetingRecord {
        let date = meeting_date(event, &self.offset);
        MeetingRecord {
            meeting_name: meeting_name(event, &date),
            meeting_date: date,
            portfolio_id: resolve_portfolio(event),
            recording_file_link: provisional.to_string_lossy().to_string(),
            status: RecordStatus::Pending,
            event_id: Some(event.id),
            guild_id: Some(event.guild_id),
            started_at: Some(started_at),
            finished_at: Some(finished_at),
            encoder_error,
        }
    }

    /// Run the two-phase commit for `record`, whose audio sits at `provisional`.
    ///
    /// Errs only if the pending record itself could not be written; a failed
    /// relocation is reported in the outcome.
    pub async fn commit(
        &self,
        mut record: MeetingRecord,
        provisional: &Path,
    ) -> Result<CommitOutcome, RecorderError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| persistence("create recordings directory", &self.dir, e))?;

        let stem = self.allocate_stem(&record).await;
        let metadata_path = self.dir.join(format!("{stem}.json"));
        let audio_path = self.dir.join(format!("{stem}.{AUDIO_EXTENSION}"));

        record.status = RecordStatus::Pending;
        record.recording_file_link = provisional.to_string_lossy().to_string();
        write_record(&metadata_path, &record).await?;
        debug!("Pending meeting record written: {:?}", metadata_path);

        if let Err(e) = move_file(provisional, &audio_path).await {
            warn!(
                "Failed to move {:?} to {:?}: {}",
                provisional, audio_path, e
            );
            return Ok(CommitOutcome {
                record,
                metadata_path,
                audio_path: None,
                error: Some(persistence("move recording", provisional, e)),
            });
        }

        record.status = RecordStatus::Finalized;
        record.recording_file_link = audio_path.to_string_lossy().to_string();
        let error = write_record(&metadata_path, &record).await.err();
        if error.is_none() {
            info!("Meeting record saved: {:?}", metadata_path);
        }

        Ok(CommitOutcome {
            record,
            metadata_path,
            audio_path: Some(audio_path),
            error,
        })
    }

    /// First stem whose record and audio are both free. Same-named meetings on
    /// the same day get the event id appended instead of overwriting.
    async fn allocate_stem(&self, record: &MeetingRecord) -> String {
        let base = file_stem(&record.meeting_name);
        let event_suffix = record
            .event_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| Utc::now().format("%H%M%S").to_string());

        let mut candidates = vec![base.clone(), format!("{base}_{event_suffix}")];
        candidates.extend((2..100).map(|n| format!("{base}_{event_suffix}_{n}")));

        for stem in &candidates {
            if !self.stem_taken(stem).await {
                return stem.clone();
            }
        }

        format!("{base}_{}", Utc::now().timestamp_millis())
    }

    async fn stem_taken(&self, stem: &str) -> bool {
        let json = self.dir.join(format!("{stem}.json"));
        let audio = self.dir.join(format!("{stem}.{AUDIO_EXTENSION}"));
        tokio::fs::try_exists(&json).await.unwrap_or(true)
            || tokio::fs::try_exists(&audio).await.unwrap_or(true)
    }

    /// All readable records, newest meeting first.
    pub async fn list(&self) -> Result<Vec<MeetingRecord>, RecorderError> {
        let mut records: Vec<MeetingRecord> = self
            .record_files()
            .await?
            .into_iter()
            .filter_map(|(path, record)| match record {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping unreadable meeting record {:?}: {}", path, e);
                    None
                }
            })
            .collect();

        records.sort_by(|a, b| {
            b.meeting_date
                .cmp(&a.meeting_date)
                .then_with(|| b.started_at.cmp(&a.started_at))
        });
        Ok(records)
    }

    /// Repair records left `pending` by an interrupted commit.
    pub async fn recover_pending(&self) -> Result<RecoveryReport, RecorderError> {
        let mut report = RecoveryReport::default();

        for (path, record) in self.record_files().await? {
            let Ok(mut record) = record else { continue };
            if record.status != RecordStatus::Pending {
                continue;
            }

            let final_audio = path.with_extension(AUDIO_EXTENSION);
            let provisional = PathBuf::from(&record.recording_file_link);

            let relocated = if exists(&final_audio).await {
                true
            } else if exists(&provisional).await {
                match move_file(&provisional, &final_audio).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Recovery could not move {:?}: {}", provisional, e);
                        report.failed.push(path);
                        continue;
                    }
                }
            } else {
                false
            };

            if relocated {
                record.status = RecordStatus::Finalized;
                record.recording_file_link = final_audio.to_string_lossy().to_string();
            } else {
                warn!("Meeting record {:?} has no audio left, marking orphaned", path);
                record.status = RecordStatus::Orphaned;
            }

            match write_record(&path, &record).await {
                Ok(()) if relocated => report.finalized.push(path),
                Ok(()) => report.orphaned.push(path),
                Err(e) => {
                    warn!("Recovery could not rewrite {:?}: {}", path, e);
                    report.failed.push(path);
                }
            }
        }

        if !report.finalized.is_empty() || !report.orphaned.is_empty() {
            info!(
                "Recovered {} pending meeting record(s), {} orphaned",
                report.finalized.len(),
                report.orphaned.len()
            );
        }

        Ok(report)
    }

    async fn record_files(
        &self,
    ) -> Result<Vec<(PathBuf, Result<MeetingRecord, String>)>, RecorderError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(persistence("read recordings directory", &self.dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| persistence("read recordings directory", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let record = match tokio::fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str(&content).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            files.push((path, record));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}

fn persistence(action: &str, path: &Path, err: impl std::fmt::Display) -> RecorderError {
    RecorderError::PersistenceFailure(format!("{action} {path:?}: {err}"))
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Write through a sibling temp file so readers never see half a record.
async fn write_record(path: &Path, record: &MeetingRecord) -> Result<(), RecorderError> {
    let content = serde_json::to_string_pretty(record)
        .map_err(|e| persistence("serialize meeting record", path, e))?;
    let tmp = path.with_extension("json.tmp");

    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| persistence("write meeting record", &tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| persistence("replace meeting record", path, e))
}

/// Rename, falling back to copy + delete when the temp dir is on another filesystem.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !exists(from).await {
                return Err(rename_err);
            }
            debug!("rename failed ({}), copying {:?} instead", rename_err, from);
            tokio::fs::copy(from, to).await?;
            if let Err(e) = tokio::fs::remove_file(from).await {
                warn!("Copied {:?} but could not remove it: {}", from, e);
            }
            Ok(())
        }
    }
}
