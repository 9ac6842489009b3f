use std::time::Duration;
use thiserror::Error;

use crate::calendar::{EventId, GuildId};

/// Failures of the recording pipeline.
///
/// `AlreadyRecording` and `NotRecording` are no-ops for the reconciliation
/// loop and user-facing errors for manual commands.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("event has no voice channel to record")]
    NoTargetChannel,

    #[error("guild {0} is already recording")]
    AlreadyRecording(GuildId),

    #[error("guild {0} is not recording")]
    NotRecording(GuildId),

    #[error("event {0} not found")]
    EventNotFound(EventId),

    #[error("failed to connect to voice channel: {0}")]
    ConnectionFailure(String),

    #[error("failed to start encoder: {0}")]
    EncoderSpawn(#[source] std::io::Error),

    #[error("encoder exited unsuccessfully: {0}")]
    EncoderFault(String),

    #[error("encoder did not exit within {}s", .0.as_secs())]
    EncoderTimeout(Duration),

    #[error("failed to persist recording: {0}")]
    PersistenceFailure(String),

    #[error("calendar lookup failed: {0}")]
    Calendar(String),
}

impl RecorderError {
    /// Errors that only mean "nothing to do" from the loop's point of view.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::AlreadyRecording(_) | Self::NotRecording(_))
    }
}
