//! Manual recording control.
//!
//! Same `begin`/`end` path as the reconciliation loop; here the no-op
//! errors are reported to the caller.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::parse_id;
use crate::api::error::ApiResult;
use crate::api::AppState;
use crate::calendar::{EventId, GuildId};
use crate::recorder::{FinalizeReport, MeetingRecord, RecorderError, SessionInfo};

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    pub event_id: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/guilds/:guild_id/recording",
            post(start_recording).delete(stop_recording),
        )
        .route("/recordings", get(list_recordings))
        .route("/recordings/active", get(active_recordings))
        .with_state(state)
}

/// POST /guilds/:guild_id/recording - Start recording an event now.
async fn start_recording(
    State(state): State<AppState>,
    Path(guild_id): Path<String>,
    Json(body): Json<StartRecordingRequest>,
) -> ApiResult<Json<Value>> {
    let guild: GuildId = parse_id(&guild_id, "guild id")?;
    let event_id: EventId = parse_id(&body.event_id, "event id")?;

    info!("Manual recording start for event {} in guild {}", event_id, guild);

    let lookup = state.calendar.fetch_event(guild, event_id);
    let event = tokio::time::timeout(state.fetch_timeout, lookup)
        .await
        .map_err(|_| {
            RecorderError::Calendar(format!(
                "event lookup timed out after {}s",
                state.fetch_timeout.as_secs_f32()
            ))
        })?
        .map_err(|e| RecorderError::Calendar(format!("{e:#}")))?
        .ok_or(RecorderError::EventNotFound(event_id))?;

    let session = state.recorder.begin(guild, event).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Recording started for {}", session.event_name),
        "session": session,
    })))
}

/// DELETE /guilds/:guild_id/recording - Stop and commit the guild's recording.
async fn stop_recording(
    State(state): State<AppState>,
    Path(guild_id): Path<String>,
) -> ApiResult<Json<FinalizeReport>> {
    let guild: GuildId = parse_id(&guild_id, "guild id")?;
    info!("Manual recording stop for guild {}", guild);
    Ok(Json(state.recorder.end(guild).await?))
}

/// GET /recordings/active - Sessions currently capturing audio.
async fn active_recordings(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.recorder.active().await)
}

/// GET /recordings - Committed meeting records.
async fn list_recordings(State(state): State<AppState>) -> ApiResult<Json<Vec<MeetingRecord>>> {
    Ok(Json(state.recorder.store().list().await?))
}
