//! Calendar listing for a guild.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

use super::parse_id;
use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::calendar::{self, CalendarEvent, EventStatus, GuildId};
use crate::paging::{self, GroupedPage};

#[derive(Debug, Deserialize, Default)]
pub struct PageParams {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/guilds/:guild_id/events", get(list_events))
        .with_state(state)
}

/// GET /guilds/:guild_id/events - Events grouped by status, one page at a time.
async fn list_events(
    State(state): State<AppState>,
    Path(guild_id): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<GroupedPage<EventStatus, CalendarEvent>>> {
    let guild: GuildId = parse_id(&guild_id, "guild id")?;

    let events = state
        .calendar
        .fetch_events(guild)
        .await
        .map_err(|e| ApiError::bad_gateway(format!("Failed to fetch events: {e:#}")))?;

    Ok(Json(paging::paginate_groups(
        calendar::group_by_status(&events),
        params.page,
        params.per_page,
    )))
}
