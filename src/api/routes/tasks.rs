//! Portfolio and task endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
    Router,
};
use serde::Deserialize;

use super::parse_id;
use crate::api::error::ApiResult;
use crate::api::AppState;
use crate::calendar::ChannelId;
use crate::db::TaskFilter;
use crate::paging::GroupedPage;
use crate::tasks::{NewTask, Portfolio, StatusChange, Task, TaskStatus, TaskView};

#[derive(Debug, Deserialize)]
pub struct CreatePortfolioRequest {
    pub name: String,
    pub channel_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct TaskQueryParams {
    pub portfolio_id: Option<i64>,
    pub status: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/portfolios", get(list_portfolios).post(create_portfolio))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/:id", get(get_task).delete(delete_task))
        .route("/tasks/:id/status", put(update_status))
        .with_state(state)
}

async fn list_portfolios(State(state): State<AppState>) -> ApiResult<Json<Vec<Portfolio>>> {
    Ok(Json(state.tasks.portfolios()?))
}

async fn create_portfolio(
    State(state): State<AppState>,
    Json(body): Json<CreatePortfolioRequest>,
) -> ApiResult<(StatusCode, Json<Portfolio>)> {
    let channel: ChannelId = parse_id(&body.channel_id, "channel id")?;
    let portfolio = state.tasks.create_portfolio(&body.name, channel)?;
    Ok((StatusCode::CREATED, Json(portfolio)))
}

/// GET /tasks - Tasks grouped by status, optionally filtered.
async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskQueryParams>,
) -> ApiResult<Json<GroupedPage<TaskStatus, TaskView>>> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()?;
    let filter = TaskFilter {
        portfolio_id: params.portfolio_id,
        status,
    };
    Ok(Json(state.tasks.list(&filter, params.page, params.per_page)?))
}

async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = state.tasks.create_task(body).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Task>> {
    Ok(Json(state.tasks.task(id)?))
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    state.tasks.delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> ApiResult<Json<StatusChange>> {
    let status: TaskStatus = body.status.parse()?;
    Ok(Json(state.tasks.update_status(id, status).await?))
}
