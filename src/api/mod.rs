//! REST API server for guildscribe.
//!
//! Provides HTTP endpoints for:
//! - Health and version
//! - Guild calendar listings
//! - Manual recording start/stop and recording listings
//! - Portfolios and tasks

pub mod error;
pub mod routes;

use crate::calendar::CalendarSource;
use crate::config::ApiConfig;
use crate::recorder::EventRecorder;
use crate::tasks::TaskService;
use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;

/// Shared handles for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub recorder: Arc<EventRecorder>,
    pub calendar: Arc<dyn CalendarSource>,
    pub tasks: Arc<TaskService>,
    /// Bound on calendar lookups made by request handlers.
    pub fetch_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::events::router(state.clone()))
        .merge(routes::recording::router(state.clone()))
        .merge(routes::tasks::router(state))
        .layer(ServiceBuilder::new())
}

/// Serve on an already-bound listener until `shutdown` fires.
pub async fn serve(listener: TcpListener, state: AppState, shutdown: CancellationToken) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server failed")
}

pub struct ApiServer {
    host: String,
    port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState, config: &ApiConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            state,
        }
    }

    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server to {addr}"))?;

        info!("API server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET    /                              - Service info");
        info!("  GET    /health                        - Health check");
        info!("  GET    /guilds/:guild_id/events       - List scheduled events");
        info!("  POST   /guilds/:guild_id/recording    - Start recording an event");
        info!("  DELETE /guilds/:guild_id/recording    - Stop recording");
        info!("  GET    /recordings                    - List meeting records");
        info!("  GET    /recordings/active             - List live recordings");
        info!("  GET    /portfolios, POST /portfolios  - Portfolios");
        info!("  GET    /tasks, POST /tasks            - Tasks");
        info!("  GET    /tasks/:id, DELETE /tasks/:id  - Single task");
        info!("  PUT    /tasks/:id/status              - Update task status");

        serve(listener, self.state, shutdown).await
    }
}
