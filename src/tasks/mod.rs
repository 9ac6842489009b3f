//! Portfolio task tracking.
//!
//! Creation and status changes are announced in the portfolio's channel on a
//! best-effort basis, like the recorder's notices.

pub mod model;

pub use model::{parse_deadline, NewTask, Portfolio, Priority, Task, TaskStatus};

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::calendar::ChannelId;
use crate::db::{Db, PortfolioRepository, TaskFilter, TaskRepository};
use crate::notify::Notifier;
use crate::paging::{self, GroupedPage};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("portfolio {0} not found")]
    PortfolioNotFound(i64),

    #[error("task {0} not found")]
    TaskNotFound(i64),

    #[error("invalid deadline {0:?}: expected DD/MM/YYYY HH:MM or DD/MM/YYYY")]
    InvalidDeadline(String),

    #[error("invalid status {0:?}")]
    InvalidStatus(String),

    #[error("invalid priority {0:?}: expected Low, Medium or High")]
    InvalidPriority(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// A task together with its portfolio's name, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub portfolio: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub task: Task,
    pub previous: TaskStatus,
}

/// Tasks grouped by status in [`TaskStatus::ALL`] order.
pub fn group_by_status(tasks: Vec<TaskView>) -> Vec<(TaskStatus, Vec<TaskView>)> {
    TaskStatus::ALL
        .iter()
        .map(|status| {
            let group: Vec<TaskView> = tasks
                .iter()
                .filter(|t| t.task.status == *status)
                .cloned()
                .collect();
            (*status, group)
        })
        .filter(|(_, group)| !group.is_empty())
        .collect()
}

pub fn created_notice(task: &Task, portfolio: &Portfolio) -> String {
    format!(
        "📝 New task created: **{}** (ID {})\nPriority: {} | Status: {} {} | Deadline: {} | Portfolio: {}",
        task.title,
        task.id,
        task.priority,
        task.status.emoji(),
        task.status,
        task.deadline_display(),
        portfolio.name
    )
}

pub fn status_notice(change: &StatusChange) -> String {
    format!(
        "🔄 Task updated: **{}** (ID {})\n{} {} → {} {}",
        change.task.title,
        change.task.id,
        change.previous.emoji(),
        change.previous,
        change.task.status.emoji(),
        change.task.status
    )
}

pub fn reminder_notice(task: &Task, portfolio: &Portfolio) -> String {
    format!(
        "⏰ Reminder: the task **{}** (ID {}) is due tomorrow at {}.\nPortfolio: {}",
        task.title,
        task.id,
        task.deadline_display(),
        portfolio.name
    )
}

pub struct TaskService {
    db: Db,
    notifier: Arc<dyn Notifier>,
}

impl TaskService {
    pub fn new(db: Db, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    pub fn create_portfolio(&self, name: &str, channel_id: ChannelId) -> Result<Portfolio, TaskError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TaskError::InvalidInput("portfolio name is empty".to_string()));
        }

        let portfolio = self.db.with(|conn| {
            let id = PortfolioRepository::insert(conn, name, channel_id)?;
            Ok(Portfolio {
                id,
                name: name.to_string(),
                channel_id,
            })
        })?;

        info!("Created portfolio {} ({})", portfolio.name, portfolio.id);
        Ok(portfolio)
    }

    pub fn portfolios(&self) -> Result<Vec<Portfolio>, TaskError> {
        Ok(self.db.with(PortfolioRepository::list)?)
    }

    pub async fn create_task(&self, new: NewTask) -> Result<Task, TaskError> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(TaskError::InvalidInput("task title is empty".to_string()));
        }
        let deadline = parse_deadline(&new.deadline)?;

        let (task, portfolio) = self.db.with(|conn| {
            let Some(portfolio) = PortfolioRepository::get(conn, new.portfolio_id)? else {
                return Ok(None);
            };
            let id = TaskRepository::insert(
                conn,
                portfolio.id,
                title,
                new.description.trim(),
                new.priority,
                deadline,
            )?;
            let task = TaskRepository::get(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("task {id} vanished after insert"))?;
            Ok(Some((task, portfolio)))
        })?
        .ok_or(TaskError::PortfolioNotFound(new.portfolio_id))?;

        info!("Created task {} in portfolio {}", task.id, portfolio.name);
        self.announce(portfolio.channel_id, &created_notice(&task, &portfolio))
            .await;
        Ok(task)
    }

    pub fn task(&self, id: i64) -> Result<Task, TaskError> {
        self.db
            .with(|conn| TaskRepository::get(conn, id))?
            .ok_or(TaskError::TaskNotFound(id))
    }

    pub async fn update_status(&self, id: i64, status: TaskStatus) -> Result<StatusChange, TaskError> {
        let (change, portfolio) = self
            .db
            .with(|conn| {
                let Some(previous) = TaskRepository::get(conn, id)? else {
                    return Ok(None);
                };
                TaskRepository::update_status(conn, id, status)?;
                let task = TaskRepository::get(conn, id)?
                    .ok_or_else(|| anyhow::anyhow!("task {id} vanished during update"))?;
                let portfolio = PortfolioRepository::get(conn, task.portfolio_id)?;
                Ok(Some((
                    StatusChange {
                        task,
                        previous: previous.status,
                    },
                    portfolio,
                )))
            })?
            .ok_or(TaskError::TaskNotFound(id))?;

        info!(
            "Task {} status {} -> {}",
            id, change.previous, change.task.status
        );
        if let Some(portfolio) = portfolio {
            self.announce(portfolio.channel_id, &status_notice(&change))
                .await;
        }
        Ok(change)
    }

    pub fn delete(&self, id: i64) -> Result<(), TaskError> {
        if self.db.with(|conn| TaskRepository::delete(conn, id))? {
            info!("Deleted task {}", id);
            Ok(())
        } else {
            Err(TaskError::TaskNotFound(id))
        }
    }

    /// Filtered tasks grouped by status and cut to one page.
    pub fn list(
        &self,
        filter: &TaskFilter,
        page: Option<usize>,
        per_page: Option<usize>,
    ) -> Result<GroupedPage<TaskStatus, TaskView>, TaskError> {
        let (tasks, portfolios) = self.db.with(|conn| {
            if let Some(id) = filter.portfolio_id {
                if PortfolioRepository::get(conn, id)?.is_none() {
                    return Ok(None);
                }
            }
            Ok(Some((
                TaskRepository::list(conn, filter)?,
                PortfolioRepository::list(conn)?,
            )))
        })?
        .ok_or(TaskError::PortfolioNotFound(filter.portfolio_id.unwrap_or_default()))?;

        let views = tasks
            .into_iter()
            .map(|task| TaskView {
                portfolio: portfolios
                    .iter()
                    .find(|p| p.id == task.portfolio_id)
                    .map(|p| p.name.clone()),
                task,
            })
            .collect();

        Ok(paging::paginate_groups(group_by_status(views), page, per_page))
    }

    async fn announce(&self, channel: ChannelId, content: &str) {
        if let Err(e) = self.notifier.send(channel, content).await {
            warn!("Task notice to channel {} failed: {}", channel, e);
        }
    }
}
