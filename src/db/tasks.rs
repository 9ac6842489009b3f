//! Task persistence. Raw SQL, same pattern as the portfolio repository.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::tasks::model::DEADLINE_STORAGE;
use crate::tasks::{Priority, Task, TaskStatus};

pub struct TaskRepository;

const COLUMNS: &str =
    "id, title, description, status, priority, deadline, portfolio_id, created_at, updated_at";

fn conversion(index: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(3)?;
    let priority: String = row.get(4)?;
    let deadline: String = row.get(5)?;

    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: status.parse().map_err(|e| conversion(3, e))?,
        priority: priority.parse().map_err(|e| conversion(4, e))?,
        deadline: NaiveDateTime::parse_from_str(&deadline, DEADLINE_STORAGE)
            .map_err(|e| conversion(5, e))?,
        portfolio_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Filters for [`TaskRepository::list`].
#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub portfolio_id: Option<i64>,
    pub status: Option<TaskStatus>,
}

impl TaskRepository {
    pub fn insert(
        conn: &Connection,
        portfolio_id: i64,
        title: &str,
        description: &str,
        priority: Priority,
        deadline: NaiveDateTime,
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO tasks (title, description, status, priority, deadline, portfolio_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                title,
                description,
                TaskStatus::NotStarted.as_str(),
                priority.as_str(),
                deadline.format(DEADLINE_STORAGE).to_string(),
                portfolio_id,
            ],
        )
        .context("Failed to insert task")?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<Task>> {
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            from_row,
        )
        .optional()
        .context("Failed to query task")
    }

    /// Tasks ordered by deadline, then id.
    pub fn list(conn: &Connection, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut sql = format!("SELECT {COLUMNS} FROM tasks WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(portfolio_id) = filter.portfolio_id {
            sql.push_str(" AND portfolio_id = ?");
            params.push(Box::new(portfolio_id));
        }

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(status.as_str()));
        }

        sql.push_str(" ORDER BY deadline ASC, id ASC");

        let mut stmt = conn.prepare(&sql).context("Failed to prepare task list query")?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let tasks = stmt
            .query_map(param_refs.as_slice(), from_row)
            .context("Failed to list tasks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to map tasks")?;

        Ok(tasks)
    }

    /// Open tasks with a deadline in `[from, to)`.
    pub fn open_due_between(
        conn: &Connection,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Task>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM tasks \
                 WHERE deadline >= ?1 AND deadline < ?2 AND status NOT IN (?3, ?4) \
                 ORDER BY deadline ASC, id ASC"
            ))
            .context("Failed to prepare due task query")?;

        let tasks = stmt
            .query_map(
                params![
                    from.format(DEADLINE_STORAGE).to_string(),
                    to.format(DEADLINE_STORAGE).to_string(),
                    TaskStatus::Completed.as_str(),
                    TaskStatus::Cancelled.as_str(),
                ],
                from_row,
            )
            .context("Failed to query due tasks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to map due tasks")?;

        Ok(tasks)
    }

    /// Returns false if no task has `id`.
    pub fn update_status(conn: &Connection, id: i64, status: TaskStatus) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE tasks SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update task status")?;
        Ok(changed > 0)
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
        let deleted = conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .context("Failed to delete task")?;
        Ok(deleted > 0)
    }
}
