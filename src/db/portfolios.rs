//! Portfolio persistence.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::calendar::ChannelId;
use crate::tasks::Portfolio;

pub struct PortfolioRepository;

fn from_row(row: &Row<'_>) -> rusqlite::Result<Portfolio> {
    let channel: String = row.get(2)?;
    let channel_id = channel.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Portfolio {
        id: row.get(0)?,
        name: row.get(1)?,
        channel_id,
    })
}

impl PortfolioRepository {
    pub fn insert(conn: &Connection, name: &str, channel_id: ChannelId) -> Result<i64> {
        conn.execute(
            "INSERT INTO portfolios (name, channel_id) VALUES (?1, ?2)",
            params![name, channel_id.to_string()],
        )
        .context("Failed to insert portfolio")?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<Portfolio>> {
        conn.query_row(
            "SELECT id, name, channel_id FROM portfolios WHERE id = ?1",
            params![id],
            from_row,
        )
        .optional()
        .context("Failed to query portfolio")
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Portfolio>> {
        conn.query_row(
            "SELECT id, name, channel_id FROM portfolios WHERE name = ?1 COLLATE NOCASE",
            params![name],
            from_row,
        )
        .optional()
        .context("Failed to query portfolio by name")
    }

    pub fn list(conn: &Connection) -> Result<Vec<Portfolio>> {
        let mut stmt = conn
            .prepare("SELECT id, name, channel_id FROM portfolios ORDER BY name")
            .context("Failed to prepare portfolio list query")?;

        let portfolios = stmt
            .query_map([], from_row)
            .context("Failed to list portfolios")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to map portfolios")?;

        Ok(portfolios)
    }
}
