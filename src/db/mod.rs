//! SQLite storage for portfolios and tasks.

pub mod init;
pub mod portfolios;
pub mod tasks;

pub use init::{init_db, migrate};
pub use portfolios::PortfolioRepository;
pub use tasks::{TaskFilter, TaskRepository};

use anyhow::Result;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// Shared connection handle for the API and the reminder loop.
///
/// Statements are short; callers hold the lock only for the duration of `with`.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open_default() -> Result<Self> {
        Ok(Self::from_connection(init_db()?))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn)
    }
}
