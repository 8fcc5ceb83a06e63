//! Small SQLite connection pool.
//!
//! Idle connections are kept in a mutex-guarded stack and reused; when the
//! stack is empty a new connection is opened. Every statement runs on the
//! blocking thread pool via [`ConnectionPool::run`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::debug;

use crate::error::AppError;

/// Busy timeout applied to every connection, in milliseconds.
const BUSY_TIMEOUT_MS: i64 = 5000;

/// Open a SQLite connection to `db_path` and apply the pragmas every
/// connection needs.
///
/// - `journal_mode = WAL`: readers proceed alongside a writer.
/// - `busy_timeout = 5000`: concurrent writers wait instead of failing.
pub(crate) fn open_conn(db_path: &Path) -> Result<Connection, AppError> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::Store(format!("create {}: {e}", parent.display())))?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Store(format!("open {}: {e}", db_path.display())))?;

    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .map_err(|e| AppError::Store(format!("set journal_mode WAL: {e}")))?;
    conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
        .map_err(|e| AppError::Store(format!("set busy_timeout: {e}")))?;

    Ok(conn)
}

/// Process-lifetime pool shared by every store operation.
pub struct ConnectionPool {
    db_path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
}

impl ConnectionPool {
    /// Open the pool, eagerly creating one connection so an unreachable
    /// database fails at startup rather than on the first event.
    pub fn connect(db_path: impl Into<PathBuf>, max_idle: usize) -> Result<Arc<Self>, AppError> {
        let db_path = db_path.into();
        let first = open_conn(&db_path)?;
        debug!(db = %db_path.display(), max_idle, "store pool opened");
        Ok(Arc::new(Self {
            db_path,
            idle: Mutex::new(vec![first]),
            max_idle: max_idle.max(1),
        }))
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    pub async fn run<T, F>(self: &Arc<Self>, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Connection) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let conn = pool.checkout()?;
            let result = f(&conn);
            pool.checkin(conn);
            result
        })
        .await
        .map_err(|e| AppError::Store(format!("store task failed: {e}")))?
    }

    fn checkout(&self) -> Result<Connection, AppError> {
        let reused = self.idle.lock().unwrap_or_else(|e| e.into_inner()).pop();
        match reused {
            Some(conn) => Ok(conn),
            None => open_conn(&self.db_path),
        }
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }

    #[cfg(test)]
    fn idle_len(&self) -> usize {
        self.idle.lock().unwrap().len()
    }
}
