//! Startup migration gate.
//!
//! Migrations are embedded SQL scripts applied in order, one transaction
//! each. Progress is tracked in `PRAGMA user_version`, so re-running the gate
//! against an up-to-date database does nothing.

use std::path::Path;

use rusqlite::Connection;
use tracing::info;

use crate::error::AppError;

use super::pool::open_conn;

/// One embedded schema migration.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Value written to `user_version` once this migration has run.
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// All known migrations, strictly ascending by version.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "create_players",
    sql: include_str!("../../../migrations/0001_create_players.sql"),
}];

/// Outcome of a gate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: i64,
    pub to_version: i64,
    pub applied: Vec<&'static str>,
}

/// Bring the database at `db_path` up to the latest schema.
///
/// Fails if the database was written by a newer binary (its version is ahead
/// of [`MIGRATIONS`]) or if any migration fails; a failed migration is rolled
/// back and leaves the version untouched.
pub fn run(db_path: &Path) -> Result<MigrationReport, AppError> {
    let mut conn = open_conn(db_path).map_err(|e| AppError::Migration(e.to_string()))?;
    apply(&mut conn, MIGRATIONS)
}

/// Apply `migrations` to an open connection.
pub(crate) fn apply(conn: &mut Connection, migrations: &[Migration]) -> Result<MigrationReport, AppError> {
    let from_version = schema_version(conn)?;
    let latest = migrations.last().map(|m| m.version).unwrap_or(0);

    if from_version > latest {
        return Err(AppError::Migration(format!(
            "database schema version {from_version} is newer than this build supports ({latest})"
        )));
    }

    let mut applied = Vec::new();
    for m in migrations.iter().filter(|m| m.version > from_version) {
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Migration(format!("begin {}: {e}", m.name)))?;
        tx.execute_batch(m.sql)
            .map_err(|e| AppError::Migration(format!("{:04}_{}: {e}", m.version, m.name)))?;
        tx.pragma_update(None, "user_version", m.version)
            .map_err(|e| AppError::Migration(format!("record version {}: {e}", m.version)))?;
        tx.commit()
            .map_err(|e| AppError::Migration(format!("commit {}: {e}", m.name)))?;

        info!(version = m.version, name = m.name, "migration applied");
        applied.push(m.name);
    }

    let to_version = schema_version(conn)?;
    if applied.is_empty() {
        info!(version = to_version, "schema up to date");
    }

    Ok(MigrationReport { from_version, to_version, applied })
}

/// Current `PRAGMA user_version`.
pub(crate) fn schema_version(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| AppError::Migration(format!("read user_version: {e}")))
}
