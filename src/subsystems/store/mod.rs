//! Store gateway: persisted player scores.
//!
//! [`ScoreStore`] is the only component that talks SQL. Each operation is a
//! single statement, so no transaction spans more than one call; the engine's
//! per-row atomic `UPDATE` is what keeps concurrent score changes from losing
//! writes.

pub mod migrations;
mod pool;
mod types;

pub use pool::ConnectionPool;
pub use types::{ChatScope, Player, ScoreDelta};

use std::path::Path;
use std::sync::Arc;

use rusqlite::params;
use tracing::debug;

use crate::error::AppError;

/// Idle connections kept by the pool.
const POOL_MAX_IDLE: usize = 4;

/// Gateway over the `players` table.
///
/// Cheap to share behind `Arc`; the connection pool is safe for concurrent use.
pub struct ScoreStore {
    pool: Arc<ConnectionPool>,
}

impl ScoreStore {
    /// Open the pool for an already-migrated database.
    pub fn connect(db_path: &Path) -> Result<Self, AppError> {
        Ok(Self { pool: ConnectionPool::connect(db_path, POOL_MAX_IDLE)? })
    }

    /// Register `name` in `chat`. Registering an existing name is a no-op.
    ///
    /// Returns `true` when a new row was created.
    pub async fn add_player(&self, chat: ChatScope, name: &str) -> Result<bool, AppError> {
        let name = name.to_string();
        self.pool
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO players (chat_id, name) VALUES (?1, ?2)
                     ON CONFLICT (chat_id, name) DO NOTHING",
                    params![chat.0, name],
                )
                .map(|n| n > 0)
                .map_err(|e| AppError::Store(format!("add player: {e}")))
            })
            .await
    }

    /// Move `name`'s score in `chat` by one step. An unknown name is a no-op.
    ///
    /// Returns `true` when a row was updated.
    pub async fn adjust_score(&self, chat: ChatScope, name: &str, delta: ScoreDelta) -> Result<bool, AppError> {
        let name = name.to_string();
        let changed = self
            .pool
            .run(move |conn| {
                conn.execute(
                    "UPDATE players SET score = score + ?3 WHERE chat_id = ?1 AND name = ?2",
                    params![chat.0, name, delta.value()],
                )
                .map_err(|e| AppError::Store(format!("adjust score: {e}")))
            })
            .await?;
        if changed == 0 {
            debug!(%chat, ?delta, "score adjustment matched no player");
        }
        Ok(changed > 0)
    }

    /// All players in `chat`, highest score first. Equal scores keep
    /// registration order.
    pub async fn list_players(&self, chat: ChatScope) -> Result<Vec<Player>, AppError> {
        self.pool
            .run(move |conn| {
                let mut stmt = conn
                    .prepare_cached(
                        "SELECT name, score FROM players
                         WHERE chat_id = ?1
                         ORDER BY score DESC, id ASC",
                    )
                    .map_err(|e| AppError::Store(format!("list players: {e}")))?;
                let rows = stmt
                    .query_map(params![chat.0], |row| Ok(Player { name: row.get(0)?, score: row.get(1)? }))
                    .map_err(|e| AppError::Store(format!("list players: {e}")))?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(|e| AppError::Store(format!("list players row: {e}")))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CHAT: ChatScope = ChatScope(42);

    fn store() -> (TempDir, ScoreStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scores.db");
        migrations::run(&path).unwrap();
        let store = ScoreStore::connect(&path).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let (_dir, store) = store();
        assert!(store.add_player(CHAT, "Ann").await.unwrap());
        assert!(!store.add_player(CHAT, "Ann").await.unwrap());
        assert_eq!(store.list_players(CHAT).await.unwrap(), vec![Player::new("Ann", 0)]);
    }

    #[tokio::test]
    async fn increment_then_decrement_restores_score() {
        let (_dir, store) = store();
        store.add_player(CHAT, "Ann").await.unwrap();
        store.adjust_score(CHAT, "Ann", ScoreDelta::Increment).await.unwrap();
        store.adjust_score(CHAT, "Ann", ScoreDelta::Increment).await.unwrap();
        let before = store.list_players(CHAT).await.unwrap();

        assert!(store.adjust_score(CHAT, "Ann", ScoreDelta::Increment).await.unwrap());
        assert!(store.adjust_score(CHAT, "Ann", ScoreDelta::Decrement).await.unwrap());
        assert_eq!(store.list_players(CHAT).await.unwrap(), before);
    }

    #[tokio::test]
    async fn adjust_unknown_player_is_noop() {
        let (_dir, store) = store();
        assert!(!store.adjust_score(CHAT, "Ghost", ScoreDelta::Increment).await.unwrap());
        assert!(store.list_players(CHAT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scores_may_go_negative() {
        let (_dir, store) = store();
        store.add_player(CHAT, "Ann").await.unwrap();
        store.adjust_score(CHAT, "Ann", ScoreDelta::Decrement).await.unwrap();
        assert_eq!(store.list_players(CHAT).await.unwrap(), vec![Player::new("Ann", -1)]);
    }

    #[tokio::test]
    async fn list_orders_by_score_then_registration() {
        let (_dir, store) = store();
        for name in ["Ann", "Bob", "Cid"] {
            store.add_player(CHAT, name).await.unwrap();
        }
        store.adjust_score(CHAT, "Cid", ScoreDelta::Increment).await.unwrap();

        let names: Vec<_> = store.list_players(CHAT).await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["Cid", "Ann", "Bob"]);

        // Stable across repeated reads.
        let again: Vec<_> = store.list_players(CHAT).await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, again);
    }

    #[tokio::test]
    async fn chats_are_isolated() {
        let (_dir, store) = store();
        store.add_player(ChatScope(1), "Ann").await.unwrap();
        store.add_player(ChatScope(2), "Ann").await.unwrap();
        store.adjust_score(ChatScope(1), "Ann", ScoreDelta::Increment).await.unwrap();

        assert_eq!(store.list_players(ChatScope(1)).await.unwrap(), vec![Player::new("Ann", 1)]);
        assert_eq!(store.list_players(ChatScope(2)).await.unwrap(), vec![Player::new("Ann", 0)]);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        store.add_player(CHAT, "Ann").await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.adjust_score(CHAT, "Ann", ScoreDelta::Increment).await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert_eq!(store.list_players(CHAT).await.unwrap(), vec![Player::new("Ann", 20)]);
    }

    #[tokio::test]
    async fn unmigrated_database_surfaces_store_error() {
        let dir = TempDir::new().unwrap();
        let store = ScoreStore::connect(&dir.path().join("empty.db")).unwrap();
        let err = store.list_players(CHAT).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }
}
