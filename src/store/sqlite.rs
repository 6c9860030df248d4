//! SQLite-backed state store.
//!
//! One row per session; the two aggregates are stored as JSON columns
//! updated independently. The schema is bootstrapped on open. Reads and
//! writes go through a single pool, which gives read-after-write
//! consistency within the process.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use tracing::debug;

use super::{StateStore, StoreError};
use crate::types::{BoundedPlanState, GateState};

/// Durable state store backed by SQLite.
pub struct SqliteStateStore {
    db: SqlitePool,
}

impl SqliteStateStore {
    /// Open (and if needed create) the database at `path` and ensure
    /// the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database cannot be
    /// opened or the schema cannot be created.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let db = SqlitePool::connect_with(options).await?;
        Self::bootstrap(&db).await?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for tests).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool cannot be created.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?;
        let db = SqlitePool::connect_with(options).await?;
        Self::bootstrap(&db).await?;
        Ok(Self { db })
    }

    async fn bootstrap(db: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS intake_state ( \
                 session_id TEXT PRIMARY KEY, \
                 gate_state TEXT, \
                 plan_state TEXT, \
                 updated_at TEXT NOT NULL DEFAULT (datetime('now')) \
             )",
        )
        .execute(db)
        .await?;
        Ok(())
    }

    async fn load_column(
        &self,
        session_id: &str,
        column: &'static str,
    ) -> Result<Option<String>, StoreError> {
        let query = match column {
            "gate_state" => "SELECT gate_state FROM intake_state WHERE session_id = ?1",
            _ => "SELECT plan_state FROM intake_state WHERE session_id = ?1",
        };
        let row: Option<(Option<String>,)> = sqlx::query_as(query)
            .bind(session_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.and_then(|(json,)| json))
    }

    async fn save_column(
        &self,
        session_id: &str,
        column: &'static str,
        json: &str,
    ) -> Result<(), StoreError> {
        let query = match column {
            "gate_state" => {
                "INSERT INTO intake_state (session_id, gate_state, updated_at) \
                 VALUES (?1, ?2, datetime('now')) \
                 ON CONFLICT(session_id) DO UPDATE SET \
                     gate_state = excluded.gate_state, \
                     updated_at = excluded.updated_at"
            }
            _ => {
                "INSERT INTO intake_state (session_id, plan_state, updated_at) \
                 VALUES (?1, ?2, datetime('now')) \
                 ON CONFLICT(session_id) DO UPDATE SET \
                     plan_state = excluded.plan_state, \
                     updated_at = excluded.updated_at"
            }
        };
        sqlx::query(query)
            .bind(session_id)
            .bind(json)
            .execute(&self.db)
            .await?;
        debug!(session_id, column, "session state saved");
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self, session_id: &str) -> Result<Option<GateState>, StoreError> {
        match self.load_column(session_id, "gate_state").await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session_id: &str, state: &GateState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        self.save_column(session_id, "gate_state", &json).await
    }

    async fn load_plan(&self, session_id: &str) -> Result<Option<BoundedPlanState>, StoreError> {
        match self.load_column(session_id, "plan_state").await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_plan(
        &self,
        session_id: &str,
        state: &BoundedPlanState,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        self.save_column(session_id, "plan_state", &json).await
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM intake_state WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await?;
        debug!(session_id, "session state deleted");
        Ok(())
    }
}
