//! Session state persistence.
//!
//! The [`StateStore`] contract is narrow: load and save the two
//! session-owned aggregates, read-after-write consistent for a single
//! session within one process. Two implementations:
//! - [`InMemoryStateStore`] for tests and ephemeral use
//! - [`sqlite::SqliteStateStore`] for durable state

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{BoundedPlanState, GateState};

pub mod sqlite;

/// State store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("state store database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A persisted row could not be decoded.
    #[error("state store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persists per-session dialogue and plan state.
///
/// Implementations must be read-after-write consistent for a single
/// session within one process.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the gate state for a session, if any.
    async fn load(&self, session_id: &str) -> Result<Option<GateState>, StoreError>;

    /// Save the gate state for a session.
    async fn save(&self, session_id: &str, state: &GateState) -> Result<(), StoreError>;

    /// Load the bounded plan state for a session, if any.
    async fn load_plan(&self, session_id: &str) -> Result<Option<BoundedPlanState>, StoreError>;

    /// Save the bounded plan state for a session.
    async fn save_plan(&self, session_id: &str, state: &BoundedPlanState)
        -> Result<(), StoreError>;

    /// Delete all state for a session.
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
struct SessionRow {
    gate: Option<GateState>,
    plan: Option<BoundedPlanState>,
}

/// In-memory state store keyed by session id.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    rows: RwLock<HashMap<String, SessionRow>>,
}

impl InMemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, session_id: &str) -> Result<Option<GateState>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .get(session_id)
            .and_then(|r| r.gate.clone()))
    }

    async fn save(&self, session_id: &str, state: &GateState) -> Result<(), StoreError> {
        self.rows
            .write()
            .await
            .entry(session_id.to_owned())
            .or_default()
            .gate = Some(state.clone());
        Ok(())
    }

    async fn load_plan(&self, session_id: &str) -> Result<Option<BoundedPlanState>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .get(session_id)
            .and_then(|r| r.plan.clone()))
    }

    async fn save_plan(
        &self,
        session_id: &str,
        state: &BoundedPlanState,
    ) -> Result<(), StoreError> {
        self.rows
            .write()
            .await
            .entry(session_id.to_owned())
            .or_default()
            .plan = Some(state.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.rows.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DialoguePhase, GateValue};

    fn sample_state() -> GateState {
        let mut state = GateState::default();
        state.values.insert(
            "availability".to_owned(),
            GateValue {
                raw: Some("Yes".to_owned()),
                classified: Some("Yes".to_owned()),
                confidence: 1.0,
            },
        );
        state.phase = DialoguePhase::Gathering;
        state
    }

    #[tokio::test]
    async fn load_missing_session_returns_none() {
        let store = InMemoryStateStore::new();
        assert!(store.load("s1").await.expect("should load").is_none());
        assert!(store.load_plan("s1").await.expect("should load").is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let store = InMemoryStateStore::new();
        let state = sample_state();
        store.save("s1", &state).await.expect("should save");

        let loaded = store
            .load("s1")
            .await
            .expect("should load")
            .expect("should exist");
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = InMemoryStateStore::new();
        store.save("a", &sample_state()).await.expect("should save");

        assert!(store.load("b").await.expect("should load").is_none());
    }

    #[tokio::test]
    async fn delete_removes_both_aggregates() {
        let store = InMemoryStateStore::new();
        store.save("s1", &sample_state()).await.expect("should save");
        store
            .save_plan("s1", &BoundedPlanState::default())
            .await
            .expect("should save");

        store.delete("s1").await.expect("should delete");
        assert!(store.load("s1").await.expect("should load").is_none());
        assert!(store.load_plan("s1").await.expect("should load").is_none());
    }
}
