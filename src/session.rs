//! Process-local store of the latest code snapshot per (session, problem).
//!
//! Written as a background side effect of every execution request and read
//! by the chat flows to give the tutor the learner's current code. Writes
//! are last-writer-wins; a chat racing with an execution may observe either
//! snapshot, which is acceptable.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// A stored code snapshot with its capture time.
#[derive(Debug, Clone)]
pub struct CodeSnapshot {
    pub code: String,
    pub stored_at: DateTime<Utc>,
}

/// Shared map from `(session_id, problem_id)` to the latest snapshot.
///
/// Unbounded by design: sessions are short-lived and the process restarts
/// with the deployment.
#[derive(Debug, Default)]
pub struct SessionCodeStore {
    entries: RwLock<HashMap<(String, String), CodeSnapshot>>,
}

impl SessionCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest code for a session/problem pair.
    pub async fn store(&self, session_id: &str, problem_id: &str, code: &str) {
        let snapshot = CodeSnapshot {
            code: code.to_string(),
            stored_at: Utc::now(),
        };
        let mut entries = self.entries.write().await;
        entries.insert((session_id.to_string(), problem_id.to_string()), snapshot);
    }

    /// Fetch the latest code for a session/problem pair.
    pub async fn get(&self, session_id: &str, problem_id: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(&(session_id.to_string(), problem_id.to_string()))
            .map(|snapshot| snapshot.code.clone())
    }

    /// Number of stored snapshots (for diagnostics).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_and_get_round_trip() {
        let store = SessionCodeStore::new();
        assert!(store.is_empty().await);

        store.store("s1", "p1", "print('a')").await;
        assert_eq!(store.get("s1", "p1").await.as_deref(), Some("print('a')"));
        assert_eq!(store.get("s1", "p2").await, None);
        assert_eq!(store.get("s2", "p1").await, None);
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let store = SessionCodeStore::new();
        store.store("s1", "p1", "v1").await;
        store.store("s1", "p1", "v2").await;
        assert_eq!(store.get("s1", "p1").await.as_deref(), Some("v2"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn keys_are_composite() {
        let store = SessionCodeStore::new();
        store.store("s1", "p1", "a").await;
        store.store("s1", "p2", "b").await;
        store.store("s2", "p1", "c").await;
        assert_eq!(store.len().await, 3);
        assert_eq!(store.get("s1", "p2").await.as_deref(), Some("b"));
    }
}
