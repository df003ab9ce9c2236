//! Session persistence layer
//!
//! Stores conversation sessions by key. In-memory for development; the trait
//! is the seam for a shared store.

use crate::models::{Session, SessionSummary};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

/// Trait for session persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Session>>;
    async fn save(&self, session: &Session) -> Result<()>;
    /// `true` when a session was removed
    async fn delete(&self, key: &str) -> Result<bool>;
    /// Summaries, most recently updated first
    async fn list(&self) -> Result<Vec<SessionSummary>>;
}

/// In-memory session store for development
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(key).cloned())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.key.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(key).is_some())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().await;

        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .map(|session| SessionSummary {
                session_key: session.key.clone(),
                message_count: session.history.len(),
                updated_at: session.updated_at,
            })
            .collect();

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

/// Idle lock entries are pruned once the map grows past this
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per session key. Holding the guard serializes a session's
/// load, exchange and save; different keys proceed concurrently.
#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;

            if locks.len() > LOCK_PRUNE_THRESHOLD {
                let before = locks.len();
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                debug!(pruned = before - locks.len(), "Pruned idle session locks");
            }

            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Turn;
    use std::time::Duration;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = InMemorySessionStore::new();
        let mut session = Session::new("s1");
        session
            .history
            .append_exchange(Turn::user("hi"), Turn::assistant("hello"));

        tokio_test::assert_ok!(store.save(&session).await);

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded, session);

        let summaries = store.list().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].message_count, 2);

        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
        assert!(store.load("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = SessionLocks::new();
        let guard = locks.acquire("s1").await;

        let other = locks.clone();
        let blocked = tokio::spawn(async move {
            let _guard = other.acquire("s1").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = SessionLocks::new();
        let _a = locks.acquire("a").await;

        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
    }
}
