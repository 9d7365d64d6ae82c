//! Session pool for the SDK adapter.
//!
//! Bounded map from session id to [`Session`], capacity `max_sessions`,
//! per-entry TTL — the same channel-and-semaphore shape the pack's
//! connection pool uses, adapted from pooling CLI worker *processes* to
//! pooling long-lived SDK *sessions*. Single `RwLock` guards all mutable
//! state; no cross-session locking, so no deadlock paths.

use crate::errors::{LoopError, Result};
use crate::model::{Session, SessionState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct SessionPoolConfig {
    pub max_sessions: usize,
    pub ttl: Duration,
    pub cleanup_interval: Duration,
    pub auto_cleanup: bool,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 16,
            ttl: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            auto_cleanup: false,
        }
    }
}

struct PoolState {
    sessions: HashMap<String, Session>,
}

pub struct SessionPool {
    config: SessionPoolConfig,
    state: Arc<RwLock<PoolState>>,
    stop_tx: Option<watch::Sender<bool>>,
    cleaner: Option<JoinHandle<()>>,
}

impl SessionPool {
    pub fn new(config: SessionPoolConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(PoolState { sessions: HashMap::new() })),
            stop_tx: None,
            cleaner: None,
        }
    }

    /// Spawns the background cleaner task if `auto_cleanup` is enabled.
    /// A no-op if already running.
    pub fn start_cleaner(&mut self) {
        if !self.config.auto_cleanup || self.cleaner.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let state = Arc::clone(&self.state);
        let interval = self.config.cleanup_interval;
        let ttl = self.config.ttl;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let mut state = state.write().await;
                        state.sessions.retain(|_, s| !s.is_expired(ttl));
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        self.stop_tx = Some(stop_tx);
        self.cleaner = Some(handle);
    }

    /// Creates a new session. Fails with `PoolFull` at capacity, `NotFound`-style
    /// duplicate rejection if `id` already exists.
    pub async fn create(&self, id: impl Into<String>) -> Result<Session> {
        let id = id.into();
        let mut state = self.state.write().await;

        if state.sessions.contains_key(&id) {
            return Err(LoopError::ConfigError(format!("duplicate session id: {id}")));
        }
        if state.sessions.len() >= self.config.max_sessions {
            return Err(LoopError::PoolFull { capacity: self.config.max_sessions });
        }

        let session = Session::new(id.clone());
        state.sessions.insert(id, session.clone());
        Ok(session)
    }

    /// Returns the session, refreshing `last_used_at`. Never returns a
    /// session a concurrent `remove` has already destroyed.
    pub async fn get(&self, id: &str) -> Result<Session> {
        let mut state = self.state.write().await;
        let session = state.sessions.get_mut(id).ok_or_else(|| LoopError::NotFound(id.to_string()))?;
        if session.is_expired(self.config.ttl) {
            session.state = SessionState::Expired;
            return Err(LoopError::NotFound(id.to_string()));
        }
        session.touch();
        Ok(session.clone())
    }

    /// Destroys a session outright.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        match state.sessions.remove(id) {
            Some(_) => Ok(()),
            None => Err(LoopError::NotFound(id.to_string())),
        }
    }

    /// Scans and removes every entry past its TTL; returns the count removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut state = self.state.write().await;
        let ttl = self.config.ttl;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired(ttl));
        before - state.sessions.len()
    }

    /// Destroys every session, best-effort; this implementation cannot fail
    /// per-session, so it always succeeds, matching the "collect errors and
    /// return the joined error" contract with an empty error set.
    pub async fn clear_all(&self) {
        let mut state = self.state.write().await;
        state.sessions.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stops the cleaner (closing its stop channel) before returning, so a
    /// caller awaiting shutdown never races a cleaner iteration still
    /// holding the pool lock.
    pub async fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(handle) = self.cleaner.take() {
            let _ = handle.await;
        }
        self.clear_all().await;
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new(SessionPoolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let pool = SessionPool::default();
        pool.create("s1").await.unwrap();
        let session = pool.get("s1").await.unwrap();
        assert_eq!(session.id, "s1");
    }

    #[tokio::test]
    async fn create_rejects_duplicate() {
        let pool = SessionPool::default();
        pool.create("s1").await.unwrap();
        let err = pool.create("s1").await.unwrap_err();
        assert!(matches!(err, LoopError::ConfigError(_)));
    }

    #[tokio::test]
    async fn create_rejects_over_capacity() {
        let pool = SessionPool::new(SessionPoolConfig { max_sessions: 1, ..Default::default() });
        pool.create("s1").await.unwrap();
        let err = pool.create("s2").await.unwrap_err();
        assert!(matches!(err, LoopError::PoolFull { capacity: 1 }));
    }

    #[tokio::test]
    async fn remove_then_get_returns_not_found() {
        let pool = SessionPool::default();
        pool.create("s1").await.unwrap();
        pool.remove("s1").await.unwrap();
        assert!(matches!(pool.get("s1").await, Err(LoopError::NotFound(_))));
    }

    #[tokio::test]
    async fn expired_session_is_not_returned() {
        let pool = SessionPool::new(SessionPoolConfig { ttl: Duration::from_millis(1), ..Default::default() });
        pool.create("s1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(pool.get("s1").await, Err(LoopError::NotFound(_))));
    }

    #[tokio::test]
    async fn cleanup_expired_reports_count() {
        let pool = SessionPool::new(SessionPoolConfig { ttl: Duration::from_millis(1), ..Default::default() });
        pool.create("s1").await.unwrap();
        pool.create("s2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.cleanup_expired().await, 2);
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn clear_all_empties_pool() {
        let pool = SessionPool::default();
        pool.create("s1").await.unwrap();
        pool.create("s2").await.unwrap();
        pool.clear_all().await;
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn shutdown_stops_cleaner_before_returning() {
        let mut pool = SessionPool::new(SessionPoolConfig {
            auto_cleanup: true,
            cleanup_interval: Duration::from_millis(10),
            ..Default::default()
        });
        pool.start_cleaner();
        pool.create("s1").await.unwrap();
        pool.shutdown().await;
        assert!(pool.is_empty().await);
    }
}
