//! Recovery strategies, tried in priority order by `RecoveryCoordinator`.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// A repair action attempted against the failed side state. Lower
/// `priority()` runs first.
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn priority(&self) -> u8;
    async fn attempt(&self, cancel: &CancellationToken) -> Result<(), String>;
}

/// Priority 1: up to `max_retries` calls of a caller-supplied reconnect
/// function, delay `base × attempt`.
pub struct AutoReconnect<F> {
    max_retries: u32,
    base_delay: Duration,
    reconnect: F,
}

impl<F> AutoReconnect<F>
where
    F: Fn() -> BoxFuture<'static, ()> + Send + Sync,
{
    pub fn new(max_retries: u32, base_delay: Duration, reconnect: F) -> Self {
        Self { max_retries, base_delay, reconnect }
    }
}

#[async_trait]
impl<F> RecoveryStrategy for AutoReconnect<F>
where
    F: Fn() -> BoxFuture<'static, ()> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "auto_reconnect"
    }

    fn priority(&self) -> u8 {
        1
    }

    async fn attempt(&self, cancel: &CancellationToken) -> Result<(), String> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            if cancel.is_cancelled() {
                return Err("cancelled".to_string());
            }
            match (self.reconnect)().await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = e,
            }
            tokio::time::sleep(self.base_delay * attempt).await;
        }
        Err(format!("auto_reconnect exhausted {} retries: {}", self.max_retries, last_error))
    }
}

/// Priority 2: rehydrates a named session via a caller-supplied function.
pub struct SessionRestore<F> {
    session_id: String,
    restore: F,
}

impl<F> SessionRestore<F>
where
    F: Fn(&str) -> BoxFuture<'static, ()> + Send + Sync,
{
    pub fn new(session_id: impl Into<String>, restore: F) -> Self {
        Self { session_id: session_id.into(), restore }
    }
}

#[async_trait]
impl<F> RecoveryStrategy for SessionRestore<F>
where
    F: Fn(&str) -> BoxFuture<'static, ()> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "session_restore"
    }

    fn priority(&self) -> u8 {
        2
    }

    async fn attempt(&self, cancel: &CancellationToken) -> Result<(), String> {
        if cancel.is_cancelled() {
            return Err("cancelled".to_string());
        }
        (self.restore)(&self.session_id).await
    }
}

/// Priority 3: invokes a caller-supplied fallback producer and stores its result.
pub struct Fallback<F> {
    produce: F,
    result: Mutex<Option<String>>,
}

impl<F> Fallback<F>
where
    F: Fn() -> BoxFuture<'static, String> + Send + Sync,
{
    pub fn new(produce: F) -> Self {
        Self { produce, result: Mutex::new(None) }
    }

    pub fn result(&self) -> Option<String> {
        self.result.lock().unwrap().clone()
    }
}

#[async_trait]
impl<F> RecoveryStrategy for Fallback<F>
where
    F: Fn() -> BoxFuture<'static, String> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn priority(&self) -> u8 {
        3
    }

    async fn attempt(&self, cancel: &CancellationToken) -> Result<(), String> {
        if cancel.is_cancelled() {
            return Err("cancelled".to_string());
        }
        let produced = (self.produce)().await;
        *self.result.lock().unwrap() = Some(produced);
        Ok(())
    }
}

/// Per-strategy attempt counters recorded by the coordinator.
#[derive(Debug, Default, Clone)]
pub struct RecoveryMetrics {
    pub attempts: u32,
    pub successes: u32,
}

/// Tries registered strategies in priority order, stopping on the first
/// success. Respects cancellation between strategies.
pub struct RecoveryCoordinator {
    strategies: Vec<Box<dyn RecoveryStrategy>>,
    metrics: Mutex<std::collections::HashMap<&'static str, RecoveryMetrics>>,
}

impl RecoveryCoordinator {
    pub fn new(mut strategies: Vec<Box<dyn RecoveryStrategy>>) -> Self {
        strategies.sort_by_key(|s| s.priority());
        Self { strategies, metrics: Mutex::new(std::collections::HashMap::new()) }
    }

    pub async fn recover(&self, cancel: &CancellationToken) -> Result<&'static str, String> {
        for strategy in &self.strategies {
            if cancel.is_cancelled() {
                return Err("cancelled".to_string());
            }

            let mut metrics = self.metrics.lock().unwrap();
            let entry = metrics.entry(strategy.name()).or_default();
            entry.attempts += 1;
            drop(metrics);

            match strategy.attempt(cancel).await {
                Ok(()) => {
                    let mut metrics = self.metrics.lock().unwrap();
                    metrics.entry(strategy.name()).or_default().successes += 1;
                    return Ok(strategy.name());
                }
                Err(_) => continue,
            }
        }
        Err("no recovery strategy succeeded".to_string())
    }

    pub fn metrics_for(&self, name: &'static str) -> RecoveryMetrics {
        self.metrics.lock().unwrap().get(name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn tries_strategies_in_priority_order() {
        let calls: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let calls1 = calls.clone();
        let fallback = Fallback::new(move || {
            let calls = calls1.clone();
            Box::pin(async move {
                calls.lock().unwrap().push("fallback");
                "result".to_string()
            }) as BoxFuture<'static, String>
        });

        let calls2 = calls.clone();
        let reconnect = AutoReconnect::new(1, Duration::from_millis(1), move || {
            let calls = calls2.clone();
            Box::pin(async move {
                calls.lock().unwrap().push("auto_reconnect");
                Err("still broken".to_string())
            }) as BoxFuture<'static, ()>
        });

        let coordinator = RecoveryCoordinator::new(vec![Box::new(fallback), Box::new(reconnect)]);
        let cancel = CancellationToken::new();
        let winner = coordinator.recover(&cancel).await.unwrap();

        assert_eq!(winner, "fallback");
        assert_eq!(*calls.lock().unwrap(), vec!["auto_reconnect", "fallback"]);
    }

    #[tokio::test]
    async fn stops_on_first_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let reconnect = AutoReconnect::new(3, Duration::from_millis(1), move || {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(()) }) as BoxFuture<'static, ()>
        });

        let fallback = Fallback::new(|| Box::pin(async move { "unused".to_string() }) as BoxFuture<'static, String>);

        let coordinator = RecoveryCoordinator::new(vec![Box::new(reconnect), Box::new(fallback)]);
        let cancel = CancellationToken::new();
        let winner = coordinator.recover(&cancel).await.unwrap();

        assert_eq!(winner, "auto_reconnect");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
