//! Deterministic executor selection: same precedence rules every time,
//! no randomness, no starvation from alternating availability.

use crate::adapters::Executor;
use crate::errors::{LoopError, Result};
use crate::model::{AdapterKind, Task};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Explicit operator intent; `Auto` defers to health-based preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterMode {
    Auto,
    Sdk,
    Cli,
    Plugin,
}

#[derive(Debug, Default)]
pub struct RouterMetrics {
    pub sdk_selected: AtomicU64,
    pub cli_selected: AtomicU64,
    pub plugin_selected: AtomicU64,
    pub fallbacks: AtomicU64,
}

pub struct ExecutorRouter {
    sdk: Option<Box<dyn Executor>>,
    cli: Option<Box<dyn Executor>>,
    plugin: Option<Box<dyn Executor>>,
    mode: RwLock<RouterMode>,
    fallback_enabled: bool,
    preferred_plugin_set: bool,
    metrics: RouterMetrics,
}

impl ExecutorRouter {
    pub fn new(sdk: Option<Box<dyn Executor>>, cli: Option<Box<dyn Executor>>, plugin: Option<Box<dyn Executor>>, mode: RouterMode, fallback_enabled: bool, preferred_plugin_set: bool) -> Self {
        Self {
            sdk,
            cli,
            plugin,
            mode: RwLock::new(mode),
            fallback_enabled,
            preferred_plugin_set,
            metrics: RouterMetrics::default(),
        }
    }

    pub fn set_mode(&self, mode: RouterMode) {
        *self.mode.write().unwrap() = mode;
    }

    fn record(&self, kind: AdapterKind) {
        match kind {
            AdapterKind::Sdk => self.metrics.sdk_selected.fetch_add(1, Ordering::Relaxed),
            AdapterKind::Cli => self.metrics.cli_selected.fetch_add(1, Ordering::Relaxed),
            AdapterKind::Plugin => self.metrics.plugin_selected.fetch_add(1, Ordering::Relaxed),
        };
    }

    async fn available(&self, kind: AdapterKind) -> bool {
        match kind {
            AdapterKind::Sdk => self.sdk.as_ref().is_some_and(|_| true),
            AdapterKind::Cli => self.cli.as_ref().is_some_and(|_| true),
            AdapterKind::Plugin => self.plugin.as_ref().is_some_and(|_| true),
        }
    }

    async fn healthy(&self, kind: AdapterKind) -> bool {
        match kind {
            AdapterKind::Sdk => match &self.sdk {
                Some(a) => a.healthy().await,
                None => false,
            },
            AdapterKind::Cli => match &self.cli {
                Some(a) => a.healthy().await,
                None => false,
            },
            AdapterKind::Plugin => match &self.plugin {
                Some(a) => a.healthy().await,
                None => false,
            },
        }
    }

    fn adapter(&self, kind: AdapterKind) -> Option<&dyn Executor> {
        match kind {
            AdapterKind::Sdk => self.sdk.as_deref(),
            AdapterKind::Cli => self.cli.as_deref(),
            AdapterKind::Plugin => self.plugin.as_deref(),
        }
    }

    /// Precedence: explicit Plugin mode with a preferred plugin set and the
    /// plugin available; else the explicit default mode if available; else
    /// in Auto prefer a healthy SDK, falling back to CLI; else, if
    /// fallback is enabled, walk Plugin → SDK → CLI for the first
    /// available adapter. `NoExecutor` if nothing matches.
    pub async fn choose(&self, _task: &Task) -> Result<&dyn Executor> {
        let mode = *self.mode.read().unwrap();

        if mode == RouterMode::Plugin && self.preferred_plugin_set && self.available(AdapterKind::Plugin).await {
            self.record(AdapterKind::Plugin);
            return self.adapter(AdapterKind::Plugin).ok_or(LoopError::NoExecutor);
        }

        if matches!(mode, RouterMode::Sdk | RouterMode::Cli) {
            let kind = if mode == RouterMode::Sdk { AdapterKind::Sdk } else { AdapterKind::Cli };
            if self.available(kind).await {
                self.record(kind);
                return self.adapter(kind).ok_or(LoopError::NoExecutor);
            }
        }

        if mode == RouterMode::Auto && self.available(AdapterKind::Sdk).await && self.healthy(AdapterKind::Sdk).await {
            self.record(AdapterKind::Sdk);
            return self.adapter(AdapterKind::Sdk).ok_or(LoopError::NoExecutor);
        }
        if mode == RouterMode::Auto && self.available(AdapterKind::Cli).await {
            self.record(AdapterKind::Cli);
            return self.adapter(AdapterKind::Cli).ok_or(LoopError::NoExecutor);
        }

        if self.fallback_enabled {
            self.metrics.fallbacks.fetch_add(1, Ordering::Relaxed);
            for kind in [AdapterKind::Plugin, AdapterKind::Sdk, AdapterKind::Cli] {
                if self.available(kind).await {
                    self.record(kind);
                    return self.adapter(kind).ok_or(LoopError::NoExecutor);
                }
            }
        }

        Err(LoopError::NoExecutor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use async_trait::async_trait;

    struct Stub {
        kind: AdapterKind,
        healthy: bool,
    }

    #[async_trait]
    impl Executor for Stub {
        async fn execute(&self, _task: &Task, prompt: &str, _on_line: &mut dyn FnMut(&str)) -> Result<String> {
            Ok(prompt.to_string())
        }
        async fn healthy(&self) -> bool {
            self.healthy
        }
        fn kind(&self) -> AdapterKind {
            self.kind
        }
    }

    fn task() -> Task {
        Task::new("t1", "p", 0, 1)
    }

    #[tokio::test]
    async fn auto_prefers_healthy_sdk() {
        let router = ExecutorRouter::new(
            Some(Box::new(Stub { kind: AdapterKind::Sdk, healthy: true })),
            Some(Box::new(Stub { kind: AdapterKind::Cli, healthy: true })),
            None,
            RouterMode::Auto,
            false,
            false,
        );
        assert_eq!(router.choose(&task()).await.unwrap().kind(), AdapterKind::Sdk);
    }

    #[tokio::test]
    async fn auto_falls_back_to_cli_when_sdk_unhealthy() {
        let router = ExecutorRouter::new(
            Some(Box::new(Stub { kind: AdapterKind::Sdk, healthy: false })),
            Some(Box::new(Stub { kind: AdapterKind::Cli, healthy: true })),
            None,
            RouterMode::Auto,
            false,
            false,
        );
        assert_eq!(router.choose(&task()).await.unwrap().kind(), AdapterKind::Cli);
    }

    #[tokio::test]
    async fn no_executor_when_nothing_available() {
        let router = ExecutorRouter::new(None, None, None, RouterMode::Auto, false, false);
        assert!(matches!(router.choose(&task()).await, Err(LoopError::NoExecutor)));
    }

    #[tokio::test]
    async fn fallback_walk_finds_cli_when_sdk_and_plugin_absent() {
        let router = ExecutorRouter::new(
            None,
            Some(Box::new(Stub { kind: AdapterKind::Cli, healthy: true })),
            None,
            RouterMode::Sdk,
            true,
            false,
        );
        assert_eq!(router.choose(&task()).await.unwrap().kind(), AdapterKind::Cli);
    }

    #[tokio::test]
    async fn explicit_plugin_mode_without_preferred_set_does_not_shortcut() {
        let router = ExecutorRouter::new(
            Some(Box::new(Stub { kind: AdapterKind::Sdk, healthy: true })),
            None,
            Some(Box::new(Stub { kind: AdapterKind::Plugin, healthy: true })),
            RouterMode::Plugin,
            true,
            false,
        );
        assert_eq!(router.choose(&task()).await.unwrap().kind(), AdapterKind::Plugin);
    }
}
