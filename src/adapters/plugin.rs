//! Plugin adapter: interface is fully specified, loader format is not
//! (Open Question #2, resolved in `DESIGN.md` — dynamic loading is an
//! out-of-scope collaborator per `spec.md` §1). This stub satisfies the
//! `Executor` contract so the router can still select and reject a
//! plugin deterministically; a real loader plugs in behind `PluginHandle`.

use crate::errors::{LoopError, Result};
use crate::model::{AdapterKind, Task};
use async_trait::async_trait;

/// Opaque handle a real loader would populate; left empty here since the
/// loading mechanism is explicitly out of scope.
pub struct PluginHandle {
    pub name: String,
}

pub struct PluginAdapter {
    loaded: Option<PluginHandle>,
}

impl PluginAdapter {
    /// No plugin loaded. `healthy()` returns false and `execute` returns
    /// `NoExecutor`, so the router's fallback walk moves on immediately.
    pub fn unloaded() -> Self {
        Self { loaded: None }
    }

    pub fn with_handle(handle: PluginHandle) -> Self {
        Self { loaded: Some(handle) }
    }

    pub fn preferred_name(&self) -> Option<&str> {
        self.loaded.as_ref().map(|h| h.name.as_str())
    }
}

impl Default for PluginAdapter {
    fn default() -> Self {
        Self::unloaded()
    }
}

#[async_trait]
impl super::Executor for PluginAdapter {
    async fn execute(&self, _task: &Task, _prompt: &str, _on_line: &mut dyn FnMut(&str)) -> Result<String> {
        match &self.loaded {
            Some(handle) => Err(LoopError::ConfigError(format!("plugin '{}' loader not implemented", handle.name))),
            None => Err(LoopError::NoExecutor),
        }
    }

    async fn healthy(&self) -> bool {
        self.loaded.is_some()
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Plugin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Executor;

    #[tokio::test]
    async fn unloaded_plugin_is_unhealthy_and_errors() {
        let adapter = PluginAdapter::unloaded();
        assert!(!adapter.healthy().await);
        let task = Task::new("t1", "p", 0, 1);
        assert!(matches!(adapter.execute(&task, "p", &mut |_| {}).await, Err(LoopError::NoExecutor)));
    }

    #[tokio::test]
    async fn loaded_plugin_reports_healthy() {
        let adapter = PluginAdapter::with_handle(PluginHandle { name: "demo".to_string() });
        assert!(adapter.healthy().await);
        assert_eq!(adapter.preferred_name(), Some("demo"));
    }
}
