//! Executor adapters: SDK, CLI, and Plugin front-ends to the same
//! `Executor` trait, mirroring the pack's `Transport` seam — one trait,
//! several backends, none of the orchestration code above it cares which.

pub mod cli;
pub mod plugin;
pub mod sdk;

use crate::errors::Result;
use crate::model::{AdapterKind, Task};
use async_trait::async_trait;

/// One attempt at running a task through a concrete backend. Implementors
/// own their own connection/process lifecycle; `execute` may be called
/// repeatedly across retries.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs `prompt` against `task`'s context, returning raw output text.
    /// Adapter-level failures (process spawn failure, transport error) are
    /// returned as `Err`; a non-zero exit or error-shaped output is still
    /// `Ok` with the text describing the failure, since interpreting *that*
    /// is the response analyzer's job, not the executor's.
    ///
    /// `on_line` is called with every line of streamed progress the
    /// backend produces, so the orchestrator can forward it to
    /// `LoopObserver::on_stream_line` as it arrives rather than only once
    /// `execute` returns.
    async fn execute(&self, task: &Task, prompt: &str, on_line: &mut dyn FnMut(&str)) -> Result<String>;

    /// Cheap liveness check, used by the router to skip known-dead backends
    /// without paying for a full `execute`.
    async fn healthy(&self) -> bool;

    fn kind(&self) -> AdapterKind;
}

pub use cli::CliAdapter;
pub use plugin::PluginAdapter;
pub use sdk::SdkAdapter;
