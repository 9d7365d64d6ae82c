//! Core data model shared across the loop engine.
//!
//! Small, serde-derived value types, the same idiom the SDK used for its
//! `AgentInput`/`AgentOutput`/`ExecutionTrace` types: plain structs with
//! `with_*` builders, `Clone` + `Debug` everywhere, `Serialize`/`Deserialize`
//! on anything that crosses a persistence or IPC boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// How complex the caller considers a task; currently advisory only —
/// adapters may use it to pick a model tier or timeout multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// One unit of work submitted to an executor. Immutable once constructed;
/// the orchestrator builds a fresh `Task` at the start of every iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub prompt: String,
    pub complexity: Complexity,
    pub iteration: u32,
    pub max_iterations: u32,
}

impl Task {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, iteration: u32, max_iterations: u32) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            complexity: Complexity::Medium,
            iteration,
            max_iterations,
        }
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }
}

/// Which adapter kind actually ran a given iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterKind {
    Sdk,
    Cli,
    Plugin,
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterKind::Sdk => write!(f, "sdk"),
            AdapterKind::Cli => write!(f, "cli"),
            AdapterKind::Plugin => write!(f, "plugin"),
        }
    }
}

/// A structured `---COPILOT_STATUS---`/`---RALPH_STATUS---` marker, when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionStatus {
    pub status: Option<String>,
    pub exit_signal: bool,
    pub tasks_done: Option<String>,
}

/// A fenced code block or key-value line extracted by the output parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParsedBlock {
    CodeBlock { language: Option<String>, content: String },
    KeyValue { key: String, value: String },
    Status(CompletionStatus),
}

/// Snapshot of the circuit breaker at the moment an iteration finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// One iteration's full record. Created at iteration start, mutated only by
/// the orchestrator, then handed to `ContextManager` and finalised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub loop_id: String,
    pub loop_index: u64,
    pub timestamp: DateTime<Utc>,
    pub user_prompt: String,
    pub wrapped_prompt: String,
    pub adapter_used: Option<AdapterKind>,
    pub raw_output: String,
    pub exit_code: Option<i32>,
    pub parsed_blocks: Vec<ParsedBlock>,
    pub completion_score: u32,
    pub should_continue: bool,
    pub exit_reason: Option<String>,
    pub circuit_state: CircuitState,
}

impl ExecutionContext {
    pub fn new(loop_id: impl Into<String>, loop_index: u64, user_prompt: impl Into<String>, wrapped_prompt: impl Into<String>) -> Self {
        Self {
            loop_id: loop_id.into(),
            loop_index,
            timestamp: Utc::now(),
            user_prompt: user_prompt.into(),
            wrapped_prompt: wrapped_prompt.into(),
            adapter_used: None,
            raw_output: String::new(),
            exit_code: None,
            parsed_blocks: Vec::new(),
            completion_score: 0,
            should_continue: true,
            exit_reason: None,
            circuit_state: CircuitState::Closed,
        }
    }
}

/// Lifecycle state of a pooled SDK session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Active,
    Idle,
    Expired,
    Destroyed,
}

/// A long-lived assistant conversation slot owned by the `SessionPool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub state: SessionState,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_used_at: now,
            state: SessionState::Active,
        }
    }

    pub fn touch(&mut self) {
        self.last_used_at = Utc::now();
        if self.state == SessionState::Idle {
            self.state = SessionState::Active;
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.last_used_at);
        age.to_std().map(|d| d > ttl).unwrap_or(false)
    }
}

/// Backoff family for [`crate::retry::RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Fixed,
}

/// Policy-level configuration for retrying one adapter call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub increment: Duration,
    pub jitter: bool,
    pub jitter_factor: f64,
    pub retryable_patterns: Vec<String>,
    pub non_retryable_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            increment: Duration::from_millis(100),
            jitter: true,
            jitter_factor: 0.1,
            retryable_patterns: Vec::new(),
            non_retryable_patterns: Vec::new(),
        }
    }
}

/// The value handed back to `LoopClient` callers for one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopResult {
    pub loop_id: String,
    pub loop_index: u64,
    pub should_continue: bool,
    pub completion_score: u32,
    pub output: String,
    pub exit_reason: Option<String>,
    pub error: Option<String>,
    pub is_success: bool,
    pub timestamp: DateTime<Utc>,
}

impl LoopResult {
    /// Invariant I2: exactly one of `is_success` / `error.is_some()` reflects the outcome.
    pub fn success(loop_id: impl Into<String>, loop_index: u64, score: u32, output: String, should_continue: bool, exit_reason: Option<String>) -> Self {
        Self {
            loop_id: loop_id.into(),
            loop_index,
            should_continue,
            completion_score: score,
            output,
            exit_reason,
            error: None,
            is_success: !should_continue,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(loop_id: impl Into<String>, loop_index: u64, error: impl Into<String>) -> Self {
        Self {
            loop_id: loop_id.into(),
            loop_index,
            should_continue: false,
            completion_score: 0,
            output: String::new(),
            exit_reason: None,
            error: Some(error.into()),
            is_success: false,
            timestamp: Utc::now(),
        }
    }
}

/// Arbitrary string tags attached to a recovery/detector event, kept loose
/// on purpose since detectors contribute different context.
pub type EventLabels = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_result_success_is_exclusive() {
        let r = LoopResult::success("l1", 0, 40, "done".into(), false, Some("promise".into()));
        assert!(r.is_success);
        assert!(r.error.is_none());
    }

    #[test]
    fn loop_result_failure_is_exclusive() {
        let r = LoopResult::failure("l1", 0, "boom");
        assert!(!r.is_success);
        assert!(r.error.is_some());
    }

    #[test]
    fn session_touch_clears_idle() {
        let mut s = Session::new("s1");
        s.state = SessionState::Idle;
        s.touch();
        assert_eq!(s.state, SessionState::Active);
    }
}
