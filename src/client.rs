//! `LoopClient`: the orchestrator gluing every other component into the
//! per-iteration algorithm.

use crate::analyzer::ResponseAnalyzer;
use crate::circuit::CircuitBreaker;
use crate::context::ContextManager;
use crate::errors::{LoopError, Result};
use crate::exit_detector::ExitDetector;
use crate::fingerprint::fingerprint;
use crate::model::{AdapterKind, CircuitState, ExecutionContext, LoopResult, Task};
use crate::parser::OutputParser;
use crate::persistence::PersistenceManager;
use crate::prompt::{wrap_prompt, PromiseDetector, DEFAULT_PROMISE_PHRASE};
use crate::recovery::RecoveryCoordinator;
use crate::retry::RetryExecutor;
use crate::router::ExecutorRouter;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Callbacks the caller may register to observe loop lifecycle events.
/// Mirrors the upstream `OnLoopStart/OnLoopComplete/...` UI surface
/// (§6); purely advisory, never changes control flow.
pub trait LoopObserver: Send + Sync {
    fn on_loop_start(&self, _loop_index: u64) {}
    fn on_stream_line(&self, _line: &str) {}
    fn on_loop_complete(&self, _result: &LoopResult) {}
    fn on_error(&self, _message: &str) {}
}

struct NoopObserver;
impl LoopObserver for NoopObserver {}

pub struct LoopClient {
    loop_id: String,
    router: ExecutorRouter,
    retry: RetryExecutor,
    breaker: CircuitBreaker,
    context: ContextManager,
    persistence: Option<PersistenceManager>,
    promise: PromiseDetector,
    analyzer: ResponseAnalyzer,
    exit_detector: ExitDetector,
    recovery: RecoveryCoordinator,
    observer: Box<dyn LoopObserver>,
    loop_index: AtomicU64,
    closed: AtomicBool,
    cancel: CancellationToken,
    consecutive_test_only: Mutex<u32>,
    /// Total iteration budget for the `[Iteration k/N]` banner; set by
    /// `execute_until_completion`, defaulting to "unknown" for callers that
    /// drive `execute_loop` directly.
    max_iterations: AtomicU64,
}

impl LoopClient {
    pub fn new(router: ExecutorRouter, retry: RetryExecutor, breaker: CircuitBreaker, context: ContextManager, persistence: Option<PersistenceManager>) -> Self {
        Self {
            loop_id: Uuid::new_v4().to_string(),
            router,
            retry,
            breaker,
            context,
            persistence,
            promise: PromiseDetector::default(),
            analyzer: ResponseAnalyzer::default(),
            exit_detector: ExitDetector::default(),
            recovery: RecoveryCoordinator::new(Vec::new()),
            observer: Box::new(NoopObserver),
            loop_index: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            consecutive_test_only: Mutex::new(0),
            max_iterations: AtomicU64::new(u32::MAX as u64),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn LoopObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replaces the default (strategy-less) recovery coordinator. Strategies
    /// are caller-supplied because repairing side state is backend-specific
    /// (reconnecting an SDK session vs. nothing to repair for a one-shot CLI
    /// call) — this crate doesn't assume which adapter is wired in.
    pub fn with_recovery(mut self, recovery: RecoveryCoordinator) -> Self {
        self.recovery = recovery;
        self
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LoopError::ClientClosed);
        }
        Ok(())
    }

    /// Step 1-8 of the per-iteration algorithm.
    pub async fn execute_loop(&self, user_prompt: &str) -> Result<LoopResult> {
        self.ensure_open()?;

        if self.breaker.is_open() {
            return Err(LoopError::CircuitOpen { executor: "router".to_string(), retry_after: std::time::Duration::from_secs(60) });
        }

        let loop_index = self.loop_index.fetch_add(1, Ordering::SeqCst);
        self.observer.on_loop_start(loop_index);

        let max_iterations = self.max_iterations.load(Ordering::SeqCst) as u32;
        let wrapped = wrap_prompt(user_prompt, loop_index as u32 + 1, max_iterations, DEFAULT_PROMISE_PHRASE);
        self.promise.reset();

        let ctx = self.context.start_loop(loop_index, user_prompt, &wrapped, &self.loop_id);
        let task = Task::new(format!("{}-{}", self.loop_id, loop_index), wrapped.clone(), loop_index as u32, max_iterations);

        let executor = match self.router.choose(&task).await {
            Ok(executor) => executor,
            Err(e) => {
                self.context.update_current_loop(|c| c.exit_reason = Some(e.to_string()));
                self.context.finish_loop();
                return Err(e);
            }
        };

        let cancel = self.cancel.clone();
        let wrapped_for_attempt = wrapped.clone();
        let outcome = self
            .retry
            .execute(&cancel, |_attempt| {
                let wrapped = wrapped_for_attempt.clone();
                async move {
                    let mut on_line = |line: &str| self.observer.on_stream_line(line);
                    executor.execute(&task, &wrapped, &mut on_line).await.map_err(|e| e.to_string())
                }
            })
            .await;

        let adapter_kind = executor.kind();

        match outcome.value {
            Some(output) => self.on_adapter_success(loop_index, &ctx.loop_id, output, adapter_kind).await,
            None => {
                let message = outcome.error.unwrap_or_else(|| "unknown execution failure".to_string());
                self.breaker.record_same_error(&fingerprint(&message));

                // Runs outside the retry decision: it never changes whether a
                // retry happens, only what state the next attempt sees.
                match self.recovery.recover(&cancel).await {
                    Ok(strategy) => tracing::info!(strategy, "recovery strategy succeeded after adapter failure"),
                    Err(e) => tracing::debug!(error = %e, "no recovery strategy succeeded after adapter failure"),
                }

                self.context.update_current_loop(|c| {
                    c.exit_reason = Some(message.clone());
                    c.should_continue = false;
                    c.circuit_state = self.breaker.state();
                });
                let finished = self.context.finish_loop();
                self.snapshot_best_effort(finished.as_ref()).await;
                Err(LoopError::ExecutionError { message, exit_code: None, stderr: None })
            }
        }
    }

    async fn on_adapter_success(&self, loop_index: u64, loop_id_for_result: &str, output: String, adapter_kind: AdapterKind) -> Result<LoopResult> {
        let blocks = OutputParser::parse(&output);
        let status = OutputParser::parse_status_block(&output);
        let promise_detected = self.promise.check_full(&output);
        let completion = self.analyzer.analyze_completion(&output, status.as_ref());
        let stuck = self.analyzer.analyze_stuck(&output).is_stuck;
        let test_only = self.analyzer.is_test_only_loop(&output);

        {
            let mut streak = self.consecutive_test_only.lock().unwrap();
            if test_only {
                *streak += 1;
            } else {
                *streak = 0;
            }
        }

        let structured_exit = status.as_ref().map(|s| s.exit_signal).unwrap_or(false);
        let is_completed = promise_detected || completion.is_completed;

        if structured_exit {
            self.exit_detector.record_done();
        }
        self.exit_detector.record_test_only_loop(test_only);
        let graceful_exit = self.exit_detector.should_exit_gracefully(completion.score);

        if is_completed || graceful_exit {
            self.breaker.record_success();
        } else if output.trim().is_empty() || stuck {
            self.breaker.record_no_progress();
        } else {
            self.breaker.record_success();
        }

        let should_continue = !(is_completed || graceful_exit);
        let exit_reason = if promise_detected {
            Some("promise_phrase_detected".to_string())
        } else if structured_exit {
            Some("structured_exit_signal".to_string())
        } else if graceful_exit {
            Some("graceful_exit".to_string())
        } else {
            None
        };

        self.context.update_current_loop(|c| {
            c.adapter_used = Some(adapter_kind);
            c.raw_output = output.clone();
            c.parsed_blocks = blocks;
            c.completion_score = completion.score;
            c.should_continue = should_continue;
            c.exit_reason = exit_reason.clone();
            c.circuit_state = self.breaker.state();
        });
        let finished = self.context.finish_loop();
        self.snapshot_best_effort(finished.as_ref()).await;

        Ok(LoopResult::success(loop_id_for_result, loop_index, completion.score, output, should_continue, exit_reason))
    }

    async fn snapshot_best_effort(&self, finished: Option<&ExecutionContext>) {
        if let Some(persistence) = &self.persistence {
            let history = self.context.history();
            if let Err(e) = persistence.save_snapshot(&history).await {
                tracing::warn!(error = %e, "persistence snapshot failed, continuing without it");
            }
            if let Some(ctx) = finished {
                if let Err(e) = persistence.save_iteration(ctx).await {
                    tracing::warn!(error = %e, "persistence iteration save failed, continuing without it");
                }
            }
        }
    }

    /// Iterates `execute_loop`, stopping at the first matching condition
    /// in `spec.md`'s documented precedence.
    pub async fn execute_until_completion(&self, user_prompt: &str, max_iterations: u32) -> (Vec<LoopResult>, Option<LoopError>) {
        self.max_iterations.store(max_iterations as u64, Ordering::SeqCst);
        let mut results = Vec::new();

        for i in 0..max_iterations {
            if self.cancel.is_cancelled() {
                return (results, Some(LoopError::Cancelled));
            }

            match self.execute_loop(user_prompt).await {
                Ok(result) => {
                    self.observer.on_loop_complete(&result);
                    let should_continue = result.should_continue;
                    let is_error_free_stop = !should_continue && result.error.is_none();
                    results.push(result);

                    if is_error_free_stop {
                        return (results, None);
                    }
                    if !should_continue {
                        return (results, None);
                    }
                }
                Err(LoopError::CircuitOpen { executor, retry_after }) => {
                    return (results, Some(LoopError::CircuitOpen { executor, retry_after }));
                }
                Err(e) => {
                    self.observer.on_error(&e.to_string());
                    return (results, Some(e));
                }
            }

            if i + 1 == max_iterations {
                return (results, Some(LoopError::RetryExhausted { attempts: max_iterations, last_error: "max iterations reached".to_string() }));
            }
        }

        (results, None)
    }

    pub fn reset_circuit_breaker(&self) {
        self.breaker.reset();
    }

    pub fn clear_history(&self) {
        self.context.clear();
    }

    pub async fn save_history_to_disk(&self) -> Result<()> {
        match &self.persistence {
            Some(p) => p.save_snapshot(&self.context.history()).await,
            None => Err(LoopError::ConfigError("no persistence manager configured".to_string())),
        }
    }

    pub async fn load_history_from_disk(&self) -> Result<()> {
        match &self.persistence {
            Some(p) => {
                let history = p.load().await?;
                self.context.replace_history(history);
                Ok(())
            }
            None => Err(LoopError::ConfigError("no persistence manager configured".to_string())),
        }
    }

    /// Idempotent: a second call returns an error rather than panicking.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(LoopError::ClientClosed);
        }
        self.cancel.cancel();
        Ok(())
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Executor;
    use crate::circuit::CircuitBreakerConfig;
    use crate::model::RetryPolicy;
    use crate::router::RouterMode;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct ScriptedExecutor {
        kind: AdapterKind,
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn execute(&self, _task: &Task, _prompt: &str, _on_line: &mut dyn FnMut(&str)) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(String::new())
            } else {
                Ok(responses.remove(0))
            }
        }
        async fn healthy(&self) -> bool {
            true
        }
        fn kind(&self) -> AdapterKind {
            self.kind
        }
    }

    fn client_with_responses(responses: Vec<&str>) -> LoopClient {
        let executor = ScriptedExecutor {
            kind: AdapterKind::Cli,
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
            calls: AtomicUsize::new(0),
        };
        let router = ExecutorRouter::new(None, Some(Box::new(executor)), None, RouterMode::Cli, false, false);
        let retry = RetryExecutor::new(RetryPolicy { max_attempts: 1, ..RetryPolicy::default() });
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
        let context = ContextManager::default();
        LoopClient::new(router, retry, breaker, context, None)
    }

    #[tokio::test]
    async fn s1_completion_on_first_try_via_promise() {
        let client = client_with_responses(vec!["ok\n<promise>任務完成！🥇</promise>"]);
        let (results, error) = client.execute_until_completion("do the thing", 5).await;

        assert!(error.is_none());
        assert_eq!(results.len(), 1);
        assert!(results[0].is_success);
        assert_eq!(client.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn s2_three_iterations_then_structured_completion() {
        let client = client_with_responses(vec![
            "progress on task 1",
            "progress on task 2",
            "progress…\n---COPILOT_STATUS---\nSTATUS: COMPLETED\nEXIT_SIGNAL: true\nTASKS_DONE: 3/3\n---END_STATUS---",
        ]);
        let (results, error) = client.execute_until_completion("do the thing", 5).await;

        assert!(error.is_none());
        assert_eq!(results.len(), 3);
        assert!(results[0].should_continue);
        assert!(results[1].should_continue);
        assert!(!results[2].should_continue);
    }

    #[tokio::test]
    async fn s3_stuck_detection_trips_breaker() {
        let same_error = "undefined symbol X at /a/b/foo.go:42";
        let client = client_with_responses(vec![same_error; 5]);

        let (results, _) = client.execute_until_completion("do the thing", 5).await;
        assert_eq!(results.len(), 5);
        assert_eq!(client.circuit_state(), CircuitState::Open);

        let sixth = client.execute_loop("do the thing").await;
        assert!(matches!(sixth, Err(LoopError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn close_is_idempotent_failure_on_second_call() {
        let client = client_with_responses(vec!["<promise>任務完成！🥇</promise>"]);
        client.close().unwrap();
        assert!(matches!(client.close(), Err(LoopError::ClientClosed)));
    }

    #[tokio::test]
    async fn closed_client_rejects_execute_loop() {
        let client = client_with_responses(vec!["<promise>任務完成！🥇</promise>"]);
        client.close().unwrap();
        assert!(matches!(client.execute_loop("p").await, Err(LoopError::ClientClosed)));
    }

    #[tokio::test]
    async fn s4_sdk_failure_cli_fallback_succeeds() {
        struct FailingExecutor;
        #[async_trait]
        impl Executor for FailingExecutor {
            async fn execute(&self, _task: &Task, _prompt: &str, _on_line: &mut dyn FnMut(&str)) -> Result<String> {
                Err(LoopError::NetworkError("connection refused".to_string()))
            }
            async fn healthy(&self) -> bool {
                false
            }
            fn kind(&self) -> AdapterKind {
                AdapterKind::Sdk
            }
        }

        let cli = ScriptedExecutor {
            kind: AdapterKind::Cli,
            responses: Mutex::new(vec!["<promise>任務完成！🥇</promise>".to_string()]),
            calls: AtomicUsize::new(0),
        };

        let router = ExecutorRouter::new(Some(Box::new(FailingExecutor)), Some(Box::new(cli)), None, RouterMode::Auto, true, false);
        let retry = RetryExecutor::new(RetryPolicy { max_attempts: 1, ..RetryPolicy::default() });
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
        let context = ContextManager::default();
        let client = LoopClient::new(router, retry, breaker, context, None);

        let result = client.execute_loop("do it").await.unwrap();
        assert!(result.is_success);
    }

    #[test]
    fn reset_circuit_breaker_clears_open_state() {
        let client = client_with_responses(vec![]);
        client.reset_circuit_breaker();
        assert_eq!(client.circuit_state(), CircuitState::Closed);
    }

    #[test]
    fn clear_history_empties_context() {
        let client = client_with_responses(vec![]);
        client.clear_history();
        assert_eq!(client.context.len(), 0);
    }
}
