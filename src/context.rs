//! In-memory, bounded history of execution contexts.

use crate::model::ExecutionContext;
use std::collections::VecDeque;
use std::sync::Mutex;

pub struct ContextManager {
    max_history_size: usize,
    history: Mutex<VecDeque<ExecutionContext>>,
    current: Mutex<Option<ExecutionContext>>,
}

impl ContextManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            max_history_size: max_history_size.max(1),
            history: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
        }
    }

    /// Begins a new iteration, replacing any unfinished current context.
    pub fn start_loop(&self, loop_index: u64, user_prompt: impl Into<String>, wrapped_prompt: impl Into<String>, loop_id: impl Into<String>) -> ExecutionContext {
        let ctx = ExecutionContext::new(loop_id, loop_index, user_prompt, wrapped_prompt);
        *self.current.lock().unwrap() = Some(ctx.clone());
        ctx
    }

    /// Applies `updater` to the in-progress context under the lock.
    pub fn update_current_loop(&self, updater: impl FnOnce(&mut ExecutionContext)) {
        let mut current = self.current.lock().unwrap();
        if let Some(ctx) = current.as_mut() {
            updater(ctx);
        }
    }

    /// Seals the in-progress context into history, dropping the oldest
    /// entry first if at capacity (invariant I1: `loop_index` stays dense).
    pub fn finish_loop(&self) -> Option<ExecutionContext> {
        let ctx = self.current.lock().unwrap().take()?;
        let mut history = self.history.lock().unwrap();
        if history.len() >= self.max_history_size {
            history.pop_front();
        }
        history.push_back(ctx.clone());
        Some(ctx)
    }

    pub fn history(&self) -> Vec<ExecutionContext> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.history.lock().unwrap().clear();
        *self.current.lock().unwrap() = None;
    }

    pub fn len(&self) -> usize {
        self.history.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn replace_history(&self, history: Vec<ExecutionContext>) {
        let mut guard = self.history.lock().unwrap();
        *guard = history.into_iter().collect();
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_loop_without_start_returns_none() {
        let cm = ContextManager::default();
        assert!(cm.finish_loop().is_none());
    }

    #[test]
    fn start_update_finish_roundtrip() {
        let cm = ContextManager::default();
        cm.start_loop(0, "do it", "wrapped", "l1");
        cm.update_current_loop(|ctx| ctx.completion_score = 42);
        let finished = cm.finish_loop().unwrap();
        assert_eq!(finished.completion_score, 42);
        assert_eq!(cm.len(), 1);
    }

    #[test]
    fn history_is_bounded_fifo() {
        let cm = ContextManager::new(2);
        for i in 0..3 {
            cm.start_loop(i, "p", "w", "l1");
            cm.finish_loop();
        }
        let history = cm.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].loop_index, 1);
        assert_eq!(history[1].loop_index, 2);
    }

    #[test]
    fn clear_empties_history_and_current() {
        let cm = ContextManager::default();
        cm.start_loop(0, "p", "w", "l1");
        cm.finish_loop();
        cm.clear();
        assert!(cm.is_empty());
    }
}
