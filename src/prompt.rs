//! System-prompt wrapper and promise-phrase detection.
//!
//! The wrapper gives every outgoing prompt a fixed preamble that teaches the
//! assistant the completion protocol; the detector is the single source of
//! truth for whether that protocol fired.

use std::sync::Mutex;

/// Default completion phrase, wrapped as `<promise>PHRASE</promise>`.
pub const DEFAULT_PROMISE_PHRASE: &str = "任務完成！🥇";

fn system_instructions(phrase: &str) -> String {
    format!(
        "You are operating inside an autonomous iteration loop. You will be invoked \
         repeatedly with the same goal until it is fully complete or a safety limit is \
         reached. When, and only when, the task is completely finished, emit the exact \
         literal text `<promise>{phrase}</promise>` as the final characters of your \
         response. Do not emit this phrase for any reason other than full completion; \
         emitting it prematurely ends the loop."
    )
}

/// Builds the full outgoing prompt for one iteration:
/// `SYSTEM_INSTRUCTIONS + "\n\n---\n\n[Iteration k/N]\n\n" + USER_PROMPT`.
pub fn wrap_prompt(user_prompt: &str, iteration: u32, max_iterations: u32, phrase: &str) -> String {
    format!(
        "{}\n\n---\n\n[Iteration {}/{}]\n\n{}",
        system_instructions(phrase),
        iteration,
        max_iterations,
        user_prompt
    )
}

/// Latches a single boolean once the promise phrase has been observed,
/// either in a streamed line (`check`) or the final full text (`check_full`).
/// A positive detection trumps every other completion heuristic.
pub struct PromiseDetector {
    phrase: String,
    needle: String,
    detected: Mutex<bool>,
}

impl PromiseDetector {
    pub fn new(phrase: impl Into<String>) -> Self {
        let phrase = phrase.into();
        let needle = format!("<promise>{phrase}</promise>");
        Self {
            phrase,
            needle,
            detected: Mutex::new(false),
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Check a single streamed line; latches `detected` if it matches.
    pub fn check(&self, line: &str) -> bool {
        if line.contains(&self.needle) {
            *self.detected.lock().unwrap() = true;
        }
        self.is_detected()
    }

    /// Check the full accumulated output; latches `detected` if it matches.
    pub fn check_full(&self, text: &str) -> bool {
        if text.contains(&self.needle) {
            *self.detected.lock().unwrap() = true;
        }
        self.is_detected()
    }

    pub fn is_detected(&self) -> bool {
        *self.detected.lock().unwrap()
    }

    /// Clears the latch; called at the start of every iteration.
    pub fn reset(&self) {
        *self.detected.lock().unwrap() = false;
    }
}

impl Default for PromiseDetector {
    fn default() -> Self {
        Self::new(DEFAULT_PROMISE_PHRASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_prompt_with_iteration_marker() {
        let wrapped = wrap_prompt("fix the bug", 2, 5, DEFAULT_PROMISE_PHRASE);
        assert!(wrapped.contains("[Iteration 2/5]"));
        assert!(wrapped.ends_with("fix the bug"));
        assert!(wrapped.contains(DEFAULT_PROMISE_PHRASE));
    }

    #[test]
    fn detects_phrase_anywhere_in_full_text() {
        let d = PromiseDetector::default();
        assert!(!d.is_detected());
        assert!(d.check_full("ok\n<promise>任務完成！🥇</promise>"));
        assert!(d.is_detected());
    }

    #[test]
    fn reset_clears_latch() {
        let d = PromiseDetector::default();
        d.check_full("<promise>任務完成！🥇</promise>");
        assert!(d.is_detected());
        d.reset();
        assert!(!d.is_detected());
    }

    #[test]
    fn streamed_line_latches_across_calls() {
        let d = PromiseDetector::default();
        d.check("partial output");
        assert!(!d.is_detected());
        d.check("<promise>任務完成！🥇</promise>");
        assert!(d.is_detected());
    }

    #[test]
    fn custom_phrase_is_respected() {
        let d = PromiseDetector::new("DONE");
        assert!(!d.check_full("not yet"));
        assert!(d.check_full("<promise>DONE</promise>"));
    }
}
