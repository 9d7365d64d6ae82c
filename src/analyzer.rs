//! Completion/stuck decision logic over parsed output.
//!
//! `ResponseAnalyzer` owns the rolling fingerprint window used for stuck
//! detection (it shares [`crate::fingerprint::fingerprint`] with the circuit
//! breaker — see the module doc there) and the completion-score heuristics
//! that feed `LoopClient`'s `isCompleted` decision.

use crate::fingerprint::fingerprint;
use crate::model::CompletionStatus;
use std::collections::VecDeque;
use std::sync::Mutex;

const STUCK_WINDOW_SIZE: usize = 3;
const STUCK_CONSECUTIVE_THRESHOLD: u32 = 5;
const COMPLETION_SCORE_THRESHOLD: u32 = 30;
const COMPLETION_INDICATOR_THRESHOLD: usize = 2;
const SHORT_OUTPUT_THRESHOLD: usize = 500;

const COMPLETION_KEYWORDS: &[&str] = &["done", "finished", "completed", "完成", "全部完成"];
const NO_MORE_WORK_PHRASES: &[&str] = &["no more work", "up to date", "nothing to push", "無需更新"];

const TEST_KEYWORDS: &[&str] = &["test", "tests", "testing", "assert", "spec", "unittest"];
const IMPL_KEYWORDS: &[&str] = &["implement", "feature", "refactor", "fix", "add", "build"];

/// Result of scoring one iteration's output.
#[derive(Debug, Clone, Default)]
pub struct CompletionAnalysis {
    pub score: u32,
    pub indicators: Vec<&'static str>,
    pub is_completed: bool,
}

/// Result of the stuck-detection pass.
#[derive(Debug, Clone)]
pub struct StuckAnalysis {
    pub is_stuck: bool,
    pub reason: Option<String>,
}

pub struct ResponseAnalyzer {
    window: Mutex<VecDeque<String>>,
    consecutive: Mutex<(String, u32)>,
}

impl ResponseAnalyzer {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(STUCK_WINDOW_SIZE)),
            consecutive: Mutex::new((String::new(), 0)),
        }
    }

    /// Scores `output` (and an optional structured status) for completion.
    /// `EXIT_SIGNAL=true` alone suffices; otherwise require
    /// `score ≥ 30 ∧ indicators ≥ 2`.
    pub fn analyze_completion(&self, output: &str, status: Option<&CompletionStatus>) -> CompletionAnalysis {
        let mut score = 0u32;
        let mut indicators = Vec::new();

        if status.map(|s| s.exit_signal).unwrap_or(false) {
            return CompletionAnalysis {
                score: 100,
                indicators: vec!["explicit_exit_signal"],
                is_completed: true,
            };
        }

        let lower = output.to_lowercase();

        if COMPLETION_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            score += 10;
            indicators.push("completion_keyword");
        }
        if NO_MORE_WORK_PHRASES.iter().any(|kw| lower.contains(kw)) {
            score += 15;
            indicators.push("no_work_mode");
        }
        if output.chars().count() < SHORT_OUTPUT_THRESHOLD {
            score += 10;
            indicators.push("short_output");
        }

        let is_completed = score >= COMPLETION_SCORE_THRESHOLD && indicators.len() >= COMPLETION_INDICATOR_THRESHOLD;

        CompletionAnalysis { score, indicators, is_completed }
    }

    /// Rolling-window stuck detection: when the same fingerprint repeats
    /// `consecutive_count ≥ 5` times, report stuck.
    pub fn analyze_stuck(&self, text: &str) -> StuckAnalysis {
        let fp = fingerprint(text);

        {
            let mut window = self.window.lock().unwrap();
            if window.len() == STUCK_WINDOW_SIZE {
                window.pop_front();
            }
            window.push_back(fp.clone());
        }

        let mut consecutive = self.consecutive.lock().unwrap();
        if consecutive.0 == fp {
            consecutive.1 += 1;
        } else {
            consecutive.0 = fp;
            consecutive.1 = 1;
        }

        if consecutive.1 >= STUCK_CONSECUTIVE_THRESHOLD {
            StuckAnalysis {
                is_stuck: true,
                reason: Some("repeated 5×".to_string()),
            }
        } else {
            StuckAnalysis { is_stuck: false, reason: None }
        }
    }

    /// Resets the stuck-detection state; used when the caller wants a fresh
    /// streak (e.g. after a manual `ResetCircuitBreaker`).
    pub fn reset_stuck(&self) {
        self.window.lock().unwrap().clear();
        *self.consecutive.lock().unwrap() = (String::new(), 0);
    }

    /// Tokenises `text` for test-related vs. implementation-related
    /// keywords; flags a test-only loop when test mentions outnumber
    /// implementation mentions. Used by `ExitDetector`, not completion.
    pub fn is_test_only_loop(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower.split_whitespace().collect();
        let test_count = tokens.iter().filter(|t| TEST_KEYWORDS.iter().any(|kw| t.contains(kw))).count();
        let impl_count = tokens.iter().filter(|t| IMPL_KEYWORDS.iter().any(|kw| t.contains(kw))).count();
        test_count > impl_count
    }
}

impl Default for ResponseAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
