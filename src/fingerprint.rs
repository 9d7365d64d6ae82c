//! Shared error/output fingerprint normalisation.
//!
//! Reused verbatim by [`crate::circuit::CircuitBreaker`] (same-error counting)
//! and [`crate::analyzer::ResponseAnalyzer`] (stuck detection). Per the
//! design note in the upstream system, sharing this function is a
//! correctness property, not a DRY nicety — divergence would let the
//! breaker under-count what the analyzer flags as "same".

use regex::Regex;
use std::sync::OnceLock;

const MAX_FINGERPRINT_LEN: usize = 200;

fn line_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bline\s+\d+\b|:\d+:\d*").unwrap())
}

fn path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:[A-Za-z]:\\|/)[\w./\\-]+(?::\d+)?").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Normalise an error message or output string into a stable fingerprint:
/// strip line numbers, replace file paths with a sentinel, lowercase,
/// collapse whitespace, and truncate to 200 characters.
pub fn fingerprint(text: &str) -> String {
    let no_lines = line_number_re().replace_all(text, " ");
    let no_paths = path_re().replace_all(&no_lines, "<path>");
    let collapsed = whitespace_re().replace_all(&no_paths, " ");
    let lowered = collapsed.trim().to_lowercase();
    if lowered.len() > MAX_FINGERPRINT_LEN {
        lowered.chars().take(MAX_FINGERPRINT_LEN).collect()
    } else {
        lowered
    }
}
