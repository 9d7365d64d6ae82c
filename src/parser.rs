//! Output parsing: fenced code blocks, key-value lines, and the structured
//! status block the assistant may emit.

use crate::model::{CompletionStatus, ParsedBlock};
use regex::Regex;
use std::sync::OnceLock;

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```([\w+-]*)\r?\n(.*?)```").unwrap())
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*[:=]\s*(.+?)\s*$").unwrap())
}

fn status_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?s)---(?:COPILOT_STATUS|RALPH_STATUS)---\r?\n(.*?)\r?\n---(?:END_STATUS|END_RALPH_STATUS)---",
        )
        .unwrap()
    })
}

/// Extracts fenced code blocks, key-value option lines, and a structured
/// status block from raw assistant output.
pub struct OutputParser;

impl OutputParser {
    /// Parses `text` into an ordered list of blocks. Code blocks and the
    /// status block (if present) always win over plain key-value lines that
    /// fall inside them — key-value extraction only runs outside fences.
    pub fn parse(text: &str) -> Vec<ParsedBlock> {
        let mut blocks = Vec::new();

        for cap in code_block_re().captures_iter(text) {
            let lang = cap.get(1).map(|m| m.as_str().to_string()).filter(|s| !s.is_empty());
            let content = cap.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
            blocks.push(ParsedBlock::CodeBlock { language: lang, content });
        }

        let without_code = code_block_re().replace_all(text, "");
        for cap in key_value_re().captures_iter(&without_code) {
            let key = cap[1].to_string();
            let value = cap[2].to_string();
            blocks.push(ParsedBlock::KeyValue { key, value });
        }

        if let Some(status) = Self::parse_status_block(text) {
            blocks.push(ParsedBlock::Status(status));
        }

        blocks
    }

    /// Parses the `---COPILOT_STATUS---`/`---RALPH_STATUS---` block if present.
    /// CRLF tolerant; recognises `STATUS:`, `EXIT_SIGNAL:`, `TASKS_DONE:`.
    pub fn parse_status_block(text: &str) -> Option<CompletionStatus> {
        let cap = status_block_re().captures(text)?;
        let body = &cap[1];

        let mut status = CompletionStatus::default();
        for line in body.lines() {
            let line = line.trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim();
            match key.as_str() {
                "STATUS" => status.status = Some(value.to_string()),
                "EXIT_SIGNAL" => status.exit_signal = value.eq_ignore_ascii_case("true"),
                "TASKS_DONE" => status.tasks_done = Some(value.to_string()),
                _ => {}
            }
        }
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_code_block_with_language() {
        let text = "before\n```rust\nfn main() {}\n```\nafter";
        let blocks = OutputParser::parse(text);
        assert!(blocks.iter().any(|b| matches!(b, ParsedBlock::CodeBlock { language: Some(l), content } if l == "rust" && content.contains("fn main"))));
    }

    #[test]
    fn extracts_key_value_lines() {
        let text = "MODE: auto\nLEVEL=3\n";
        let blocks = OutputParser::parse(text);
        let kvs: Vec<_> = blocks
            .iter()
            .filter_map(|b| match b {
                ParsedBlock::KeyValue { key, value } => Some((key.as_str(), value.as_str())),
                _ => None,
            })
            .collect();
        assert!(kvs.contains(&("MODE", "auto")));
        assert!(kvs.contains(&("LEVEL", "3")));
    }

    #[test]
    fn parses_copilot_status_block() {
        let text = "progress…\n---COPILOT_STATUS---\nSTATUS: COMPLETED\nEXIT_SIGNAL: true\nTASKS_DONE: 3/3\n---END_STATUS---";
        let status = OutputParser::parse_status_block(text).unwrap();
        assert_eq!(status.status.as_deref(), Some("COMPLETED"));
        assert!(status.exit_signal);
        assert_eq!(status.tasks_done.as_deref(), Some("3/3"));
    }

    #[test]
    fn parses_ralph_status_block_with_crlf() {
        let text = "work\r\n---RALPH_STATUS---\r\nSTATUS: RUNNING\r\nEXIT_SIGNAL: false\r\n---END_RALPH_STATUS---";
        let status = OutputParser::parse_status_block(text).unwrap();
        assert_eq!(status.status.as_deref(), Some("RUNNING"));
        assert!(!status.exit_signal);
    }

    #[test]
    fn missing_status_block_returns_none() {
        assert!(OutputParser::parse_status_block("no status markers here").is_none());
    }
}
