//! One-shot CLI subprocess adapter, the reliable fallback behind the SDK
//! adapter. Flag assembly and line-teeing follow the pack's subprocess
//! transport idiom — piped stdio, a `BufReader` line loop, cancellation by
//! killing the child rather than hoping it notices.

use crate::errors::{LoopError, Result};
use crate::model::{AdapterKind, Task};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Flags assembled into the CLI invocation. Mirrors the binary's own
/// option surface one-to-one so the router never has to know the binary's
/// flag spelling.
#[derive(Debug, Clone)]
pub struct CliAdapterConfig {
    pub binary_path: PathBuf,
    pub model: Option<String>,
    pub silent: bool,
    pub all_tools: bool,
    pub all_paths: bool,
    pub all_urls: bool,
    pub non_interactive: bool,
    pub disable_parallel: bool,
    pub allowed_tools: Vec<String>,
    pub denied_tools: Vec<String>,
    pub allowed_directories: Vec<PathBuf>,
    pub resume_session: Option<String>,
    pub share_session: bool,
    pub timeout: Duration,
}

impl Default for CliAdapterConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("claude"),
            model: None,
            silent: false,
            all_tools: false,
            all_paths: false,
            all_urls: false,
            non_interactive: true,
            disable_parallel: false,
            allowed_tools: Vec::new(),
            denied_tools: Vec::new(),
            allowed_directories: Vec::new(),
            resume_session: None,
            share_session: false,
            timeout: Duration::from_secs(600),
        }
    }
}

impl CliAdapterConfig {
    fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if self.silent {
            args.push("--silent".to_string());
        }
        if self.all_tools || self.all_paths || self.all_urls {
            args.push("--all-permissions".to_string());
        }
        if self.non_interactive {
            args.push("--non-interactive".to_string());
        }
        if self.disable_parallel {
            args.push("--disable-parallel".to_string());
        }
        if !self.allowed_tools.is_empty() {
            args.push("--allowed-tools".to_string());
            args.push(self.allowed_tools.join(","));
        }
        if !self.denied_tools.is_empty() {
            args.push("--denied-tools".to_string());
            args.push(self.denied_tools.join(","));
        }
        for dir in &self.allowed_directories {
            args.push("--add-dir".to_string());
            args.push(dir.display().to_string());
        }
        if let Some(session) = &self.resume_session {
            args.push("--resume".to_string());
            args.push(session.clone());
        }
        if self.share_session {
            args.push("--share-session".to_string());
        }

        args.push(prompt.to_string());
        args
    }
}

pub struct CliAdapter {
    config: CliAdapterConfig,
}

impl CliAdapter {
    pub fn new(config: CliAdapterConfig) -> Self {
        Self { config }
    }

    /// Runs `stream_callback` on every complete stdout line while
    /// accumulating the raw text for the final result. Returns the
    /// accumulated stdout, the process exit code, and whatever stderr was
    /// captured alongside it.
    async fn run(&self, prompt: &str, cancel: &CancellationToken, mut stream_callback: impl FnMut(&str)) -> Result<(String, Option<i32>, String)> {
        let args = self.config.build_args(prompt);

        let mut cmd = Command::new(&self.config.binary_path);
        cmd.args(&args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| LoopError::CliNotFound {
            message: format!("failed to spawn CLI adapter: {e}"),
            cli_path: Some(self.config.binary_path.clone()),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| LoopError::ExecutionError {
            message: "CLI process had no stdout".to_string(),
            exit_code: None,
            stderr: None,
        })?;
        let stderr = child.stderr.take();

        let mut out_reader = BufReader::new(stdout).lines();
        let mut accumulated = String::new();
        let mut stderr_text = String::new();

        if let Some(stderr) = stderr {
            let mut err_reader = BufReader::new(stderr).lines();
            loop {
                tokio::select! {
                    line = out_reader.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                stream_callback(&line);
                                accumulated.push_str(&line);
                                accumulated.push('\n');
                            }
                            Ok(None) => break,
                            Err(e) => return Err(LoopError::Io(e)),
                        }
                    }
                    line = err_reader.next_line() => {
                        if let Ok(Some(line)) = line {
                            stderr_text.push_str(&line);
                            stderr_text.push('\n');
                        }
                    }
                    _ = cancel.cancelled() => {
                        kill_process_tree(&mut child).await;
                        return Err(LoopError::Cancelled);
                    }
                    _ = tokio::time::sleep(self.config.timeout) => {
                        kill_process_tree(&mut child).await;
                        return Err(LoopError::Timeout(self.config.timeout));
                    }
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status.map_err(LoopError::Io)?,
            _ = cancel.cancelled() => {
                kill_process_tree(&mut child).await;
                return Err(LoopError::Cancelled);
            }
        };

        Ok((accumulated, status.code(), stderr_text))
    }
}

#[cfg(unix)]
async fn kill_process_tree(child: &mut tokio::process::Child) {
    if let Some(id) = child.id() {
        unsafe {
            libc_kill(-(id as i32), 15);
        }
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
async fn kill_process_tree(child: &mut tokio::process::Child) {
    let _ = child.kill().await;
}

#[cfg(unix)]
unsafe fn libc_kill(pid: i32, sig: i32) {
    extern "C" {
        fn kill(pid: i32, sig: i32) -> i32;
    }
    unsafe { kill(pid, sig) };
}

#[async_trait]
impl super::Executor for CliAdapter {
    async fn execute(&self, _task: &Task, prompt: &str, on_line: &mut dyn FnMut(&str)) -> Result<String> {
        let cancel = CancellationToken::new();
        let (text, exit_code, stderr_text) = self.run(prompt, &cancel, |line| on_line(line)).await?;

        match exit_code {
            Some(0) | None => Ok(text),
            Some(code) => Err(LoopError::ExecutionError {
                message: "CLI adapter exited non-zero".to_string(),
                exit_code: Some(code),
                stderr: if stderr_text.is_empty() { None } else { Some(stderr_text) },
            }),
        }
    }

    async fn healthy(&self) -> bool {
        Command::new(&self.config.binary_path).arg("--version").output().await.map(|o| o.status.success()).unwrap_or(false)
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Cli
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_args_collapses_permission_flags() {
        let config = CliAdapterConfig { all_tools: true, ..Default::default() };
        let args = config.build_args("do it");
        assert!(args.iter().any(|a| a == "--all-permissions"));
        assert_eq!(args.iter().filter(|a| a.as_str() == "--all-permissions").count(), 1);
    }

    #[test]
    fn build_args_joins_tool_lists() {
        let config = CliAdapterConfig {
            allowed_tools: vec!["read".to_string(), "write".to_string()],
            ..Default::default()
        };
        let args = config.build_args("prompt");
        let idx = args.iter().position(|a| a == "--allowed-tools").unwrap();
        assert_eq!(args[idx + 1], "read,write");
    }

    #[test]
    fn prompt_is_positional_last() {
        let config = CliAdapterConfig::default();
        let args = config.build_args("hello world");
        assert_eq!(args.last().unwrap(), "hello world");
    }
}
