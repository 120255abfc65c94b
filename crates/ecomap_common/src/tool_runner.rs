//! Tool Runner - bounded execution of external inventory tools
//!
//! Every collector goes through a `ToolRunner`, so:
//! - each invocation is bounded by an explicit timeout
//! - a missing tool, a timeout and a non-zero exit are reported as status, never raised
//! - tests swap in `FakeToolRunner` and never shell out
//!
//! The runner does NOT interpret output. Collectors decide what to do with it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// How an external tool invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Exit code 0
    Success,
    /// Ran but returned a non-zero exit code
    NonZeroExit,
    /// Executable not found on PATH
    NotFound,
    /// Killed after exceeding its timeout
    Timeout,
    /// Any other OS error (permissions, fork failure)
    OsError,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NonZeroExit => "non-zero exit",
            Self::NotFound => "command not found",
            Self::Timeout => "timeout",
            Self::OsError => "OS error",
        }
    }
}

/// Captured result of one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Full command line, for logs
    pub command: String,
    pub status: ToolStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ToolOutput {
    pub fn success(command: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: ToolStatus::Success,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 0,
        }
    }

    pub fn failed(command: impl Into<String>, status: ToolStatus, stderr: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 0,
        }
    }

    /// Stdout when the tool succeeded and printed something
    pub fn usable_stdout(&self) -> Option<&str> {
        if self.status == ToolStatus::Success && !self.stdout.trim().is_empty() {
            Some(&self.stdout)
        } else {
            None
        }
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Seam between collectors and the operating system
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `program args...`, killing it if it outlives `timeout`
    async fn run(&self, program: &str, args: &[&str], timeout: Duration) -> ToolOutput;
}

/// Runs real processes via tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolRunner;

#[async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run(&self, program: &str, args: &[&str], timeout: Duration) -> ToolOutput {
        let command = command_line(program, args);
        let start = Instant::now();
        debug!("Running tool: {}", command);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let mut result = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => ToolOutput {
                command: command.clone(),
                status: if output.status.success() {
                    ToolStatus::Success
                } else {
                    ToolStatus::NonZeroExit
                },
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                duration_ms: 0,
            },
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                ToolOutput::failed(&command, ToolStatus::NotFound, e.to_string())
            }
            Ok(Err(e)) => ToolOutput::failed(&command, ToolStatus::OsError, e.to_string()),
            Err(_) => ToolOutput::failed(
                &command,
                ToolStatus::Timeout,
                format!("timed out after {}ms", timeout.as_millis()),
            ),
        };

        result.duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Tool {} finished: {} in {}ms",
            command,
            result.status.as_str(),
            result.duration_ms
        );
        result
    }
}

// ============================================================================
// Fake Tool Runner (Testing)
// ============================================================================

/// Fake runner answering from canned responses
///
/// Responses are matched by command-line prefix, first match wins. Commands
/// with no matching response behave as if the tool were not installed.
///
/// ```rust,ignore
/// let fake = FakeToolRunner::new()
///     .respond("ss -tlnp", SS_OUTPUT)
///     .fail("kubectl", ToolStatus::Timeout);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FakeToolRunner {
    responses: Vec<(String, ToolOutput)>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with a successful `stdout`
    pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
        self.responses
            .push((prefix.to_string(), ToolOutput::success(prefix, stdout)));
        self
    }

    /// Answer commands starting with `prefix` with a failure status
    pub fn fail(mut self, prefix: &str, status: ToolStatus) -> Self {
        self.responses.push((
            prefix.to_string(),
            ToolOutput::failed(prefix, status, format!("fake {}", status.as_str())),
        ));
        self
    }

    /// Command lines seen so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl ToolRunner for FakeToolRunner {
    async fn run(&self, program: &str, args: &[&str], _timeout: Duration) -> ToolOutput {
        let command = command_line(program, args);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }

        self.responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| ToolOutput {
                command: command.clone(),
                ..output.clone()
            })
            .unwrap_or_else(|| ToolOutput::failed(command, ToolStatus::NotFound, "not installed"))
    }
}
