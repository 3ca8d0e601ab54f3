//! Command execution primitives with consistent error handling.
//!
//! Every external tool the pipeline touches (signing tool, package manager,
//! formatter, test runner) goes through this module so that timeouts and
//! error text extraction behave identically everywhere.

use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{Error, Result};

/// Captured output from command execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapturedOutput {
    pub success: bool,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl CapturedOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }

    /// Error text for reporting: stderr preferred, stdout fallback.
    pub fn error_text(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        }
    }
}

/// Run a command and return stdout on success.
pub fn run(program: &str, args: &[&str], context: &str) -> Result<String> {
    let output = Command::new(program).args(args).output().map_err(|e| {
        Error::command_failed(
            format!("Failed to run {}: {}", context, e),
            Some(context.to_string()),
        )
    })?;

    if !output.status.success() {
        let captured = CapturedOutput::from_output(&output);
        return Err(Error::command_failed(
            format!("{} failed: {}", context, captured.error_text()),
            Some(context.to_string()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Poll interval while waiting for a child process under a deadline.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Run a command with a hard timeout, killing the child when the deadline
/// passes. A timed-out command is an error, never a silent hang.
pub fn run_with_timeout(
    program: &str,
    args: &[&str],
    dir: Option<&Path>,
    timeout: Duration,
    context: &str,
) -> Result<CapturedOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| {
        Error::command_failed(
            format!("Failed to run {}: {}", context, e),
            Some(context.to_string()),
        )
    })?;

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => {
                let output = child.wait_with_output().map_err(|e| {
                    Error::command_failed(e.to_string(), Some(context.to_string()))
                })?;
                return Ok(CapturedOutput::from_output(&output));
            }
            Ok(None) => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::command_timeout(
                        format!(
                            "{} did not finish within {}s and was terminated",
                            context,
                            timeout.as_secs()
                        ),
                        Some(context.to_string()),
                    ));
                }
                std::thread::sleep(WAIT_POLL);
            }
            Err(e) => {
                return Err(Error::command_failed(
                    e.to_string(),
                    Some(context.to_string()),
                ));
            }
        }
    }
}

/// Split a command template into program + args, substituting `{path}`.
///
/// Templates are single commands, not shell pipelines; quoting is
/// whitespace-based on purpose to avoid invoking a shell.
pub fn split_template(template: &str, path: &Path) -> Result<(String, Vec<String>)> {
    let rendered = template.replace("{path}", &path.to_string_lossy());
    let mut parts = rendered.split_whitespace().map(str::to_string);
    let program = parts.next().ok_or_else(|| {
        Error::validation_invalid_argument(
            "command",
            "Command template is empty",
            Some(template.to_string()),
            None,
        )
    })?;
    Ok((program, parts.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_succeeds_with_valid_command() {
        let result = run("echo", &["hello"], "echo test");
        assert_eq!(result.unwrap(), "hello");
    }

    #[test]
    fn run_fails_with_invalid_command() {
        let result = run("nonexistent_command_xyz", &[], "test");
        assert!(result.is_err());
    }

    #[test]
    fn run_with_timeout_kills_hung_process() {
        let result = run_with_timeout(
            "sleep",
            &["30"],
            None,
            Duration::from_millis(200),
            "sleep test",
        );
        let err = result.unwrap_err();
        assert_eq!(err.code.as_str(), "command.timeout");
        assert_eq!(err.retryable, Some(true));
    }

    #[test]
    fn run_with_timeout_returns_fast_output() {
        let result =
            run_with_timeout("echo", &["done"], None, Duration::from_secs(5), "echo test").unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "done");
    }

    #[test]
    fn split_template_substitutes_path() {
        let (program, args) =
            split_template("scriptfmt --write {path}", Path::new("/tmp/mod")).unwrap();
        assert_eq!(program, "scriptfmt");
        assert_eq!(args, vec!["--write".to_string(), "/tmp/mod".to_string()]);
    }

    #[test]
    fn error_text_prefers_stderr() {
        let captured = CapturedOutput {
            success: false,
            exit_code: 1,
            stdout: "stdout content".to_string(),
            stderr: "stderr content".to_string(),
        };
        assert_eq!(captured.error_text(), "stderr content");
    }
}
