//! Formatting stage: run an external formatter over a directory tree.

use std::path::Path;

use serde::Serialize;

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::plan::FormattingSettings;
use crate::utils::command;

const DEFAULT_FORMAT_COMMAND: &str = "scriptfmt --write {path}";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatReport {
    pub command: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Format one target root with the configured (or default) formatter.
/// The command runs under the context timeout; a non-zero exit is an error
/// the runner records against the formatting step.
pub fn run_format(
    target: &Path,
    settings: &FormattingSettings,
    ctx: &RunContext,
) -> Result<FormatReport> {
    let template = settings
        .command
        .as_deref()
        .unwrap_or(DEFAULT_FORMAT_COMMAND);
    let (program, args) = command::split_template(template, target)?;
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let output = command::run_with_timeout(
        &program,
        &arg_refs,
        None,
        ctx.command_timeout,
        "format sources",
    )?;

    if !output.success {
        return Err(Error::command_failed(
            format!("Formatter failed: {}", output.error_text()),
            Some("format sources".to_string()),
        ));
    }

    log_status!("format", "Formatted {}", target.display());
    Ok(FormatReport {
        command: template.to_string(),
        target: target.to_string_lossy().to_string(),
        output: if output.stdout.trim().is_empty() {
            None
        } else {
            Some(output.stdout.trim().to_string())
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;
    use tempfile::tempdir;

    fn ctx() -> RunContext {
        RunContext {
            run_id: "format-test".to_string(),
            temp_root: std::env::temp_dir(),
            command_timeout: std::time::Duration::from_secs(5),
            concurrency: 2,
            cancel: CancelToken::new(),
            publish_credentials: Vec::new(),
        }
    }

    #[test]
    fn configured_command_runs_against_target() {
        let dir = tempdir().unwrap();
        let settings = FormattingSettings {
            staging: true,
            project: false,
            command: Some("echo formatted {path}".to_string()),
        };

        let report = run_format(dir.path(), &settings, &ctx()).unwrap();
        assert!(report.output.unwrap().contains("formatted"));
    }

    #[test]
    fn missing_formatter_binary_is_an_error() {
        let dir = tempdir().unwrap();
        let settings = FormattingSettings {
            staging: true,
            project: false,
            command: Some("definitely-not-a-real-formatter {path}".to_string()),
        };

        let err = run_format(dir.path(), &settings, &ctx()).unwrap_err();
        assert_eq!(err.code.as_str(), "command.failed");
    }
}
