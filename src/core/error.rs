use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Stable, dotted error codes surfaced in the CLI envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,
    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidJson,
    BuildStageFailed,
    ManifestPatchFailed,
    StagingLocked,
    CommandFailed,
    CommandTimeout,
    PublishFailed,
    InstallFailed,
    RunCancelled,
    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",
            ErrorCode::BuildStageFailed => "build.stage_failed",
            ErrorCode::ManifestPatchFailed => "build.manifest_patch_failed",
            ErrorCode::StagingLocked => "build.staging_locked",
            ErrorCode::CommandFailed => "command.failed",
            ErrorCode::CommandTimeout => "command.timeout",
            ErrorCode::PublishFailed => "publish.failed",
            ErrorCode::InstallFailed => "install.failed",
            ErrorCode::RunCancelled => "run.cancelled",
            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

/// A short, actionable suggestion attached to an error or step result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hint {
    pub message: String,
}

/// Structured error carried through every fallible operation.
///
/// `details` holds machine-readable context (field names, paths, raw output);
/// `hints` hold human-facing next actions. Both flow unchanged into the CLI
/// envelope.
#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for Error {}

fn hint_list(hints: Option<Vec<String>>) -> Vec<Hint> {
    hints
        .unwrap_or_default()
        .into_iter()
        .map(|message| Hint { message })
        .collect()
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Value::Null,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn validation_invalid_argument(
        field: &str,
        message: impl Into<String>,
        detail: Option<String>,
        hints: Option<Vec<String>>,
    ) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::ValidationInvalidArgument,
            details: json!({ "field": field, "message": message, "detail": detail }),
            message,
            hints: hint_list(hints),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::ValidationMissingArgument,
            details: json!({ "field": field }),
            message,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_invalid_json(message: impl Into<String>, context: Option<String>) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::ValidationInvalidJson,
            details: json!({ "context": context }),
            message,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn config_missing_key(key: &str, context: Option<String>) -> Self {
        Self {
            code: ErrorCode::ConfigMissingKey,
            message: format!("Missing configuration key '{}'", key),
            details: json!({ "key": key, "context": context }),
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn config_invalid_value(
        key: &str,
        value: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::ConfigInvalidValue,
            details: json!({ "key": key, "value": value, "message": message }),
            message,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn stage_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BuildStageFailed, message)
    }

    pub fn manifest_patch_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ManifestPatchFailed, message)
    }

    pub fn staging_locked(path: &str, hints: Vec<String>) -> Self {
        Self {
            code: ErrorCode::StagingLocked,
            message: format!("Staging directory is locked by another run: {}", path),
            details: json!({ "lockFile": path }),
            hints: hint_list(Some(hints)),
            retryable: None,
        }
    }

    pub fn command_failed(message: impl Into<String>, operation: Option<String>) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::CommandFailed,
            details: json!({ "operation": operation }),
            message,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn command_timeout(message: impl Into<String>, operation: Option<String>) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::CommandTimeout,
            details: json!({ "operation": operation }),
            message,
            hints: Vec::new(),
            retryable: Some(true),
        }
    }

    pub fn publish_failed(message: impl Into<String>, destination: Option<String>) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::PublishFailed,
            details: json!({ "destination": destination }),
            message,
            hints: Vec::new(),
            retryable: Some(true),
        }
    }

    pub fn install_failed(message: impl Into<String>, root: Option<String>) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::InstallFailed,
            details: json!({ "root": root }),
            message,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::RunCancelled, "Run cancelled by caller")
    }

    pub fn internal_io(message: impl Into<String>, operation: Option<String>) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::InternalIoError,
            details: json!({ "operation": operation }),
            message,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn internal_json(message: impl Into<String>, context: Option<String>) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::InternalJsonError,
            details: json!({ "context": context }),
            message,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn internal_unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalUnexpected, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalUnexpected, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_dotted_strings() {
        assert_eq!(ErrorCode::InternalIoError.as_str(), "internal.io_error");
        assert_eq!(
            ErrorCode::ValidationInvalidArgument.as_str(),
            "validation.invalid_argument"
        );
        assert_eq!(ErrorCode::StagingLocked.as_str(), "build.staging_locked");
    }

    #[test]
    fn validation_error_carries_field_in_details() {
        let err = Error::validation_invalid_argument(
            "moduleName",
            "Module name cannot be empty",
            None,
            Some(vec!["Set build.moduleName in the spec".to_string()]),
        );
        assert_eq!(err.code, ErrorCode::ValidationInvalidArgument);
        assert_eq!(err.details["field"], "moduleName");
        assert_eq!(err.hints.len(), 1);
    }

    #[test]
    fn timeout_errors_are_retryable() {
        let err = Error::command_timeout("signtool timed out", Some("sign file".to_string()));
        assert_eq!(err.retryable, Some(true));
    }
}
