//! Idempotent file signing with already-signed detection.
//!
//! The engine expands include globs against the staging tree, subtracts
//! excludes, and only attempts files that are unsigned (or signed at all,
//! when `overwrite_signed` is set). It never retries a failed signature;
//! retry policy belongs to the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::context::RunContext;
use crate::error::Result;
use crate::plan::SigningSettings;
use crate::utils::{command, paths, workers};

const MAX_REPORTED_FAILURES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignatureStatus {
    NotSigned,
    SignedByThisCertificate,
    SignedByOtherCertificate,
}

/// Outcome of one signing attempt. `Unknown` marks a tool outcome that could
/// not be classified into a known success/failure code, reported distinctly
/// so operators can tell transient tool errors from deterministic rejection.
#[derive(Debug, Clone)]
pub enum SignOutcome {
    Signed,
    Failed(String),
    Unknown(String),
}

/// Signing tool boundary.
pub trait SigningTool: Send + Sync {
    fn query_status(&self, file: &Path, thumbprint: &str) -> Result<SignatureStatus>;
    fn sign(&self, file: &Path, thumbprint: &str, timestamp_server: Option<&str>) -> SignOutcome;
}

/// Aggregate signing counters. `success` is derived: no failed attempts.
/// Unknown outcomes are warning-worthy but never flip success on their own.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningReport {
    pub thumbprint: String,
    pub matched: usize,
    pub after_exclude: usize,
    pub already_signed_by_this_cert: usize,
    pub already_signed_other: usize,
    pub attempted: usize,
    pub signed_new: usize,
    pub resigned: usize,
    pub failed: usize,
    pub unknown_error: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_files: Vec<String>,
    pub success: bool,
}

enum FileOutcome {
    AlreadyThisCert,
    AlreadyOtherCert,
    SignedNew,
    Resigned,
    Failed(String),
    Unknown,
}

fn expand_includes(staging: &Path, settings: &SigningSettings) -> Vec<PathBuf> {
    let mut matched = Vec::new();
    for pattern in &settings.include {
        let full = format!("{}/{}", staging.display(), pattern);
        let Ok(entries) = glob::glob(&full) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()).filter(|p| p.is_file()) {
            if !matched.contains(&entry) {
                matched.push(entry);
            }
        }
    }
    matched.sort();
    matched
}

fn is_excluded(staging: &Path, file: &Path, settings: &SigningSettings) -> bool {
    let relative = paths::relative_display(staging, file);
    settings
        .exclude_patterns
        .iter()
        .any(|pattern| glob_match::glob_match(pattern, &relative))
        || settings
            .exclude_paths
            .iter()
            .any(|fragment| relative.contains(fragment.as_str()))
}

fn process_file(file: &Path, settings: &SigningSettings, tool: &dyn SigningTool) -> FileOutcome {
    let status = match tool.query_status(file, &settings.thumbprint) {
        Ok(status) => status,
        // An unreadable signature status is an unclassifiable tool outcome.
        Err(_) => return FileOutcome::Unknown,
    };

    let (attempt, was_signed) = match status {
        SignatureStatus::NotSigned => (true, false),
        SignatureStatus::SignedByThisCertificate | SignatureStatus::SignedByOtherCertificate => {
            (settings.overwrite_signed, true)
        }
    };

    if !attempt {
        return match status {
            SignatureStatus::SignedByThisCertificate => FileOutcome::AlreadyThisCert,
            _ => FileOutcome::AlreadyOtherCert,
        };
    }

    match tool.sign(
        file,
        &settings.thumbprint,
        settings.timestamp_server.as_deref(),
    ) {
        SignOutcome::Signed if was_signed => FileOutcome::Resigned,
        SignOutcome::Signed => FileOutcome::SignedNew,
        SignOutcome::Failed(message) => {
            FileOutcome::Failed(format!("{}: {}", file.display(), message))
        }
        SignOutcome::Unknown(_) => FileOutcome::Unknown,
    }
}

/// Sign the staged file set. Independent files are signed concurrently;
/// counters are merged afterwards and never depend on completion order.
pub fn sign_staging(
    staging: &Path,
    settings: &SigningSettings,
    tool: &dyn SigningTool,
    ctx: &RunContext,
) -> SigningReport {
    let matched = expand_includes(staging, settings);
    let after_exclude: Vec<PathBuf> = matched
        .iter()
        .filter(|f| !is_excluded(staging, f, settings))
        .cloned()
        .collect();

    let mut report = SigningReport {
        thumbprint: settings.thumbprint.clone(),
        matched: matched.len(),
        after_exclude: after_exclude.len(),
        ..Default::default()
    };

    let outcomes = workers::run_bounded(after_exclude, ctx.concurrency, &ctx.cancel, |_, file| {
        process_file(&file, settings, tool)
    });

    for outcome in outcomes.into_iter().flatten() {
        match outcome {
            FileOutcome::AlreadyThisCert => report.already_signed_by_this_cert += 1,
            FileOutcome::AlreadyOtherCert => report.already_signed_other += 1,
            FileOutcome::SignedNew => {
                report.attempted += 1;
                report.signed_new += 1;
            }
            FileOutcome::Resigned => {
                report.attempted += 1;
                report.resigned += 1;
            }
            FileOutcome::Failed(message) => {
                report.attempted += 1;
                report.failed += 1;
                if report.failed_files.len() < MAX_REPORTED_FAILURES {
                    report.failed_files.push(message);
                }
            }
            FileOutcome::Unknown => {
                report.attempted += 1;
                report.unknown_error += 1;
            }
        }
    }

    report.success = report.failed == 0;
    log_status!(
        "sign",
        "{} matched, {} signed, {} re-signed, {} failed",
        report.matched,
        report.signed_new,
        report.resigned,
        report.failed
    );
    report
}

// ============================================================================
// Command-line signing tool
// ============================================================================

/// Signing tool shelling out to an external signer with `verify` and `sign`
/// subcommands. Every call runs under a hard timeout; a timed-out sign is a
/// failure, never a hang.
pub struct CommandSigningTool {
    program: String,
    timeout: Duration,
}

impl CommandSigningTool {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl SigningTool for CommandSigningTool {
    fn query_status(&self, file: &Path, thumbprint: &str) -> Result<SignatureStatus> {
        let file_arg = file.to_string_lossy();
        let output = command::run_with_timeout(
            &self.program,
            &["verify", &file_arg],
            None,
            self.timeout,
            "query signature status",
        )?;

        let stdout = output.stdout.trim();
        if !output.success || stdout.starts_with("NotSigned") {
            return Ok(SignatureStatus::NotSigned);
        }
        match stdout.strip_prefix("SignedBy ") {
            Some(signer) if signer.trim().eq_ignore_ascii_case(thumbprint) => {
                Ok(SignatureStatus::SignedByThisCertificate)
            }
            Some(_) => Ok(SignatureStatus::SignedByOtherCertificate),
            None => Ok(SignatureStatus::NotSigned),
        }
    }

    fn sign(&self, file: &Path, thumbprint: &str, timestamp_server: Option<&str>) -> SignOutcome {
        let file_arg = file.to_string_lossy();
        let mut args = vec!["sign", "--thumbprint", thumbprint];
        if let Some(server) = timestamp_server {
            args.push("--timestamp-server");
            args.push(server);
        }
        args.push(&file_arg);

        match command::run_with_timeout(&self.program, &args, None, self.timeout, "sign file") {
            Ok(output) if output.success => SignOutcome::Signed,
            // Exit code 2 is the signer's deterministic rejection code.
            Ok(output) if output.exit_code == 2 => SignOutcome::Failed(output.error_text()),
            Ok(output) => SignOutcome::Unknown(output.error_text()),
            Err(e) => SignOutcome::Failed(e.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Tool tracking signatures in memory, keyed by file path.
    struct FakeTool {
        signatures: Mutex<HashMap<PathBuf, String>>,
        sign_calls: AtomicUsize,
        fail_suffix: Option<String>,
    }

    impl FakeTool {
        fn new() -> Self {
            Self {
                signatures: Mutex::new(HashMap::new()),
                sign_calls: AtomicUsize::new(0),
                fail_suffix: None,
            }
        }
    }

    impl SigningTool for FakeTool {
        fn query_status(&self, file: &Path, thumbprint: &str) -> Result<SignatureStatus> {
            Ok(match self.signatures.lock().unwrap().get(file) {
                None => SignatureStatus::NotSigned,
                Some(signer) if signer == thumbprint => SignatureStatus::SignedByThisCertificate,
                Some(_) => SignatureStatus::SignedByOtherCertificate,
            })
        }

        fn sign(&self, file: &Path, thumbprint: &str, _ts: Option<&str>) -> SignOutcome {
            self.sign_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(suffix) = &self.fail_suffix {
                if file.to_string_lossy().ends_with(suffix.as_str()) {
                    return SignOutcome::Failed("certificate rejected".to_string());
                }
            }
            self.signatures
                .lock()
                .unwrap()
                .insert(file.to_path_buf(), thumbprint.to_string());
            SignOutcome::Signed
        }
    }

    fn settings(overwrite: bool) -> SigningSettings {
        SigningSettings {
            thumbprint: "AABBCC".to_string(),
            include: vec!["**/*.ps1".to_string()],
            exclude_patterns: vec!["ignored/**".to_string()],
            exclude_paths: vec!["skipme".to_string()],
            overwrite_signed: overwrite,
            timestamp_server: None,
        }
    }

    fn ctx() -> RunContext {
        RunContext {
            run_id: "sign-test".to_string(),
            temp_root: std::env::temp_dir(),
            command_timeout: Duration::from_secs(5),
            concurrency: 2,
            cancel: CancelToken::new(),
            publish_credentials: Vec::new(),
        }
    }

    fn staging_with_scripts() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::create_dir_all(dir.path().join("ignored")).unwrap();
        std::fs::write(dir.path().join("main.ps1"), "function A {}").unwrap();
        std::fs::write(dir.path().join("lib/helper.ps1"), "function B {}").unwrap();
        std::fs::write(dir.path().join("lib/skipme.ps1"), "function C {}").unwrap();
        std::fs::write(dir.path().join("ignored/out.ps1"), "function D {}").unwrap();
        std::fs::write(dir.path().join("readme.md"), "docs").unwrap();
        dir
    }

    #[test]
    fn signs_unsigned_files_and_honors_excludes() {
        let staging = staging_with_scripts();
        let tool = FakeTool::new();

        let report = sign_staging(staging.path(), &settings(false), &tool, &ctx());

        assert_eq!(report.matched, 4);
        assert_eq!(report.after_exclude, 2);
        assert_eq!(report.signed_new, 2);
        assert_eq!(report.resigned, 0);
        assert!(report.success);
    }

    #[test]
    fn second_run_attempts_nothing_without_overwrite() {
        let staging = staging_with_scripts();
        let tool = FakeTool::new();
        let context = ctx();

        sign_staging(staging.path(), &settings(false), &tool, &context);
        let calls_after_first = tool.sign_calls.load(Ordering::SeqCst);

        let report = sign_staging(staging.path(), &settings(false), &tool, &context);

        assert_eq!(tool.sign_calls.load(Ordering::SeqCst), calls_after_first);
        assert_eq!(report.attempted, 0);
        assert_eq!(report.already_signed_by_this_cert, 2);
        assert!(report.success);
    }

    #[test]
    fn overwrite_resigns_files_signed_by_another_certificate() {
        let staging = staging_with_scripts();
        let tool = FakeTool::new();
        tool.signatures.lock().unwrap().insert(
            staging.path().join("main.ps1"),
            "OTHER".to_string(),
        );

        let report = sign_staging(staging.path(), &settings(true), &tool, &ctx());

        assert_eq!(report.resigned, 1);
        assert_eq!(report.signed_new, 1);
        assert!(report.success);
    }

    #[test]
    fn other_certificate_without_overwrite_is_counted_not_attempted() {
        let staging = staging_with_scripts();
        let tool = FakeTool::new();
        tool.signatures.lock().unwrap().insert(
            staging.path().join("main.ps1"),
            "OTHER".to_string(),
        );

        let report = sign_staging(staging.path(), &settings(false), &tool, &ctx());

        assert_eq!(report.already_signed_other, 1);
        assert_eq!(report.signed_new, 1);
        assert_eq!(report.attempted, 1);
    }

    #[test]
    fn failures_are_counted_and_success_flips() {
        let staging = staging_with_scripts();
        let mut tool = FakeTool::new();
        tool.fail_suffix = Some("helper.ps1".to_string());

        let report = sign_staging(staging.path(), &settings(false), &tool, &ctx());

        assert_eq!(report.failed, 1);
        assert!(!report.success);
        assert_eq!(report.failed_files.len(), 1);
        assert!(report.failed_files[0].contains("certificate rejected"));
    }
}
