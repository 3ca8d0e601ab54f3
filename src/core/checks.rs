//! Validation-stage checks: file consistency, edition compatibility, and
//! staged-module validation.
//!
//! Findings are data, not exceptions: each check yields a report with a
//! `Pass | Warning | Fail` status, and only a `Fail` — produced when the
//! caller's threshold configuration is breached — aborts the pipeline.

use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::manifest::ManifestEditor;
use crate::plan::{CompatibilitySettings, ConsistencySettings, Plan};
use crate::staging::StagedModule;
use crate::utils::{io, paths};

const MAX_REPORTED_ISSUES: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIssue {
    pub path: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub check: String,
    pub status: CheckStatus,
    pub scanned: usize,
    pub flagged: usize,
    pub flagged_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_percent: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<CheckIssue>,
}

impl CheckReport {
    pub fn fails_run(&self) -> bool {
        self.status == CheckStatus::Fail
    }

    fn from_findings(
        check: &str,
        scanned: usize,
        issues: Vec<CheckIssue>,
        threshold_percent: Option<f64>,
    ) -> Self {
        let flagged = issues.len();
        let flagged_percent = if scanned == 0 {
            0.0
        } else {
            (flagged as f64 / scanned as f64) * 100.0
        };

        let status = if flagged == 0 {
            CheckStatus::Pass
        } else {
            match threshold_percent {
                Some(threshold) if flagged_percent > threshold => CheckStatus::Fail,
                _ => CheckStatus::Warning,
            }
        };

        let mut truncated = issues;
        truncated.truncate(MAX_REPORTED_ISSUES);

        Self {
            check: check.to_string(),
            status,
            scanned,
            flagged,
            flagged_percent,
            threshold_percent,
            issues: truncated,
        }
    }
}

fn is_checked_text_file(path: &Path, script_extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    script_extensions.iter().any(|s| s == ext) || matches!(ext, "json" | "md" | "txt")
}

/// Check encoding and line endings of text files under a root.
pub fn check_consistency(
    root: &Path,
    settings: &ConsistencySettings,
    script_extensions: &[String],
    check_name: &str,
) -> Result<CheckReport> {
    let mut scanned = 0;
    let mut issues = Vec::new();

    for file in io::collect_files(root, "scan for consistency")? {
        if !is_checked_text_file(&file, script_extensions) {
            continue;
        }
        scanned += 1;
        let relative = paths::relative_display(root, &file);
        let bytes = io::read_bytes(&file, "read file for consistency")?;

        if settings.encoding.eq_ignore_ascii_case("utf-8") {
            if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
                issues.push(CheckIssue {
                    path: relative.clone(),
                    detail: "UTF-8 byte order mark present".to_string(),
                });
                continue;
            }
            if std::str::from_utf8(&bytes).is_err() {
                issues.push(CheckIssue {
                    path: relative.clone(),
                    detail: "Not valid UTF-8".to_string(),
                });
                continue;
            }
        }

        let content = String::from_utf8_lossy(&bytes);
        let flagged = match settings.line_ending.as_str() {
            "crlf" => content.replace("\r\n", "").contains('\n'),
            // "lf" and anything else defaults to rejecting CRLF
            _ => content.contains("\r\n"),
        };
        if flagged {
            issues.push(CheckIssue {
                path: relative,
                detail: format!("Line endings differ from '{}'", settings.line_ending),
            });
        }
    }

    Ok(CheckReport::from_findings(
        check_name,
        scanned,
        issues,
        settings.max_inconsistency_percent,
    ))
}

/// Scan staged script files for edition-incompatible constructs.
pub fn check_compatibility(
    staging: &Path,
    settings: &CompatibilitySettings,
    script_extensions: &[String],
) -> Result<CheckReport> {
    let patterns: Vec<regex::Regex> = settings
        .incompatible_patterns
        .iter()
        .filter_map(|p| regex::Regex::new(p).ok())
        .collect();

    let mut scanned = 0;
    let mut issues = Vec::new();

    for file in io::collect_files(staging, "scan for compatibility")? {
        let Some(ext) = file.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !script_extensions.iter().any(|s| s == ext) {
            continue;
        }
        scanned += 1;
        let content = io::read_file(&file, "read file for compatibility")?;
        for pattern in &patterns {
            if let Some(found) = pattern.find(&content) {
                issues.push(CheckIssue {
                    path: paths::relative_display(staging, &file),
                    detail: format!("Incompatible construct: {}", found.as_str().trim()),
                });
                break;
            }
        }
    }

    // The threshold is declared as a minimum *compatible* percentage;
    // convert to the flagged percentage the report works in.
    let threshold = settings.min_compatible_percent.map(|min| 100.0 - min);
    Ok(CheckReport::from_findings(
        "compatibility",
        scanned,
        issues,
        threshold,
    ))
}

/// Validate the staged module: manifest readable, identity fields patched,
/// declared exports present in the computed export set.
pub fn check_module(
    plan: &Plan,
    staged: &StagedModule,
    editor: &dyn ManifestEditor,
) -> CheckReport {
    let mut issues = Vec::new();

    match editor.read_metadata(&staged.manifest_path) {
        Err(e) => issues.push(CheckIssue {
            path: paths::file_name(&staged.manifest_path),
            detail: format!("Manifest unreadable: {}", e.message),
        }),
        Ok(metadata) => {
            if metadata.name != plan.module_name {
                issues.push(CheckIssue {
                    path: paths::file_name(&staged.manifest_path),
                    detail: format!(
                        "Manifest name '{}' differs from module '{}'",
                        metadata.name, plan.module_name
                    ),
                });
            }
            if metadata.version != plan.resolved_version {
                issues.push(CheckIssue {
                    path: paths::file_name(&staged.manifest_path),
                    detail: format!(
                        "Manifest version '{}' differs from resolved '{}'",
                        metadata.version, plan.resolved_version
                    ),
                });
            }
            if plan.validation.require_exports_match {
                for function in &metadata.functions_to_export {
                    if !staged.exports.functions.contains(function) {
                        issues.push(CheckIssue {
                            path: paths::file_name(&staged.manifest_path),
                            detail: format!(
                                "Exported function '{}' not found in staged sources",
                                function
                            ),
                        });
                    }
                }
            }
        }
    }

    // Any finding here is structural; there is no percentage threshold.
    let scanned = 1;
    let mut report = CheckReport::from_findings("module", scanned, issues, Some(0.0));
    if report.flagged > 0 {
        report.status = CheckStatus::Fail;
    }
    report
}
