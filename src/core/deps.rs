//! Dependency resolution and installation.
//!
//! For each declared dependency the resolver decides one of
//! `Skipped | Satisfied | Installed | Updated | Failed` and, unless skipped,
//! drives the installer boundary. Installer errors are captured into the
//! per-module result and never re-thrown past this step. Independent modules
//! are processed by a bounded worker pool.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::manifest::{DependencySpec, VersionConstraint};
use crate::plan::ImportSettings;
use crate::utils::{command, workers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyStatus {
    Skipped,
    Satisfied,
    Installed,
    Updated,
    Failed,
}

/// Per-module outcome. Produced fresh each run; never cached across runs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyResult {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_version: Option<String>,
    pub constraint: String,
    pub status: DependencyStatus,
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Installer boundary: local inspection plus install/update/save operations.
pub trait ModuleInstaller: Send + Sync {
    fn tool_name(&self) -> &str;
    /// Versions of a module currently installed on this machine.
    fn installed_versions(&self, name: &str) -> Result<Vec<String>>;
    /// Install the newest version satisfying the constraint; returns it.
    fn install(&self, name: &str, constraint: &VersionConstraint) -> Result<String>;
    /// Update to the newest version satisfying the constraint; returns it.
    fn update(&self, name: &str, constraint: &VersionConstraint) -> Result<String>;
    /// Local directory of an installed module, when the tool exposes one.
    fn local_path(&self, name: &str) -> Result<Option<PathBuf>>;
    /// Download a module satisfying the constraint into `destination`.
    fn save(&self, name: &str, constraint: &VersionConstraint, destination: &Path)
        -> Result<String>;
}

/// Highest installed version satisfying the constraint, if any.
fn best_installed(installed: &[String], constraint: &VersionConstraint) -> Option<String> {
    installed
        .iter()
        .filter(|v| constraint.matches(v))
        .max_by(|a, b| {
            crate::version::compare(a, b).unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned()
}

fn resolve_one(
    dep: &DependencySpec,
    settings: &ImportSettings,
    skip_modules: &[String],
    installer: &dyn ModuleInstaller,
) -> DependencyResult {
    let tool = installer.tool_name().to_string();
    let constraint = dep.constraint.describe();

    if settings.skip_all || skip_modules.iter().any(|m| m == &dep.name) {
        return DependencyResult {
            name: dep.name.clone(),
            previous_version: None,
            resolved_version: None,
            constraint,
            status: DependencyStatus::Skipped,
            tool,
            message: None,
        };
    }

    let installed = match installer.installed_versions(&dep.name) {
        Ok(versions) => versions,
        Err(e) => {
            return DependencyResult {
                name: dep.name.clone(),
                previous_version: None,
                resolved_version: None,
                constraint,
                status: DependencyStatus::Failed,
                tool,
                message: Some(e.message),
            };
        }
    };

    let compatible = best_installed(&installed, &dep.constraint);
    let previous = installed.last().cloned();

    match (&compatible, settings.force) {
        // A compatible version without Force is satisfied with zero
        // network calls.
        (Some(version), false) => DependencyResult {
            name: dep.name.clone(),
            previous_version: Some(version.clone()),
            resolved_version: Some(version.clone()),
            constraint,
            status: DependencyStatus::Satisfied,
            tool,
            message: None,
        },
        (Some(version), true) => match installer.update(&dep.name, &dep.constraint) {
            Ok(updated) => DependencyResult {
                name: dep.name.clone(),
                previous_version: Some(version.clone()),
                resolved_version: Some(updated),
                constraint,
                status: DependencyStatus::Updated,
                tool,
                message: None,
            },
            Err(e) => DependencyResult {
                name: dep.name.clone(),
                previous_version: Some(version.clone()),
                resolved_version: None,
                constraint,
                status: DependencyStatus::Failed,
                tool,
                message: Some(e.message),
            },
        },
        (None, _) => match installer.install(&dep.name, &dep.constraint) {
            Ok(version) => DependencyResult {
                name: dep.name.clone(),
                previous_version: previous,
                resolved_version: Some(version),
                constraint,
                status: DependencyStatus::Installed,
                tool,
                message: None,
            },
            Err(e) => DependencyResult {
                name: dep.name.clone(),
                previous_version: previous,
                resolved_version: None,
                constraint,
                status: DependencyStatus::Failed,
                tool,
                message: Some(e.message),
            },
        },
    }
}

/// Resolve and install every declared dependency.
///
/// Items cancelled before starting are reported as `Skipped` with a message;
/// the aggregate never depends on completion order.
pub fn install_dependencies(
    deps: &[DependencySpec],
    settings: &ImportSettings,
    skip_modules: &[String],
    installer: &dyn ModuleInstaller,
    ctx: &RunContext,
) -> Vec<DependencyResult> {
    if !settings.include_required || deps.is_empty() {
        return Vec::new();
    }

    let concurrency = settings.concurrency.unwrap_or(ctx.concurrency);
    let slots = workers::run_bounded(deps.to_vec(), concurrency, &ctx.cancel, |_, dep| {
        resolve_one(&dep, settings, skip_modules, installer)
    });

    slots
        .into_iter()
        .zip(deps)
        .map(|(slot, dep)| {
            slot.unwrap_or_else(|| DependencyResult {
                name: dep.name.clone(),
                previous_version: None,
                resolved_version: None,
                constraint: dep.constraint.describe(),
                status: DependencyStatus::Skipped,
                tool: installer.tool_name().to_string(),
                message: Some("Run cancelled before this module was processed".to_string()),
            })
        })
        .collect()
}

// ============================================================================
// Command-line installer
// ============================================================================

/// Installer shelling out to an external package-manager CLI that speaks
/// `list/install/update/save` subcommands. Calls run under the context
/// command timeout.
pub struct CommandModuleInstaller {
    program: String,
    timeout: std::time::Duration,
}

impl CommandModuleInstaller {
    pub fn new(program: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn constraint_args(constraint: &VersionConstraint) -> Vec<String> {
        match constraint {
            VersionConstraint::Exact(v) => vec!["--required-version".to_string(), v.clone()],
            VersionConstraint::Range { minimum, maximum } => {
                let mut args = Vec::new();
                if let Some(min) = minimum {
                    args.push("--minimum-version".to_string());
                    args.push(min.clone());
                }
                if let Some(max) = maximum {
                    args.push("--maximum-version".to_string());
                    args.push(max.clone());
                }
                args
            }
        }
    }

    fn run_tool(&self, args: &[String], context: &str) -> Result<String> {
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output =
            command::run_with_timeout(&self.program, &arg_refs, None, self.timeout, context)?;
        if !output.success {
            return Err(Error::command_failed(
                format!("{} failed: {}", context, output.error_text()),
                Some(context.to_string()),
            ));
        }
        Ok(output.stdout.trim().to_string())
    }
}

impl ModuleInstaller for CommandModuleInstaller {
    fn tool_name(&self) -> &str {
        &self.program
    }

    fn installed_versions(&self, name: &str) -> Result<Vec<String>> {
        let args = vec!["list".to_string(), name.to_string(), "--versions".to_string()];
        let stdout = self.run_tool(&args, "list installed modules")?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn install(&self, name: &str, constraint: &VersionConstraint) -> Result<String> {
        let mut args = vec!["install".to_string(), name.to_string()];
        args.extend(Self::constraint_args(constraint));
        self.run_tool(&args, "install module")
    }

    fn update(&self, name: &str, constraint: &VersionConstraint) -> Result<String> {
        let mut args = vec!["update".to_string(), name.to_string()];
        args.extend(Self::constraint_args(constraint));
        self.run_tool(&args, "update module")
    }

    fn local_path(&self, name: &str) -> Result<Option<PathBuf>> {
        let args = vec!["locate".to_string(), name.to_string()];
        let stdout = self.run_tool(&args, "locate module")?;
        if stdout.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PathBuf::from(stdout)))
        }
    }

    fn save(
        &self,
        name: &str,
        constraint: &VersionConstraint,
        destination: &Path,
    ) -> Result<String> {
        let mut args = vec![
            "save".to_string(),
            name.to_string(),
            "--path".to_string(),
            destination.to_string_lossy().to_string(),
        ];
        args.extend(Self::constraint_args(constraint));
        self.run_tool(&args, "save module")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::CancelToken;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory installer recording every mutating call.
    pub(crate) struct FakeInstaller {
        pub installed: Mutex<HashMap<String, Vec<String>>>,
        pub install_calls: AtomicUsize,
        pub update_calls: AtomicUsize,
        pub fail_named: Option<String>,
    }

    impl FakeInstaller {
        pub fn with_installed(entries: &[(&str, &[&str])]) -> Self {
            let map = entries
                .iter()
                .map(|(name, versions)| {
                    (
                        name.to_string(),
                        versions.iter().map(|v| v.to_string()).collect(),
                    )
                })
                .collect();
            Self {
                installed: Mutex::new(map),
                install_calls: AtomicUsize::new(0),
                update_calls: AtomicUsize::new(0),
                fail_named: None,
            }
        }
    }

    impl ModuleInstaller for FakeInstaller {
        fn tool_name(&self) -> &str {
            "fake-installer"
        }

        fn installed_versions(&self, name: &str) -> Result<Vec<String>> {
            Ok(self
                .installed
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .unwrap_or_default())
        }

        fn install(&self, name: &str, constraint: &VersionConstraint) -> Result<String> {
            self.install_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_named.as_deref() == Some(name) {
                return Err(Error::command_failed("registry unreachable", None));
            }
            let version = match constraint {
                VersionConstraint::Exact(v) => v.clone(),
                VersionConstraint::Range { minimum, .. } => {
                    minimum.clone().unwrap_or_else(|| "9.9.9".to_string())
                }
            };
            self.installed
                .lock()
                .unwrap()
                .entry(name.to_string())
                .or_default()
                .push(version.clone());
            Ok(version)
        }

        fn update(&self, name: &str, constraint: &VersionConstraint) -> Result<String> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            self.install(name, constraint)
        }

        fn local_path(&self, _name: &str) -> Result<Option<PathBuf>> {
            Ok(None)
        }

        fn save(
            &self,
            _name: &str,
            _constraint: &VersionConstraint,
            _destination: &Path,
        ) -> Result<String> {
            Ok("1.0.0".to_string())
        }
    }

    fn dep(name: &str, constraint: VersionConstraint) -> DependencySpec {
        DependencySpec {
            name: name.to_string(),
            constraint,
            guid: None,
        }
    }

    fn settings(force: bool, skip_all: bool) -> ImportSettings {
        ImportSettings {
            include_required: true,
            force,
            skip_all,
            concurrency: Some(2),
        }
    }

    fn ctx() -> RunContext {
        RunContext {
            run_id: "deps-test".to_string(),
            temp_root: std::env::temp_dir(),
            command_timeout: std::time::Duration::from_secs(5),
            concurrency: 2,
            cancel: CancelToken::new(),
            publish_credentials: Vec::new(),
        }
    }

    #[test]
    fn satisfied_dependency_triggers_no_installer_calls() {
        let installer = FakeInstaller::with_installed(&[("Helper", &["1.2.0"])]);
        let deps = vec![dep(
            "Helper",
            VersionConstraint::Range {
                minimum: Some("1.0.0".to_string()),
                maximum: None,
            },
        )];

        let results =
            install_dependencies(&deps, &settings(false, false), &[], &installer, &ctx());

        assert_eq!(results[0].status, DependencyStatus::Satisfied);
        assert_eq!(results[0].resolved_version.as_deref(), Some("1.2.0"));
        assert_eq!(installer.install_calls.load(Ordering::SeqCst), 0);
        assert_eq!(installer.update_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_dependency_is_installed() {
        let installer = FakeInstaller::with_installed(&[]);
        let deps = vec![dep("Helper", VersionConstraint::Exact("2.0.0".to_string()))];

        let results =
            install_dependencies(&deps, &settings(false, false), &[], &installer, &ctx());

        assert_eq!(results[0].status, DependencyStatus::Installed);
        assert_eq!(results[0].resolved_version.as_deref(), Some("2.0.0"));
        assert_eq!(installer.install_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn force_updates_a_satisfied_dependency() {
        let installer = FakeInstaller::with_installed(&[("Helper", &["1.2.0"])]);
        let deps = vec![dep(
            "Helper",
            VersionConstraint::Range {
                minimum: Some("1.0.0".to_string()),
                maximum: None,
            },
        )];

        let results = install_dependencies(&deps, &settings(true, false), &[], &installer, &ctx());

        assert_eq!(results[0].status, DependencyStatus::Updated);
        assert_eq!(installer.update_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn skip_all_never_touches_the_installer() {
        let installer = FakeInstaller::with_installed(&[]);
        let deps = vec![dep("Helper", VersionConstraint::any())];

        let results = install_dependencies(&deps, &settings(false, true), &[], &installer, &ctx());

        assert_eq!(results[0].status, DependencyStatus::Skipped);
        assert_eq!(installer.install_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn installer_failure_is_captured_not_thrown() {
        let mut installer = FakeInstaller::with_installed(&[]);
        installer.fail_named = Some("Broken".to_string());
        let deps = vec![
            dep("Broken", VersionConstraint::Exact("1.0.0".to_string())),
            dep("Fine", VersionConstraint::Exact("1.0.0".to_string())),
        ];

        let results =
            install_dependencies(&deps, &settings(false, false), &[], &installer, &ctx());

        assert_eq!(results[0].status, DependencyStatus::Failed);
        assert!(results[0]
            .message
            .as_deref()
            .unwrap()
            .contains("registry unreachable"));
        assert_eq!(results[1].status, DependencyStatus::Installed);
    }

    #[test]
    fn skip_listed_modules_are_skipped_individually() {
        let installer = FakeInstaller::with_installed(&[]);
        let deps = vec![
            dep("Skipped", VersionConstraint::any()),
            dep("Wanted", VersionConstraint::Exact("1.0.0".to_string())),
        ];

        let results = install_dependencies(
            &deps,
            &settings(false, false),
            &["Skipped".to_string()],
            &installer,
            &ctx(),
        );

        assert_eq!(results[0].status, DependencyStatus::Skipped);
        assert_eq!(results[1].status, DependencyStatus::Installed);
    }
}
