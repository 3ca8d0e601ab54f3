//! Local installation under a versioning strategy.
//!
//! For each destination root the installer detects legacy flat installs,
//! copies the staged module into a version-named subfolder, and prunes older
//! versions beyond the retention count. Preserved folder names are never
//! deleted, and each root is an independent failure domain.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::manifest::{self, ManifestEditor, ManifestPatch};
use crate::plan::Plan;
use crate::spec::{InstallStrategy, LegacyFlatHandling};
use crate::staging::{copy_module_tree, StagedModule};
use crate::utils::paths;
use crate::version;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "handling", rename_all = "camelCase")]
pub enum LegacyFlatOutcome {
    Warned,
    Migrated { to_version: String },
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootInstallResult {
    pub root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy: Option<LegacyFlatOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pruned: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preserved: Vec<String>,
    pub manifest_rewritten: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallReport {
    pub version: String,
    pub roots: Vec<RootInstallResult>,
    pub success: bool,
}

/// Version-named subdirectories of a module directory.
fn version_folders(module_dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(module_dir) else {
        return Vec::new();
    };
    let mut folders: Vec<(String, PathBuf)> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            version::parse_lenient(&name).map(|_| (name, e.path()))
        })
        .collect();
    folders.sort_by(|a, b| {
        version::compare(&b.0, &a.0).unwrap_or(std::cmp::Ordering::Equal)
    });
    folders
}

/// A legacy flat install is a module living directly under `<root>/<Name>`
/// with no version subfolder.
fn detect_legacy_flat(module_dir: &Path, module_name: &str) -> bool {
    module_dir.is_dir()
        && manifest::manifest_path(module_dir, module_name).is_file()
        && version_folders(module_dir).is_empty()
}

fn migrate_legacy_flat(
    module_dir: &Path,
    module_name: &str,
    fallback_version: &str,
    editor: &dyn ManifestEditor,
) -> Result<String> {
    // The flat manifest's declared version names the first versioned folder;
    // an unreadable manifest falls back to the resolved version.
    let flat_manifest = manifest::manifest_path(module_dir, module_name);
    let flat_version = editor
        .read_metadata(&flat_manifest)
        .ok()
        .map(|m| m.version)
        .filter(|v| version::parse_lenient(v).is_some())
        .unwrap_or_else(|| fallback_version.to_string());

    let target = module_dir.join(&flat_version);
    std::fs::create_dir_all(&target)
        .map_err(|e| Error::install_failed(e.to_string(), None))?;

    let entries = std::fs::read_dir(module_dir)
        .map_err(|e| Error::install_failed(e.to_string(), None))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path == target {
            continue;
        }
        let destination = target.join(entry.file_name());
        std::fs::rename(&path, &destination)
            .map_err(|e| Error::install_failed(e.to_string(), None))?;
    }

    log_status!(
        "install",
        "Migrated legacy flat install of {} into {}",
        module_name,
        flat_version
    );
    Ok(flat_version)
}

fn prune_versions(
    plan: &Plan,
    module_dir: &Path,
    result: &mut RootInstallResult,
) -> Result<()> {
    let folders = version_folders(module_dir);

    let keep_count = match plan.install.strategy {
        InstallStrategy::Exact => 0,
        InstallStrategy::AutoRevision => plan.install.keep_versions as usize,
    };

    let mut retained = 0;
    for (name, path) in folders {
        let is_current = name == plan.resolved_version;
        let keep = match plan.install.strategy {
            // Exact only ever keeps the currently resolved version.
            InstallStrategy::Exact => is_current,
            InstallStrategy::AutoRevision => is_current || retained < keep_count,
        };

        if keep {
            retained += 1;
            continue;
        }
        if plan.install.preserve_versions.iter().any(|p| p == &name) {
            result.preserved.push(name);
            continue;
        }

        match std::fs::remove_dir_all(&path) {
            Ok(()) => result.pruned.push(name),
            Err(e) if plan.fail_on_delete_error => {
                return Err(Error::install_failed(
                    format!("Failed to prune version {}: {}", name, e),
                    Some(result.root.clone()),
                ));
            }
            Err(e) => {
                result
                    .warnings
                    .push(format!("Failed to prune version {}: {}", name, e));
            }
        }
    }
    Ok(())
}

fn install_into_root(
    root: &str,
    plan: &Plan,
    staged: &StagedModule,
    editor: &dyn ManifestEditor,
) -> RootInstallResult {
    let mut result = RootInstallResult {
        root: root.to_string(),
        installed_path: None,
        legacy: None,
        pruned: Vec::new(),
        preserved: Vec::new(),
        manifest_rewritten: false,
        warnings: Vec::new(),
        error: None,
    };

    let outcome: Result<()> = (|| {
        let root_path = paths::expand(root);
        let module_dir = root_path.join(&plan.module_name);

        if detect_legacy_flat(&module_dir, &plan.module_name) {
            match plan.install.legacy_flat {
                LegacyFlatHandling::Warn => {
                    log_status!(
                        "install",
                        "Legacy flat install of {} found at {}",
                        plan.module_name,
                        module_dir.display()
                    );
                    result.legacy = Some(LegacyFlatOutcome::Warned);
                }
                LegacyFlatHandling::Migrate => {
                    let to_version = migrate_legacy_flat(
                        &module_dir,
                        &plan.module_name,
                        &plan.resolved_version,
                        editor,
                    )?;
                    result.legacy = Some(LegacyFlatOutcome::Migrated { to_version });
                }
                LegacyFlatHandling::Ignore => {
                    result.legacy = Some(LegacyFlatOutcome::Ignored);
                }
            }
        }

        let target = module_dir.join(&plan.resolved_version);
        if target.exists() {
            std::fs::remove_dir_all(&target)
                .map_err(|e| Error::install_failed(e.to_string(), Some(root.to_string())))?;
        }
        copy_module_tree(&staged.staging_path, &target)
            .map_err(|e| Error::install_failed(e.message, Some(root.to_string())))?;
        result.installed_path = Some(target.to_string_lossy().to_string());

        if plan.install.update_manifest_to_resolved_version {
            let manifest_path = manifest::manifest_path(&target, &plan.module_name);
            let patch = ManifestPatch {
                version: Some(plan.resolved_version.clone()),
                ..Default::default()
            };
            editor
                .write_metadata(&manifest_path, &patch)
                .map_err(|e| Error::install_failed(e.message, Some(root.to_string())))?;
            result.manifest_rewritten = true;
        }

        prune_versions(plan, &module_dir, &mut result)
    })();

    if let Err(e) = outcome {
        result.error = Some(e.message);
    }
    result
}

/// Install the staged module into every destination root.
pub fn install_module(
    plan: &Plan,
    staged: &StagedModule,
    editor: &dyn ManifestEditor,
) -> InstallReport {
    let roots: Vec<RootInstallResult> = plan
        .install
        .roots
        .iter()
        .map(|root| install_into_root(root, plan, staged, editor))
        .collect();

    let success = roots.iter().all(|r| r.error.is_none());
    InstallReport {
        version: plan.resolved_version.clone(),
        roots,
        success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::JsonManifestEditor;
    use crate::plan::{build_plan, StaticVersionLookup};
    use crate::spec::ModuleSpec;
    use crate::staging::ExportSet;
    use tempfile::tempdir;

    fn plan_with_install(dir: &Path, install: &str, version: &str) -> Plan {
        std::fs::create_dir_all(dir.join("src")).unwrap();
        let raw = format!(
            r#"{{
                "schemaVersion": 1,
                "build": {{
                    "moduleName": "Sample",
                    "sourceRoot": "{}",
                    "projectRoot": "{}",
                    "versionExpression": "{}"
                }},
                "install": {}
            }}"#,
            dir.join("src").display(),
            dir.display(),
            version,
            install
        );
        let spec = ModuleSpec::from_json(&raw).unwrap();
        build_plan(&spec, &StaticVersionLookup::default()).unwrap()
    }

    fn staged(dir: &Path) -> StagedModule {
        let staging = dir.join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(
            staging.join("Sample.json"),
            r#"{"name":"Sample","version":"0.0.0"}"#,
        )
        .unwrap();
        std::fs::write(staging.join("Sample.psm1"), "function Get-Sample {}").unwrap();
        StagedModule {
            staging_path: staging.clone(),
            manifest_path: staging.join("Sample.json"),
            exports: ExportSet::default(),
        }
    }

    fn install_spec(dir: &Path, extra: &str) -> String {
        format!(
            r#"{{"enabled": true, "roots": ["{}"]{}}}"#,
            dir.join("modules").display(),
            extra
        )
    }

    fn seed_versions(root: &Path, versions: &[&str]) {
        for version in versions {
            let dir = root.join("modules/Sample").join(version);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("Sample.json"), r#"{"name":"Sample"}"#).unwrap();
        }
    }

    #[test]
    fn installs_into_version_folder_and_rewrites_manifest() {
        let dir = tempdir().unwrap();
        let plan = plan_with_install(dir.path(), &install_spec(dir.path(), ""), "2.0.0");
        let staged = staged(dir.path());

        let report = install_module(&plan, &staged, &JsonManifestEditor::new());

        assert!(report.success);
        let installed = dir.path().join("modules/Sample/2.0.0");
        assert!(installed.join("Sample.psm1").exists());
        let metadata = JsonManifestEditor::new()
            .read_metadata(&installed.join("Sample.json"))
            .unwrap();
        assert_eq!(metadata.version, "2.0.0");
        assert!(report.roots[0].manifest_rewritten);
    }

    #[test]
    fn keep_staged_version_skips_manifest_rewrite() {
        let dir = tempdir().unwrap();
        let plan = plan_with_install(
            dir.path(),
            &install_spec(dir.path(), r#", "updateManifestToResolvedVersion": false"#),
            "2.0.0",
        );
        let staged = staged(dir.path());

        let report = install_module(&plan, &staged, &JsonManifestEditor::new());

        assert!(report.success);
        let metadata = JsonManifestEditor::new()
            .read_metadata(&dir.path().join("modules/Sample/2.0.0/Sample.json"))
            .unwrap();
        assert_eq!(metadata.version, "0.0.0");
        assert!(!report.roots[0].manifest_rewritten);
    }

    #[test]
    fn auto_revision_keeps_the_retention_count() {
        let dir = tempdir().unwrap();
        seed_versions(dir.path(), &["1.0.0", "1.1.0", "1.2.0", "1.3.0", "1.4.0"]);
        let plan = plan_with_install(
            dir.path(),
            &install_spec(dir.path(), r#", "strategy": "AutoRevision", "keepVersions": 3"#),
            "2.0.0",
        );
        let staged = staged(dir.path());

        let report = install_module(&plan, &staged, &JsonManifestEditor::new());

        assert!(report.success, "errors: {:?}", report.roots[0].error);
        let remaining = std::fs::read_dir(dir.path().join("modules/Sample"))
            .unwrap()
            .count();
        // keepVersions bounds the total folder count, new install included.
        assert_eq!(remaining, 3);
        assert!(dir.path().join("modules/Sample/2.0.0").exists());
        assert!(dir.path().join("modules/Sample/1.4.0").exists());
        assert!(!dir.path().join("modules/Sample/1.0.0").exists());
        assert_eq!(report.roots[0].pruned.len(), 3);
    }

    #[test]
    fn preserved_versions_survive_pruning() {
        let dir = tempdir().unwrap();
        seed_versions(dir.path(), &["1.0.0", "1.1.0", "1.2.0", "1.3.0", "1.4.0"]);
        let plan = plan_with_install(
            dir.path(),
            &install_spec(
                dir.path(),
                r#", "keepVersions": 2, "preserveVersions": ["1.0.0"]"#,
            ),
            "2.0.0",
        );
        let staged = staged(dir.path());

        let report = install_module(&plan, &staged, &JsonManifestEditor::new());

        assert!(report.success);
        assert!(dir.path().join("modules/Sample/1.0.0").exists());
        assert_eq!(report.roots[0].preserved, vec!["1.0.0"]);
        assert!(!dir.path().join("modules/Sample/1.1.0").exists());
    }

    #[test]
    fn exact_strategy_keeps_only_the_resolved_version() {
        let dir = tempdir().unwrap();
        seed_versions(dir.path(), &["1.0.0", "1.5.0"]);
        let plan = plan_with_install(
            dir.path(),
            &install_spec(dir.path(), r#", "strategy": "Exact""#),
            "2.0.0",
        );
        let staged = staged(dir.path());

        let report = install_module(&plan, &staged, &JsonManifestEditor::new());

        assert!(report.success);
        let remaining: Vec<String> = std::fs::read_dir(dir.path().join("modules/Sample"))
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(remaining, vec!["2.0.0"]);
    }

    #[test]
    fn legacy_flat_install_is_migrated_into_version_folder() {
        let dir = tempdir().unwrap();
        let flat = dir.path().join("modules/Sample");
        std::fs::create_dir_all(&flat).unwrap();
        std::fs::write(
            flat.join("Sample.json"),
            r#"{"name":"Sample","version":"0.9.0"}"#,
        )
        .unwrap();
        std::fs::write(flat.join("Sample.psm1"), "function Old {}").unwrap();

        let plan = plan_with_install(
            dir.path(),
            &install_spec(dir.path(), r#", "legacyFlatHandling": "Migrate""#),
            "1.0.0",
        );
        let staged = staged(dir.path());

        let report = install_module(&plan, &staged, &JsonManifestEditor::new());

        assert!(report.success);
        assert_eq!(
            report.roots[0].legacy,
            Some(LegacyFlatOutcome::Migrated {
                to_version: "0.9.0".to_string()
            })
        );
        assert!(flat.join("0.9.0/Sample.psm1").exists());
        assert!(flat.join("1.0.0/Sample.psm1").exists());
        assert!(!flat.join("Sample.psm1").exists());
    }

    #[test]
    fn legacy_flat_warn_leaves_it_in_place() {
        let dir = tempdir().unwrap();
        let flat = dir.path().join("modules/Sample");
        std::fs::create_dir_all(&flat).unwrap();
        std::fs::write(
            flat.join("Sample.json"),
            r#"{"name":"Sample","version":"0.9.0"}"#,
        )
        .unwrap();

        let plan = plan_with_install(dir.path(), &install_spec(dir.path(), ""), "1.0.0");
        let staged = staged(dir.path());

        let report = install_module(&plan, &staged, &JsonManifestEditor::new());

        assert!(report.success);
        assert_eq!(report.roots[0].legacy, Some(LegacyFlatOutcome::Warned));
        assert!(flat.join("Sample.json").exists());
        assert!(flat.join("1.0.0/Sample.psm1").exists());
    }

    #[test]
    fn one_failing_root_does_not_block_the_next() {
        let dir = tempdir().unwrap();
        let good_root = dir.path().join("modules");
        let raw = format!(
            r#"{{"enabled": true, "roots": ["/proc/invalid-shipwright-root", "{}"]}}"#,
            good_root.display()
        );
        let plan = plan_with_install(dir.path(), &raw, "1.0.0");
        let staged = staged(dir.path());

        let report = install_module(&plan, &staged, &JsonManifestEditor::new());

        assert!(!report.success);
        assert!(report.roots[0].error.is_some());
        assert!(report.roots[1].error.is_none());
        assert!(good_root.join("Sample/1.0.0").exists());
    }
}
