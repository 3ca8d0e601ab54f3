//! Staging directory ownership and the build-to-staging boundary.
//!
//! A staging directory is exclusively owned by one run. Acquiring the
//! session writes a lock file (`.shipwright.lock`); a lock left behind by a
//! crashed run fails the stage step loudly instead of silently overwriting.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::plan::BuildParameters;
use crate::utils::{io, parser, paths};

pub const LOCK_FILE_NAME: &str = ".shipwright.lock";

/// Exports computed while building to staging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSet {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub functions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub aliases: Vec<String>,
}

/// The staged module produced by the build-to-staging boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedModule {
    pub staging_path: PathBuf,
    pub manifest_path: PathBuf,
    pub exports: ExportSet,
}

/// Lock guarding exclusive staging ownership. Released on orderly shutdown
/// (including failed runs); a surviving lock therefore marks a crashed run.
#[derive(Debug)]
pub struct StagingLock {
    path: PathBuf,
}

impl StagingLock {
    fn acquire(staging_root: &Path, run_id: &str) -> Result<Self> {
        let path = staging_root.join(LOCK_FILE_NAME);
        if path.exists() {
            let holder = std::fs::read_to_string(&path).unwrap_or_default();
            return Err(Error::staging_locked(
                &path.to_string_lossy(),
                vec![
                    format!("Lock holder: {}", holder.trim()),
                    format!(
                        "If no other run is active, remove {} and retry",
                        path.display()
                    ),
                ],
            ));
        }

        let content = json!({
            "runId": run_id,
            "pid": std::process::id(),
            "startedAt": chrono::Utc::now().to_rfc3339(),
        });
        io::write_file(&path, &content.to_string(), "write staging lock")?;
        Ok(Self { path })
    }
}

impl Drop for StagingLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// One run's exclusive hold on a staging directory.
#[derive(Debug)]
pub struct StagingSession {
    pub root: PathBuf,
    pub synthesized: bool,
    _lock: StagingLock,
}

impl StagingSession {
    /// Resolve, clear, and lock the staging directory for this run.
    ///
    /// Explicit staging roots are cleared before use (after the stale-lock
    /// check); synthesized roots are created fresh under the context's temp
    /// root with the run id in the name, so concurrent runs cannot collide.
    pub fn prepare(params: &BuildParameters, ctx: &RunContext) -> Result<Self> {
        match &params.staging_root {
            Some(root) => {
                if root.exists() {
                    // Surface a stale lock before clearing anything.
                    let lock_path = root.join(LOCK_FILE_NAME);
                    if lock_path.exists() {
                        let holder = std::fs::read_to_string(&lock_path).unwrap_or_default();
                        return Err(Error::staging_locked(
                            &lock_path.to_string_lossy(),
                            vec![
                                format!("Lock holder: {}", holder.trim()),
                                format!(
                                    "If no other run is active, remove {} and retry",
                                    lock_path.display()
                                ),
                            ],
                        ));
                    }
                    io::remove_dir_if_exists(root, "clear staging")
                        .map_err(|e| Error::stage_failed(e.message))?;
                }
                io::ensure_dir(root, "create staging")
                    .map_err(|e| Error::stage_failed(e.message))?;
                let lock = StagingLock::acquire(root, &ctx.run_id)?;
                Ok(Self {
                    root: root.clone(),
                    synthesized: false,
                    _lock: lock,
                })
            }
            None => {
                let root = ctx.temp_root.join(format!(
                    "shipwright-{}-{}",
                    params.module_name, ctx.run_id
                ));
                io::ensure_dir(&root, "create staging")
                    .map_err(|e| Error::stage_failed(e.message))?;
                let lock = StagingLock::acquire(&root, &ctx.run_id)?;
                Ok(Self {
                    root,
                    synthesized: true,
                    _lock: lock,
                })
            }
        }
    }
}

/// Copy a staged module tree, skipping run-internal files (the lock file).
/// Returns the number of files copied.
pub fn copy_module_tree(source: &Path, destination: &Path) -> Result<usize> {
    io::ensure_dir(destination, "create install target")?;

    let mut copied = 0;
    for file in io::collect_files(source, "scan staged module")? {
        if paths::file_name(&file) == LOCK_FILE_NAME {
            continue;
        }
        let target = destination.join(file.strip_prefix(source).unwrap_or(&file));
        if let Some(parent) = target.parent() {
            io::ensure_dir(parent, "create install subdirectory")?;
        }
        std::fs::copy(&file, &target)
            .map_err(|e| Error::internal_io(e.to_string(), Some("copy module file".to_string())))?;
        copied += 1;
    }
    Ok(copied)
}

// ============================================================================
// Build-to-staging boundary
// ============================================================================

/// The module-source merge step, consumed as a black box: it fills the
/// staging directory and reports the manifest path plus computed exports.
pub trait StagingBuilder: Send + Sync {
    fn build_to_staging(
        &self,
        params: &BuildParameters,
        staging_root: &Path,
    ) -> Result<StagedModule>;
}

/// Default builder: copies the source tree into staging, applies placeholder
/// substitutions to text files, and scans script files for exports.
pub struct CopyStagingBuilder;

impl CopyStagingBuilder {
    pub fn new() -> Self {
        Self
    }

    fn is_excluded(params: &BuildParameters, relative: &str) -> bool {
        params
            .exclude
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, relative))
    }

    fn is_text_file(params: &BuildParameters, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        params.script_extensions.iter().any(|s| s == ext)
            || matches!(ext, "json" | "md" | "txt")
    }

    fn copy_tree(params: &BuildParameters, source: &Path, staging: &Path) -> Result<usize> {
        let files = io::collect_files(source, "scan source")
            .map_err(|e| Error::stage_failed(e.message))?;

        let mut copied = 0;
        for file in files {
            let relative = paths::relative_display(source, &file);
            if Self::is_excluded(params, &relative) {
                continue;
            }

            let target = staging.join(file.strip_prefix(source).unwrap_or(&file));
            if let Some(parent) = target.parent() {
                io::ensure_dir(parent, "create staging subdirectory")
                    .map_err(|e| Error::stage_failed(e.message))?;
            }

            if Self::is_text_file(params, &file) && !params.placeholders.is_empty() {
                let mut content = io::read_file(&file, "read source file")
                    .map_err(|e| Error::stage_failed(e.message))?;
                for mapping in &params.placeholders {
                    content = content.replace(&mapping.find, &mapping.replace);
                }
                io::write_file(&target, &content, "write staged file")
                    .map_err(|e| Error::stage_failed(e.message))?;
            } else {
                std::fs::copy(&file, &target)
                    .map_err(|e| Error::stage_failed(e.to_string()))?;
            }
            copied += 1;
        }
        Ok(copied)
    }

    fn scan_exports(params: &BuildParameters, staging: &Path) -> Result<ExportSet> {
        const FUNCTION_PATTERN: &str = r"^\s*function\s+([A-Za-z_][\w-]*)";
        const ALIAS_PATTERN: &str = r"^\s*Set-Alias\s+(?:-Name\s+)?([A-Za-z_][\w-]*)";

        // Public/ narrows the export surface when the layout provides it.
        let public_dir = ["public", "Public"]
            .iter()
            .map(|d| staging.join(d))
            .find(|p| p.is_dir());
        let scan_root = public_dir.as_deref().unwrap_or(staging);

        let mut exports = ExportSet::default();
        for file in io::collect_files(scan_root, "scan staged scripts")? {
            let Some(ext) = file.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !params.script_extensions.iter().any(|s| s == ext) {
                continue;
            }
            let content = io::read_file(&file, "read staged script")?;
            for name in parser::extract_all(&content, FUNCTION_PATTERN).unwrap_or_default() {
                if !exports.functions.contains(&name) {
                    exports.functions.push(name);
                }
            }
            for name in parser::extract_all(&content, ALIAS_PATTERN).unwrap_or_default() {
                if !exports.aliases.contains(&name) {
                    exports.aliases.push(name);
                }
            }
        }
        exports.functions.sort();
        exports.aliases.sort();
        Ok(exports)
    }
}

impl Default for CopyStagingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StagingBuilder for CopyStagingBuilder {
    fn build_to_staging(
        &self,
        params: &BuildParameters,
        staging_root: &Path,
    ) -> Result<StagedModule> {
        let copied = Self::copy_tree(params, &params.source_root, staging_root)?;
        if copied == 0 {
            return Err(Error::stage_failed(format!(
                "Source root {} contains no files to stage",
                params.source_root.display()
            )));
        }

        let manifest_path =
            crate::manifest::manifest_path(staging_root, &params.module_name);
        if !manifest_path.is_file() {
            return Err(Error::stage_failed(format!(
                "Staged module has no manifest at {}",
                manifest_path.display()
            )));
        }

        let exports = Self::scan_exports(params, staging_root)?;
        log_status!(
            "build",
            "Staged {} files, {} exported functions",
            copied,
            exports.functions.len()
        );

        Ok(StagedModule {
            staging_path: staging_root.to_path_buf(),
            manifest_path,
            exports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::PlaceHolderMapping;
    use tempfile::tempdir;

    fn params(source: &Path, staging: Option<&Path>) -> BuildParameters {
        BuildParameters {
            module_name: "Sample".to_string(),
            source_root: source.to_path_buf(),
            staging_root: staging.map(Path::to_path_buf),
            exclude: vec!["*.tmp".to_string()],
            placeholders: vec![PlaceHolderMapping {
                find: "{{MODULE}}".to_string(),
                replace: "Sample".to_string(),
            }],
            script_extensions: vec!["ps1".to_string(), "psm1".to_string()],
        }
    }

    fn ctx() -> RunContext {
        RunContext {
            run_id: uuid::Uuid::new_v4().to_string(),
            temp_root: std::env::temp_dir(),
            command_timeout: std::time::Duration::from_secs(5),
            concurrency: 2,
            cancel: crate::context::CancelToken::new(),
            publish_credentials: Vec::new(),
        }
    }

    fn write_source(dir: &Path) {
        std::fs::create_dir_all(dir.join("public")).unwrap();
        std::fs::write(
            dir.join("Sample.json"),
            r#"{"name":"Sample","version":"0.0.0"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("public/Get-Sample.ps1"),
            "function Get-Sample {\n  # {{MODULE}}\n}\nSet-Alias -Name gsa Get-Sample\n",
        )
        .unwrap();
        std::fs::write(dir.join("scratch.tmp"), "ignored").unwrap();
    }

    #[test]
    fn session_acquires_and_releases_lock() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("staging");
        let context = ctx();
        let p = params(dir.path(), Some(&staging));

        {
            let session = StagingSession::prepare(&p, &context).unwrap();
            assert!(session.root.join(LOCK_FILE_NAME).exists());
        }
        assert!(!staging.join(LOCK_FILE_NAME).exists());
    }

    #[test]
    fn stale_lock_fails_loudly() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join(LOCK_FILE_NAME), r#"{"runId":"crashed"}"#).unwrap();

        let err = StagingSession::prepare(&params(dir.path(), Some(&staging)), &ctx()).unwrap_err();
        assert_eq!(err.code.as_str(), "build.staging_locked");
    }

    #[test]
    fn synthesized_staging_embeds_run_id() {
        let dir = tempdir().unwrap();
        write_source(dir.path());
        let context = ctx();
        let session = StagingSession::prepare(&params(dir.path(), None), &context).unwrap();
        assert!(session.synthesized);
        assert!(session.root.to_string_lossy().contains(&context.run_id));
        std::fs::remove_dir_all(&session.root).unwrap();
    }

    #[test]
    fn copy_builder_applies_placeholders_and_excludes() {
        let source = tempdir().unwrap();
        write_source(source.path());
        let staging = tempdir().unwrap();

        let p = params(source.path(), Some(staging.path()));
        let staged = CopyStagingBuilder::new()
            .build_to_staging(&p, staging.path())
            .unwrap();

        let script = std::fs::read_to_string(staging.path().join("public/Get-Sample.ps1")).unwrap();
        assert!(script.contains("# Sample"));
        assert!(!staging.path().join("scratch.tmp").exists());
        assert_eq!(staged.exports.functions, vec!["Get-Sample"]);
        assert_eq!(staged.exports.aliases, vec!["gsa"]);
    }

    #[test]
    fn missing_manifest_is_stage_fatal() {
        let source = tempdir().unwrap();
        std::fs::write(source.path().join("loose.ps1"), "function X {}").unwrap();
        let staging = tempdir().unwrap();

        let err = CopyStagingBuilder::new()
            .build_to_staging(&params(source.path(), Some(staging.path())), staging.path())
            .unwrap_err();
        assert_eq!(err.code.as_str(), "build.stage_failed");
    }
}
