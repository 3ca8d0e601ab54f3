//! Artefact packaging: packed archives, unpacked trees, script bundles.
//!
//! Each artefact segment independently produces one physical output. A
//! failure is captured into that artefact's result; the remaining artefacts
//! in the ordered list are still attempted.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::context::RunContext;
use crate::deps::ModuleInstaller;
use crate::error::{Error, Result};
use crate::plan::Plan;
use crate::segment::{ArtefactKind, ArtefactSegment, RequiredModulesSource};
use crate::staging::StagedModule;
use crate::utils::{io, paths};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtefactResult {
    pub kind: ArtefactKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub path: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub files_copied: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies_bundled: Vec<String>,
    pub cleared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The file a packed artefact produces, with `{name}`/`{version}` expansion.
fn packed_file_name(segment: &ArtefactSegment, plan: &Plan) -> String {
    segment
        .file_name
        .clone()
        .unwrap_or_else(|| "{name}-{version}.zip".to_string())
        .replace("{name}", &plan.module_name)
        .replace("{version}", &plan.resolved_version)
}

fn sha256_of(path: &Path) -> Result<String> {
    let bytes = io::read_bytes(path, "hash artefact")?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn zip_tree(
    writer: &mut zip::ZipWriter<std::fs::File>,
    root: &Path,
    prefix: &str,
) -> Result<usize> {
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut added = 0;
    for file in io::collect_files(root, "scan artefact input")? {
        if paths::file_name(&file) == crate::staging::LOCK_FILE_NAME {
            continue;
        }
        let relative = paths::relative_display(root, &file);
        let entry_name = if prefix.is_empty() {
            relative
        } else {
            format!("{}/{}", prefix, relative)
        };
        writer
            .start_file(entry_name, options)
            .map_err(|e| Error::internal_io(e.to_string(), Some("write archive".to_string())))?;
        let bytes = io::read_bytes(&file, "read artefact input")?;
        writer
            .write_all(&bytes)
            .map_err(|e| Error::internal_io(e.to_string(), Some("write archive".to_string())))?;
        added += 1;
    }
    Ok(added)
}

/// Resolve and stage the required-module trees to bundle, returning
/// `(name, directory)` pairs. Download sources are saved into a per-run
/// temp directory first.
fn bundled_dependency_dirs(
    segment: &ArtefactSegment,
    plan: &Plan,
    installer: &dyn ModuleInstaller,
    ctx: &RunContext,
) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for dep in &plan.required_modules {
        if plan.skip_modules.iter().any(|m| m == &dep.name) {
            continue;
        }
        let dir = match segment.required_modules_source {
            RequiredModulesSource::Local => {
                installer.local_path(&dep.name)?.ok_or_else(|| {
                    Error::internal_unexpected(format!(
                        "Module '{}' is not installed locally; use the Download source",
                        dep.name
                    ))
                })?
            }
            RequiredModulesSource::Download => {
                let target = ctx
                    .temp_root
                    .join(format!("shipwright-bundle-{}-{}", ctx.run_id, dep.name));
                io::ensure_dir(&target, "create bundle directory")?;
                installer.save(&dep.name, &dep.constraint, &target)?;
                target
            }
        };
        dirs.push((dep.name.clone(), dir));
    }
    Ok(dirs)
}

fn produce(
    segment: &ArtefactSegment,
    plan: &Plan,
    staged: &StagedModule,
    out_dir: &Path,
    installer: &dyn ModuleInstaller,
    ctx: &RunContext,
) -> Result<(PathBuf, usize, Vec<String>)> {
    let dependencies = if segment.add_required_modules {
        bundled_dependency_dirs(segment, plan, installer, ctx)?
    } else {
        Vec::new()
    };
    let bundled_names: Vec<String> = dependencies.iter().map(|(n, _)| n.clone()).collect();

    let output = match segment.kind {
        ArtefactKind::Packed => {
            let archive_path = out_dir.join(packed_file_name(segment, plan));
            let file = std::fs::File::create(&archive_path)
                .map_err(|e| Error::internal_io(e.to_string(), Some("create archive".to_string())))?;
            let mut writer = zip::ZipWriter::new(file);

            let mut added = zip_tree(&mut writer, &staged.staging_path, "")?;
            for (name, dir) in &dependencies {
                added += zip_tree(&mut writer, dir, &format!("modules/{}", name))?;
            }
            writer
                .finish()
                .map_err(|e| Error::internal_io(e.to_string(), Some("finish archive".to_string())))?;
            (archive_path, added, bundled_names)
        }
        ArtefactKind::Unpacked => {
            let mut copied = crate::staging::copy_module_tree(&staged.staging_path, out_dir)?;
            for (name, dir) in &dependencies {
                copied += io::copy_dir_recursive(
                    dir,
                    &out_dir.join("modules").join(name),
                    "copy bundled module",
                )?;
            }
            (out_dir.to_path_buf(), copied, bundled_names)
        }
        ArtefactKind::Script => {
            // A script bundle carries the module's root script files only.
            let mut copied = 0;
            for file in io::collect_files(&staged.staging_path, "scan staged scripts")? {
                if file.parent() != Some(staged.staging_path.as_path()) {
                    continue;
                }
                let Some(ext) = file.extension().and_then(|e| e.to_str()) else {
                    continue;
                };
                if !plan.build.script_extensions.iter().any(|s| s == ext) {
                    continue;
                }
                std::fs::copy(&file, out_dir.join(paths::file_name(&file)))
                    .map_err(|e| Error::internal_io(e.to_string(), Some("copy script".to_string())))?;
                copied += 1;
            }
            if copied == 0 {
                return Err(Error::internal_unexpected(format!(
                    "No root script files found for a Script artefact of '{}'",
                    plan.module_name
                )));
            }
            (out_dir.to_path_buf(), copied, bundled_names)
        }
    };

    Ok(output)
}

fn apply_mappings(
    segment: &ArtefactSegment,
    plan: &Plan,
    staged: &StagedModule,
    out_dir: &Path,
) -> Result<usize> {
    let mut copied = 0;
    for mapping in &segment.mappings {
        let source_base: &Path = if mapping.relative_to_staging {
            &staged.staging_path
        } else {
            &plan.project_root
        };
        let source = paths::resolve(source_base, &mapping.source);
        let destination = out_dir.join(&mapping.destination);

        if source.is_dir() {
            copied += io::copy_dir_recursive(&source, &destination, "copy artefact mapping")?;
        } else if source.is_file() {
            if let Some(parent) = destination.parent() {
                io::ensure_dir(parent, "create mapping directory")?;
            }
            std::fs::copy(&source, &destination)
                .map_err(|e| Error::internal_io(e.to_string(), Some("copy mapping".to_string())))?;
            copied += 1;
        } else {
            return Err(Error::internal_unexpected(format!(
                "Mapping source does not exist: {}",
                source.display()
            )));
        }
    }
    Ok(copied)
}

/// Package one artefact. Failures are captured into the result; the caller
/// continues with the remaining artefacts either way.
pub fn package_artefact(
    segment: &ArtefactSegment,
    plan: &Plan,
    staged: &StagedModule,
    installer: &dyn ModuleInstaller,
    ctx: &RunContext,
) -> ArtefactResult {
    let out_dir = paths::resolve(&plan.project_root, &segment.path);
    let mut result = ArtefactResult {
        kind: segment.kind,
        id: segment.id.clone(),
        path: out_dir.to_string_lossy().to_string(),
        success: false,
        size_bytes: None,
        sha256: None,
        files_copied: 0,
        dependencies_bundled: Vec::new(),
        cleared: false,
        error: None,
    };

    let prepared: Result<()> = (|| {
        if !segment.do_not_clear && out_dir.exists() {
            io::remove_dir_if_exists(&out_dir, "clear artefact output")?;
            result.cleared = true;
        }
        io::ensure_dir(&out_dir, "create artefact output")?;
        Ok(())
    })();
    if let Err(e) = prepared {
        result.error = Some(e.message);
        return result;
    }

    match produce(segment, plan, staged, &out_dir, installer, ctx) {
        Err(e) => {
            result.error = Some(e.message);
        }
        Ok((output_path, files_copied, bundled)) => {
            result.files_copied = files_copied;
            result.dependencies_bundled = bundled;

            match apply_mappings(segment, plan, staged, &out_dir) {
                Err(e) => {
                    result.error = Some(e.message);
                    return result;
                }
                Ok(mapped) => result.files_copied += mapped,
            }

            if segment.kind == ArtefactKind::Packed {
                result.path = output_path.to_string_lossy().to_string();
                result.size_bytes = output_path.metadata().map(|m| m.len()).ok();
                match sha256_of(&output_path) {
                    Ok(digest) => result.sha256 = Some(digest),
                    Err(e) => {
                        result.error = Some(e.message);
                        return result;
                    }
                }
            }
            result.success = true;
            log_status!(
                "artefact",
                "{} -> {} ({} files)",
                segment.kind.as_str(),
                result.path,
                result.files_copied
            );
        }
    }

    result
}
