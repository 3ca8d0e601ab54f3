//! Plan Builder: fold a spec plus its segments into one resolved plan.
//!
//! Fails fast — before any filesystem write or network side effect — on an
//! empty module name, a missing project root, or conflicting exact-version
//! pins. Segments fold left-to-right: last write wins for scalars, string
//! lists union de-duplicated, dependency lists merge by module name with
//! exact-over-range as the explicit tie-break.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::manifest::DependencySpec;
use crate::segment::{
    ArtefactSegment, BuildSegment, CommandSegment, CompatibilitySegment, DocumentationSegment,
    FileConsistencySegment, FormattingSegment, ImportModulesSegment, ManifestSegment,
    ModuleSkipSegment, PlaceHolderSegment, PublishSegment, Segment, SigningSegment, TestSegment,
    ValidationSegment,
};
use crate::spec::ModuleSpec;
use crate::utils::{paths, validation};
use crate::version;

use super::{
    BuildParameters, CommandSettings, CompatibilitySettings, ConsistencySettings, DocsSettings,
    FormattingSettings, ImportSettings, ManifestSettings, Plan, SigningSettings, TestSettings,
    ValidationSettings,
};

const DEFAULT_SCRIPT_EXTENSIONS: &[&str] = &["ps1", "psm1"];
const DEFAULT_SIGN_INCLUDE: &[&str] = &["**/*.ps1", "**/*.psm1"];
const DEFAULT_DOCS_PATH: &str = "docs";
const DEFAULT_TEST_COMMAND: &str = "scripttest {path}";
const DEFAULT_INCOMPATIBLE_PATTERNS: &[&str] = &[
    r"Add-Type\s+-AssemblyName",
    r"\[System\.Windows\.Forms\.",
    r"Get-WmiObject",
];

/// Remote and local version sources consulted for auto-step expressions.
/// Resolution itself stays a pure function; this trait only fetches inputs.
pub trait VersionLookup {
    fn remote_latest(&self, module_name: &str) -> Result<Option<String>>;
    fn local_manifest_version(&self, source_root: &Path, module_name: &str)
        -> Result<Option<String>>;
}

/// Fixed lookup values; used by tests and offline planning.
#[derive(Debug, Clone, Default)]
pub struct StaticVersionLookup {
    pub remote: Option<String>,
    pub local: Option<String>,
}

impl VersionLookup for StaticVersionLookup {
    fn remote_latest(&self, _module_name: &str) -> Result<Option<String>> {
        Ok(self.remote.clone())
    }

    fn local_manifest_version(
        &self,
        _source_root: &Path,
        _module_name: &str,
    ) -> Result<Option<String>> {
        Ok(self.local.clone())
    }
}

/// Accumulator for same-type segment folding.
#[derive(Default)]
struct SegmentFold {
    manifest: ManifestSegment,
    build: BuildSegment,
    formatting: Option<FormattingSegment>,
    documentation: Option<DocumentationSegment>,
    signing: Option<SigningSegment>,
    command: CommandSegment,
    placeholders: PlaceHolderSegment,
    module_skip: ModuleSkipSegment,
    validation: Option<ValidationSegment>,
    consistency: Option<FileConsistencySegment>,
    compatibility: Option<CompatibilitySegment>,
    test: Option<TestSegment>,
    import: Option<ImportModulesSegment>,
    artefacts: Vec<ArtefactSegment>,
    publishes: Vec<PublishSegment>,
}

fn overwrite<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

fn union(target: &mut Vec<String>, incoming: &[String]) {
    for value in incoming {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}

fn merge_dependencies(target: &mut Vec<DependencySpec>, incoming: &[DependencySpec]) -> Result<()> {
    for dep in incoming {
        let Some(existing) = target.iter_mut().find(|d| d.name == dep.name) else {
            target.push(dep.clone());
            continue;
        };

        match (existing.constraint.is_exact(), dep.constraint.is_exact()) {
            (true, true) => {
                if existing.constraint != dep.constraint {
                    return Err(Error::config_invalid_value(
                        "requiredModules",
                        Some(dep.name.clone()),
                        format!(
                            "Conflicting exact version pins for module '{}': {} vs {}",
                            dep.name,
                            existing.constraint.describe(),
                            dep.constraint.describe()
                        ),
                    ));
                }
            }
            // An exact entry always wins over a range entry for the same name.
            (true, false) => {}
            (false, true) | (false, false) => {
                existing.constraint = dep.constraint.clone();
                if dep.guid.is_some() {
                    existing.guid = dep.guid.clone();
                }
            }
        }
    }
    Ok(())
}

impl SegmentFold {
    fn fold(segments: &[Segment]) -> Result<Self> {
        let mut acc = SegmentFold::default();
        for segment in segments {
            match segment {
                Segment::Manifest(s) => acc.merge_manifest(s)?,
                Segment::Build(s) => acc.merge_build(s),
                Segment::Formatting(s) => acc.merge_formatting(s),
                Segment::Documentation(s) => acc.merge_documentation(s),
                Segment::Signing(s) => acc.merge_signing(s),
                Segment::Artefact(s) => acc.artefacts.push(s.clone()),
                Segment::Publish(s) => acc.publishes.push(s.clone()),
                Segment::Command(s) => acc.merge_command(s),
                Segment::PlaceHolder(s) => {
                    acc.placeholders.replacements.extend(s.replacements.clone())
                }
                Segment::ModuleSkip(s) => union(&mut acc.module_skip.modules, &s.modules),
                Segment::Validation(s) => acc.merge_validation(s),
                Segment::FileConsistency(s) => acc.merge_consistency(s),
                Segment::Compatibility(s) => acc.merge_compatibility(s),
                Segment::Test(s) => acc.merge_test(s),
                Segment::ImportModules(s) => acc.merge_import(s),
            }
        }
        Ok(acc)
    }

    fn merge_manifest(&mut self, s: &ManifestSegment) -> Result<()> {
        let m = &mut self.manifest;
        overwrite(&mut m.prerelease, s.prerelease.clone());
        overwrite(&mut m.author, s.author.clone());
        overwrite(&mut m.company_name, s.company_name.clone());
        overwrite(&mut m.copyright, s.copyright.clone());
        overwrite(&mut m.description, s.description.clone());
        overwrite(&mut m.project_uri, s.project_uri.clone());
        overwrite(&mut m.license_uri, s.license_uri.clone());
        overwrite(&mut m.icon_uri, s.icon_uri.clone());
        overwrite(&mut m.release_notes, s.release_notes.clone());
        union(&mut m.tags, &s.tags);
        union(&mut m.compatible_editions, &s.compatible_editions);
        union(
            &mut m.external_module_dependencies,
            &s.external_module_dependencies,
        );
        merge_dependencies(&mut m.required_modules, &s.required_modules)
    }

    fn merge_build(&mut self, s: &BuildSegment) {
        let b = &mut self.build;
        overwrite(&mut b.version, s.version.clone());
        overwrite(&mut b.staging_root, s.staging_root.clone());
        overwrite(&mut b.delete_staging, s.delete_staging);
        overwrite(&mut b.fail_on_delete_error, s.fail_on_delete_error);
        union(&mut b.exclude, &s.exclude);
        union(&mut b.script_extensions, &s.script_extensions);
    }

    fn merge_formatting(&mut self, s: &FormattingSegment) {
        let f = self.formatting.get_or_insert_with(Default::default);
        overwrite(&mut f.format_staging, s.format_staging);
        overwrite(&mut f.format_project, s.format_project);
        overwrite(&mut f.command, s.command.clone());
    }

    fn merge_documentation(&mut self, s: &DocumentationSegment) {
        let d = self.documentation.get_or_insert_with(Default::default);
        overwrite(&mut d.path, s.path.clone());
        overwrite(&mut d.generate_external_help, s.generate_external_help);
    }

    fn merge_signing(&mut self, s: &SigningSegment) {
        let g = self.signing.get_or_insert_with(Default::default);
        overwrite(&mut g.certificate_thumbprint, s.certificate_thumbprint.clone());
        overwrite(&mut g.overwrite_signed, s.overwrite_signed);
        overwrite(&mut g.timestamp_server, s.timestamp_server.clone());
        union(&mut g.include, &s.include);
        union(&mut g.exclude_patterns, &s.exclude_patterns);
        union(&mut g.exclude_paths, &s.exclude_paths);
    }

    fn merge_command(&mut self, s: &CommandSegment) {
        self.command.before_merge.extend(s.before_merge.clone());
        overwrite(
            &mut self.command.fail_on_missing_commands,
            s.fail_on_missing_commands,
        );
    }

    fn merge_validation(&mut self, s: &ValidationSegment) {
        let v = self.validation.get_or_insert_with(Default::default);
        overwrite(&mut v.enabled, s.enabled);
        overwrite(&mut v.require_exports_match, s.require_exports_match);
    }

    fn merge_consistency(&mut self, s: &FileConsistencySegment) {
        let c = self.consistency.get_or_insert_with(Default::default);
        overwrite(&mut c.staging, s.staging);
        overwrite(&mut c.project, s.project);
        overwrite(&mut c.encoding, s.encoding.clone());
        overwrite(&mut c.line_ending, s.line_ending.clone());
        overwrite(&mut c.max_inconsistency_percent, s.max_inconsistency_percent);
    }

    fn merge_compatibility(&mut self, s: &CompatibilitySegment) {
        let c = self.compatibility.get_or_insert_with(Default::default);
        overwrite(&mut c.enabled, s.enabled);
        overwrite(&mut c.min_compatible_percent, s.min_compatible_percent);
        union(&mut c.editions, &s.editions);
        union(&mut c.incompatible_patterns, &s.incompatible_patterns);
    }

    fn merge_test(&mut self, s: &TestSegment) {
        let t = self.test.get_or_insert_with(Default::default);
        overwrite(&mut t.enabled, s.enabled);
        overwrite(&mut t.command, s.command.clone());
        overwrite(&mut t.minimum_pass_percent, s.minimum_pass_percent);
    }

    fn merge_import(&mut self, s: &ImportModulesSegment) {
        let i = self.import.get_or_insert_with(Default::default);
        overwrite(&mut i.required_modules, s.required_modules);
        overwrite(&mut i.force, s.force);
        overwrite(&mut i.skip_all, s.skip_all);
        overwrite(&mut i.concurrency, s.concurrency);
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Build the immutable plan for a spec.
pub fn build_plan(spec: &ModuleSpec, lookup: &dyn VersionLookup) -> Result<Plan> {
    let module_name = validation::require_non_empty(
        &spec.build.module_name,
        "build.moduleName",
        "Module name cannot be empty",
    )?;

    let fold = SegmentFold::fold(&spec.segments)?;

    let project_root: PathBuf = match &spec.build.project_root {
        Some(root) => paths::expand(root),
        None => {
            let source = paths::expand(&spec.build.source_root);
            source
                .parent()
                .map(Path::to_path_buf)
                .filter(|p| !p.as_os_str().is_empty())
                .ok_or_else(|| {
                    Error::config_invalid_value(
                        "build.projectRoot",
                        None,
                        "Cannot derive a project root from sourceRoot; set build.projectRoot",
                    )
                })?
        }
    };

    if !project_root.is_dir() {
        return Err(Error::validation_invalid_argument(
            "build.projectRoot",
            format!("Project root does not exist: {}", project_root.display()),
            None,
            None,
        ));
    }

    let source_root = paths::resolve(&project_root, &spec.build.source_root);
    if !source_root.is_dir() {
        return Err(Error::validation_invalid_argument(
            "build.sourceRoot",
            format!("Source root does not exist: {}", source_root.display()),
            None,
            None,
        ));
    }

    // Version resolution: lookups run only for auto-step expressions, and
    // only after the fail-fast validation above.
    let expression = fold
        .build
        .version
        .clone()
        .unwrap_or_else(|| spec.build.version_expression.clone());
    let resolved = if version::is_auto_step(&expression) {
        let remote = lookup.remote_latest(module_name)?;
        let local = lookup.local_manifest_version(&source_root, module_name)?;
        version::resolve_expression(&expression, remote.as_deref(), local.as_deref())?
    } else {
        version::resolve_expression(&expression, None, None)?
    };

    let staging_root = fold
        .build
        .staging_root
        .as_ref()
        .or(spec.build.staging_root.as_ref())
        .map(|s| paths::resolve(&project_root, s));
    let staging_synthesized = staging_root.is_none();

    let script_extensions = if fold.build.script_extensions.is_empty() {
        strings(DEFAULT_SCRIPT_EXTENSIONS)
    } else {
        fold.build.script_extensions.clone()
    };

    let signing = match &fold.signing {
        None => None,
        Some(s) => {
            let thumbprint = s.certificate_thumbprint.clone().ok_or_else(|| {
                Error::config_missing_key(
                    "segments.signing.certificateThumbprint",
                    Some(module_name.to_string()),
                )
            })?;
            Some(SigningSettings {
                thumbprint,
                include: if s.include.is_empty() {
                    strings(DEFAULT_SIGN_INCLUDE)
                } else {
                    s.include.clone()
                },
                exclude_patterns: s.exclude_patterns.clone(),
                exclude_paths: s.exclude_paths.clone(),
                overwrite_signed: s.overwrite_signed.unwrap_or(false),
                timestamp_server: s.timestamp_server.clone(),
            })
        }
    };

    let docs = fold.documentation.as_ref().map(|d| DocsSettings {
        path: d.path.clone().unwrap_or_else(|| DEFAULT_DOCS_PATH.to_string()),
        external_help: d.generate_external_help.unwrap_or(false),
    });

    let formatting = fold.formatting.as_ref().map(|f| FormattingSettings {
        staging: f.format_staging.unwrap_or(true),
        project: f.format_project.unwrap_or(false),
        command: f.command.clone(),
    });

    let consistency_settings = |segment: &FileConsistencySegment| ConsistencySettings {
        encoding: segment.encoding.clone().unwrap_or_else(|| "utf-8".to_string()),
        line_ending: segment.line_ending.clone().unwrap_or_else(|| "lf".to_string()),
        max_inconsistency_percent: segment.max_inconsistency_percent,
    };

    let validation = ValidationSettings {
        consistency_staging: fold
            .consistency
            .as_ref()
            .filter(|c| c.staging.unwrap_or(true))
            .map(consistency_settings),
        consistency_project: fold
            .consistency
            .as_ref()
            .filter(|c| c.project.unwrap_or(false))
            .map(consistency_settings),
        compatibility: fold
            .compatibility
            .as_ref()
            .filter(|c| c.enabled.unwrap_or(true))
            .map(|c| CompatibilitySettings {
                editions: c.editions.clone(),
                incompatible_patterns: if c.incompatible_patterns.is_empty() {
                    strings(DEFAULT_INCOMPATIBLE_PATTERNS)
                } else {
                    c.incompatible_patterns.clone()
                },
                min_compatible_percent: c.min_compatible_percent,
            }),
        module_validation: fold
            .validation
            .as_ref()
            .map(|v| v.enabled.unwrap_or(true))
            .unwrap_or(false),
        require_exports_match: fold
            .validation
            .as_ref()
            .and_then(|v| v.require_exports_match)
            .unwrap_or(true),
    };

    let import = fold.import.as_ref().map(|i| ImportSettings {
        include_required: i.required_modules.unwrap_or(true),
        force: i.force.unwrap_or(false),
        skip_all: i.skip_all.unwrap_or(false),
        concurrency: i.concurrency,
    });

    let tests = fold
        .test
        .as_ref()
        .filter(|t| t.enabled.unwrap_or(true))
        .map(|t| TestSettings {
            command: t
                .command
                .clone()
                .unwrap_or_else(|| DEFAULT_TEST_COMMAND.to_string()),
            minimum_pass_percent: t.minimum_pass_percent,
        });

    Ok(Plan {
        module_name: module_name.to_string(),
        project_root,
        expected_version: expression,
        resolved_version: resolved.version,
        version_source: resolved.source,
        prerelease: fold.manifest.prerelease.clone(),
        build: BuildParameters {
            module_name: module_name.to_string(),
            source_root,
            staging_root,
            exclude: fold.build.exclude.clone(),
            placeholders: fold.placeholders.replacements.clone(),
            script_extensions,
        },
        manifest: ManifestSettings {
            author: fold.manifest.author.clone(),
            company_name: fold.manifest.company_name.clone(),
            copyright: fold.manifest.copyright.clone(),
            description: fold.manifest.description.clone(),
            tags: fold.manifest.tags.clone(),
            project_uri: fold.manifest.project_uri.clone(),
            license_uri: fold.manifest.license_uri.clone(),
            icon_uri: fold.manifest.icon_uri.clone(),
            release_notes: fold.manifest.release_notes.clone(),
        },
        compatible_editions: fold.manifest.compatible_editions.clone(),
        required_modules: fold.manifest.required_modules.clone(),
        external_module_dependencies: fold.manifest.external_module_dependencies.clone(),
        docs,
        signing,
        formatting,
        validation,
        skip_modules: fold.module_skip.modules.clone(),
        commands: CommandSettings {
            before_merge: fold.command.before_merge.clone(),
            fail_on_missing_commands: fold.command.fail_on_missing_commands.unwrap_or(false),
        },
        import,
        tests,
        artefacts: fold.artefacts,
        publishes: fold.publishes,
        install: spec.install.clone(),
        staging_synthesized,
        delete_staging_after_run: fold.build.delete_staging.unwrap_or(staging_synthesized),
        fail_on_delete_error: fold.build.fail_on_delete_error.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::VersionConstraint;
    use crate::spec::ModuleSpec;
    use tempfile::tempdir;

    fn spec_with(segments: &str, version: &str, root: &Path) -> ModuleSpec {
        let raw = format!(
            r#"{{
                "schemaVersion": 1,
                "build": {{
                    "moduleName": "Sample",
                    "sourceRoot": "{}",
                    "projectRoot": "{}",
                    "versionExpression": "{}"
                }},
                "segments": {}
            }}"#,
            root.join("src").display(),
            root.display(),
            version,
            segments
        );
        ModuleSpec::from_json(&raw).unwrap()
    }

    fn project_dir() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        dir
    }

    #[test]
    fn minimal_spec_builds_a_plan() {
        let dir = project_dir();
        let spec = spec_with("[]", "1.2.3", dir.path());
        let plan = build_plan(&spec, &StaticVersionLookup::default()).unwrap();

        assert_eq!(plan.module_name, "Sample");
        assert_eq!(plan.resolved_version, "1.2.3");
        assert!(plan.staging_synthesized);
        assert!(plan.delete_staging_after_run);
        assert!(plan.signing.is_none());
        assert!(plan.import.is_none());
    }

    #[test]
    fn empty_module_name_fails_fast() {
        let dir = project_dir();
        let mut spec = spec_with("[]", "1.0.0", dir.path());
        spec.build.module_name = "  ".to_string();
        let err = build_plan(&spec, &StaticVersionLookup::default()).unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");
    }

    #[test]
    fn missing_project_root_fails_fast() {
        let dir = project_dir();
        let mut spec = spec_with("[]", "1.0.0", dir.path());
        spec.build.project_root = Some("/nonexistent/shipwright-project".to_string());
        let err = build_plan(&spec, &StaticVersionLookup::default()).unwrap_err();
        assert!(err.message.contains("Project root does not exist"));
    }

    #[test]
    fn auto_step_uses_lookup_values() {
        let dir = project_dir();
        let spec = spec_with("[]", "2.0.X", dir.path());
        let lookup = StaticVersionLookup {
            remote: Some("2.0.7".to_string()),
            local: Some("2.0.5".to_string()),
        };
        let plan = build_plan(&spec, &lookup).unwrap();
        assert_eq!(plan.resolved_version, "2.0.8");
    }

    #[test]
    fn conflicting_exact_pins_are_rejected() {
        let dir = project_dir();
        let segments = r#"[
            {"type":"Manifest","requiredModules":[{"name":"Helper","requiredVersion":"1.0.0"}]},
            {"type":"Manifest","requiredModules":[{"name":"Helper","requiredVersion":"2.0.0"}]}
        ]"#;
        let spec = spec_with(segments, "1.0.0", dir.path());
        let err = build_plan(&spec, &StaticVersionLookup::default()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
        assert!(err.message.contains("Conflicting exact version pins"));
    }

    #[test]
    fn exact_pin_wins_over_range_in_either_order() {
        let dir = project_dir();
        let segments = r#"[
            {"type":"Manifest","requiredModules":[{"name":"Helper","requiredVersion":"1.5.0"}]},
            {"type":"Manifest","requiredModules":[{"name":"Helper","minimumVersion":"1.0.0"}]}
        ]"#;
        let spec = spec_with(segments, "1.0.0", dir.path());
        let plan = build_plan(&spec, &StaticVersionLookup::default()).unwrap();
        assert_eq!(
            plan.required_modules[0].constraint,
            VersionConstraint::Exact("1.5.0".to_string())
        );

        let segments = r#"[
            {"type":"Manifest","requiredModules":[{"name":"Helper","minimumVersion":"1.0.0"}]},
            {"type":"Manifest","requiredModules":[{"name":"Helper","requiredVersion":"1.5.0"}]}
        ]"#;
        let spec = spec_with(segments, "1.0.0", dir.path());
        let plan = build_plan(&spec, &StaticVersionLookup::default()).unwrap();
        assert_eq!(
            plan.required_modules[0].constraint,
            VersionConstraint::Exact("1.5.0".to_string())
        );
    }

    #[test]
    fn later_scalar_segments_win() {
        let dir = project_dir();
        let segments = r#"[
            {"type":"Manifest","author":"First"},
            {"type":"Manifest","author":"Second"}
        ]"#;
        let spec = spec_with(segments, "1.0.0", dir.path());
        let plan = build_plan(&spec, &StaticVersionLookup::default()).unwrap();
        assert_eq!(plan.manifest.author.as_deref(), Some("Second"));
    }

    #[test]
    fn artefact_and_publish_order_is_preserved() {
        let dir = project_dir();
        let segments = r#"[
            {"type":"Publish","destination":"GitHub","repository":"owner/sample"},
            {"type":"Artefact","kind":"Packed","path":"dist"},
            {"type":"Artefact","kind":"Unpacked","path":"out"},
            {"type":"Publish","destination":"Feed","repository":"ModuleFeed"}
        ]"#;
        let spec = spec_with(segments, "1.0.0", dir.path());
        let plan = build_plan(&spec, &StaticVersionLookup::default()).unwrap();
        assert_eq!(plan.artefacts.len(), 2);
        assert_eq!(plan.artefacts[0].path, "dist");
        assert_eq!(plan.publishes.len(), 2);
        assert_eq!(plan.publishes[0].repository.as_deref(), Some("owner/sample"));
    }

    #[test]
    fn signing_segment_without_thumbprint_is_config_error() {
        let dir = project_dir();
        let segments = r#"[{"type":"Signing","overwriteSigned":true}]"#;
        let spec = spec_with(segments, "1.0.0", dir.path());
        let err = build_plan(&spec, &StaticVersionLookup::default()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_key");
    }
}
