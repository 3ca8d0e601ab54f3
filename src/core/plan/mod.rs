//! The resolved, immutable release plan.
//!
//! A `Plan` is computed exactly once from a spec plus its segments and is
//! never mutated afterwards: every pipeline step reads it and writes only to
//! its own result.

use std::path::PathBuf;

use serde::Serialize;

use crate::manifest::DependencySpec;
use crate::segment::{ArtefactSegment, PlaceHolderMapping, PublishSegment};
use crate::spec::InstallSpec;
use crate::version::VersionSource;

mod builder;

pub use builder::{build_plan, StaticVersionLookup, VersionLookup};

/// Parameters handed to the `StagingBuilder` boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildParameters {
    pub module_name: String,
    pub source_root: PathBuf,
    /// Explicit staging root; `None` means the pipeline synthesizes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub placeholders: Vec<PlaceHolderMapping>,
    pub script_extensions: Vec<String>,
}

/// Manifest scalars patched into the staged manifest.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsSettings {
    /// Markdown output directory, relative to the project root.
    pub path: String,
    pub external_help: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningSettings {
    pub thumbprint: String,
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_patterns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_paths: Vec<String>,
    pub overwrite_signed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_server: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattingSettings {
    pub staging: bool,
    pub project: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencySettings {
    pub encoding: String,
    pub line_ending: String,
    /// Fail threshold; `None` reports findings without failing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_inconsistency_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilitySettings {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub editions: Vec<String>,
    pub incompatible_patterns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_compatible_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency_staging: Option<ConsistencySettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency_project: Option<ConsistencySettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<CompatibilitySettings>,
    pub module_validation: bool,
    pub require_exports_match: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSettings {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub before_merge: Vec<String>,
    pub fail_on_missing_commands: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettings {
    pub include_required: bool,
    pub force: bool,
    pub skip_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSettings {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_pass_percent: Option<f64>,
}

/// The single source of truth for one pipeline run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub module_name: String,
    pub project_root: PathBuf,
    /// The version expression as declared.
    pub expected_version: String,
    pub resolved_version: String,
    pub version_source: VersionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerelease: Option<String>,
    pub build: BuildParameters,
    pub manifest: ManifestSettings,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compatible_editions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_modules: Vec<DependencySpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_module_dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<DocsSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatting: Option<FormattingSettings>,
    pub validation: ValidationSettings,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skip_modules: Vec<String>,
    pub commands: CommandSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestSettings>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artefacts: Vec<ArtefactSegment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub publishes: Vec<PublishSegment>,
    pub install: InstallSpec,
    /// True when the pipeline synthesized the staging directory itself.
    pub staging_synthesized: bool,
    /// True when staging must be deleted after a successful run.
    pub delete_staging_after_run: bool,
    /// Treat a cleanup deletion failure as a run failure.
    pub fail_on_delete_error: bool,
}
