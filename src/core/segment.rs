//! Typed configuration segments.
//!
//! Each segment is a tagged variant keyed by its `type` discriminator and
//! carries only data. The wire format is decoded into this closed sum type
//! at the boundary; nothing downstream ever inspects an untyped map.
//! Segments are additive and order-independent, except that artefact and
//! publish segments keep their declaration order for step ordering.

use serde::{Deserialize, Serialize};

use crate::credentials::CredentialRef;
use crate::manifest::DependencySpec;

// ============================================================================
// Shared leaf types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtefactKind {
    Packed,
    Unpacked,
    Script,
}

impl ArtefactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtefactKind::Packed => "Packed",
            ArtefactKind::Unpacked => "Unpacked",
            ArtefactKind::Script => "Script",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationKind {
    /// Package-feed-style registry (push via API key).
    Feed,
    /// Source-hosting release mechanism (tag + assets).
    GitHub,
}

impl DestinationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationKind::Feed => "Feed",
            DestinationKind::GitHub => "GitHub",
        }
    }
}

/// Where bundled required modules come from when an artefact includes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RequiredModulesSource {
    #[default]
    Local,
    Download,
}

/// Extra source → destination copy for an artefact. `relative_to_staging`
/// resolves the source against the staging root instead of the project root;
/// the destination is always relative to the artefact root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CopyMapping {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub relative_to_staging: bool,
}

/// Literal find/replace applied to staged text files before packaging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlaceHolderMapping {
    pub find: String,
    pub replace: String,
}

// ============================================================================
// Segment variants
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ManifestSegment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerelease: Option<String>,
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
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compatible_editions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_modules: Vec<DependencySpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_module_dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildSegment {
    /// Overrides `build.versionExpression` from the spec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Overrides `build.stagingRoot`; when neither is set the pipeline
    /// synthesizes a staging directory and owns its lifetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_root: Option<String>,
    /// Delete the staging directory after a successful run. Defaults to
    /// true only for synthesized staging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_staging: Option<bool>,
    /// Treat a cleanup deletion failure as a pipeline failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_on_delete_error: Option<bool>,
    /// Glob patterns excluded from the staging copy.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Script file extensions the builder scans for exports.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub script_extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FormattingSegment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_staging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_project: Option<bool>,
    /// Formatter command template; `{path}` expands to the target root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentationSegment {
    /// Output directory for generated markdown, relative to the project root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_external_help: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SigningSegment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_thumbprint: Option<String>,
    /// Include globs relative to the staging root.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    /// Exclude globs matched against staging-relative paths.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_patterns: Vec<String>,
    /// Excluded path substrings.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite_signed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_server: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtefactSegment {
    pub kind: ArtefactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Output directory, relative to the project root unless absolute.
    pub path: String,
    /// Packed artefact file name; `{name}` and `{version}` expand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Opt out of clearing the output directory before copying.
    #[serde(default)]
    pub do_not_clear: bool,
    #[serde(default)]
    pub add_required_modules: bool,
    #[serde(default)]
    pub required_modules_source: RequiredModulesSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<CopyMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishSegment {
    pub destination: DestinationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Feed repository name, or `owner/repo` for release destinations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<CredentialRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialRef>,
    /// Register the feed before pushing when a custom URI/credential is set.
    #[serde(default)]
    pub ensure_registered: bool,
    /// Unregister the feed afterwards if this run registered it.
    #[serde(default)]
    pub unregister_after_use: bool,
    /// Re-publish even when the destination already has this version.
    #[serde(default)]
    pub force: bool,
    /// Skip the remaining publish destinations when this one fails.
    #[serde(default)]
    pub fail_fast: bool,
    /// Release tag override; defaults to `v<resolvedVersion>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Mark the release as a pre-release. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerelease: Option<bool>,
    /// Asset globs, relative to the project root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandSegment {
    /// Commands run in the project root after staging, before the merge.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub before_merge: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_on_missing_commands: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaceHolderSegment {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replacements: Vec<PlaceHolderMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleSkipSegment {
    /// Module names the dependency resolver and validation ignore.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationSegment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Require every exported function to exist in the computed export set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_exports_match: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConsistencySegment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<bool>,
    /// Expected text encoding ("utf-8" is the only enforced value).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Expected line ending: "lf" or "crlf".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_ending: Option<String>,
    /// Fail the run when more than this percentage of files is inconsistent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_inconsistency_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompatibilitySegment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub editions: Vec<String>,
    /// Regex patterns flagging edition-incompatible constructs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub incompatible_patterns: Vec<String>,
    /// Fail the run when fewer than this percentage of files is compatible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_compatible_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TestSegment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Test command template; `{path}` expands to the staging root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_pass_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportModulesSegment {
    /// Install the module's own required modules before building.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_modules: Option<bool>,
    /// Re-install satisfied dependencies anyway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
    /// Record every dependency as skipped without touching the installer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_all: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

// ============================================================================
// The closed sum
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Segment {
    Manifest(ManifestSegment),
    Build(BuildSegment),
    Formatting(FormattingSegment),
    Documentation(DocumentationSegment),
    Signing(SigningSegment),
    Artefact(ArtefactSegment),
    Publish(PublishSegment),
    Command(CommandSegment),
    PlaceHolder(PlaceHolderSegment),
    ModuleSkip(ModuleSkipSegment),
    Validation(ValidationSegment),
    FileConsistency(FileConsistencySegment),
    Compatibility(CompatibilitySegment),
    Test(TestSegment),
    ImportModules(ImportModulesSegment),
}

impl Segment {
    pub fn type_name(&self) -> &'static str {
        match self {
            Segment::Manifest(_) => "Manifest",
            Segment::Build(_) => "Build",
            Segment::Formatting(_) => "Formatting",
            Segment::Documentation(_) => "Documentation",
            Segment::Signing(_) => "Signing",
            Segment::Artefact(_) => "Artefact",
            Segment::Publish(_) => "Publish",
            Segment::Command(_) => "Command",
            Segment::PlaceHolder(_) => "PlaceHolder",
            Segment::ModuleSkip(_) => "ModuleSkip",
            Segment::Validation(_) => "Validation",
            Segment::FileConsistency(_) => "FileConsistency",
            Segment::Compatibility(_) => "Compatibility",
            Segment::Test(_) => "Test",
            Segment::ImportModules(_) => "ImportModules",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_decode_by_type_tag() {
        let segment: Segment = serde_json::from_str(
            r#"{"type":"Artefact","kind":"Packed","path":"dist","doNotClear":true}"#,
        )
        .unwrap();
        match segment {
            Segment::Artefact(a) => {
                assert_eq!(a.kind, ArtefactKind::Packed);
                assert_eq!(a.path, "dist");
                assert!(a.do_not_clear);
            }
            other => panic!("Unexpected variant: {}", other.type_name()),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result: std::result::Result<Segment, _> =
            serde_json::from_str(r#"{"type":"Mystery","path":"dist"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn publish_segment_defaults() {
        let segment: Segment = serde_json::from_str(
            r#"{"type":"Publish","destination":"Feed","repository":"ModuleFeed"}"#,
        )
        .unwrap();
        match segment {
            Segment::Publish(p) => {
                assert_eq!(p.destination, DestinationKind::Feed);
                assert!(!p.force);
                assert!(!p.fail_fast);
                assert!(p.assets.is_empty());
            }
            other => panic!("Unexpected variant: {}", other.type_name()),
        }
    }
}
