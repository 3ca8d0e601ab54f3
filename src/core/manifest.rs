//! Module manifest metadata and the editor boundary.
//!
//! The orchestrator never touches manifest syntax itself: it reads a typed
//! `ManifestMetadata` and writes a `ManifestPatch` through the
//! `ManifestEditor` trait. The shipped implementation stores manifests as
//! flat JSON (`<ModuleName>.json` in the module root), preserving unknown
//! keys across writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::utils::io;
use crate::version;

// ============================================================================
// Dependency constraints
// ============================================================================

/// Version constraint for a required module. Exact pins and ranges are
/// mutually exclusive by construction; the serde bridge rejects entries
/// declaring both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    Exact(String),
    Range {
        minimum: Option<String>,
        maximum: Option<String>,
    },
}

impl VersionConstraint {
    pub fn any() -> Self {
        VersionConstraint::Range {
            minimum: None,
            maximum: None,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, VersionConstraint::Exact(_))
    }

    /// Whether an installed version satisfies this constraint.
    /// Unparseable versions never satisfy anything.
    pub fn matches(&self, installed: &str) -> bool {
        match self {
            VersionConstraint::Exact(expected) => {
                version::compare(installed, expected) == Some(std::cmp::Ordering::Equal)
            }
            VersionConstraint::Range { minimum, maximum } => {
                let Some(installed) = version::parse_lenient(installed) else {
                    return false;
                };
                if let Some(min) = minimum.as_deref().and_then(version::parse_lenient) {
                    if installed < min {
                        return false;
                    }
                } else if minimum.is_some() {
                    return false;
                }
                if let Some(max) = maximum.as_deref().and_then(version::parse_lenient) {
                    if installed > max {
                        return false;
                    }
                } else if maximum.is_some() {
                    return false;
                }
                true
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            VersionConstraint::Exact(v) => format!("={}", v),
            VersionConstraint::Range {
                minimum: None,
                maximum: None,
            } => "*".to_string(),
            VersionConstraint::Range { minimum, maximum } => {
                let min = minimum.as_deref().unwrap_or("*");
                let max = maximum.as_deref().unwrap_or("*");
                format!(">={} <={}", min, max)
            }
        }
    }
}

/// One required-module entry as declared in a manifest or segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDependency", into = "RawDependency")]
pub struct DependencySpec {
    pub name: String,
    pub constraint: VersionConstraint,
    pub guid: Option<String>,
}

/// Flat wire shape: `requiredVersion` XOR `minimumVersion`/`maximumVersion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDependency {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    required_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximum_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guid: Option<String>,
}

impl TryFrom<RawDependency> for DependencySpec {
    type Error = Error;

    fn try_from(raw: RawDependency) -> Result<Self> {
        if raw.name.trim().is_empty() {
            return Err(Error::validation_missing_argument(
                "requiredModules[].name",
                "Required module entry has no name",
            ));
        }

        let constraint = match (&raw.required_version, &raw.minimum_version, &raw.maximum_version)
        {
            (Some(exact), None, None) => VersionConstraint::Exact(exact.clone()),
            (None, minimum, maximum) => VersionConstraint::Range {
                minimum: minimum.clone(),
                maximum: maximum.clone(),
            },
            (Some(_), _, _) => {
                return Err(Error::config_invalid_value(
                    "requiredModules",
                    Some(raw.name.clone()),
                    format!(
                        "Module '{}' declares both an exact version and a range",
                        raw.name
                    ),
                ));
            }
        };

        Ok(DependencySpec {
            name: raw.name,
            constraint,
            guid: raw.guid,
        })
    }
}

impl From<DependencySpec> for RawDependency {
    fn from(spec: DependencySpec) -> Self {
        let (required_version, minimum_version, maximum_version) = match spec.constraint {
            VersionConstraint::Exact(v) => (Some(v), None, None),
            VersionConstraint::Range { minimum, maximum } => (None, minimum, maximum),
        };
        RawDependency {
            name: spec.name,
            required_version,
            minimum_version,
            maximum_version,
            guid: spec.guid,
        }
    }
}

// ============================================================================
// Manifest metadata
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManifestMetadata {
    pub name: String,
    pub version: String,
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
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compatible_editions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_modules: Vec<DependencySpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_module_dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions_to_export: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases_to_export: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,

    // Preserve unknown manifest keys for external consumers
    #[serde(flatten, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

/// Partial update applied to a manifest; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPatch {
    pub version: Option<String>,
    pub prerelease: Option<String>,
    pub clear_prerelease: bool,
    pub author: Option<String>,
    pub company_name: Option<String>,
    pub copyright: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub project_uri: Option<String>,
    pub license_uri: Option<String>,
    pub icon_uri: Option<String>,
    pub compatible_editions: Option<Vec<String>>,
    pub required_modules: Option<Vec<DependencySpec>>,
    pub external_module_dependencies: Option<Vec<String>>,
    pub functions_to_export: Option<Vec<String>>,
    pub aliases_to_export: Option<Vec<String>>,
    pub release_notes: Option<String>,
}

/// Manifest file name for a module (`<ModuleName>.json`).
pub fn manifest_file_name(module_name: &str) -> String {
    format!("{}.json", module_name)
}

/// Locate the manifest inside a module directory.
pub fn manifest_path(module_dir: &Path, module_name: &str) -> PathBuf {
    module_dir.join(manifest_file_name(module_name))
}

// ============================================================================
// Editor boundary
// ============================================================================

pub trait ManifestEditor: Send + Sync {
    fn read_metadata(&self, path: &Path) -> Result<ManifestMetadata>;
    fn write_metadata(&self, path: &Path, patch: &ManifestPatch) -> Result<()>;
}

/// JSON-backed manifest editor. Reads into typed metadata; writes apply the
/// patch onto the raw document so unknown keys survive round-trips.
pub struct JsonManifestEditor;

impl JsonManifestEditor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonManifestEditor {
    fn default() -> Self {
        Self::new()
    }
}

fn set_key(doc: &mut serde_json::Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        doc.insert(key.to_string(), value);
    }
}

fn to_value<T: Serialize>(value: &T, context: &str) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| Error::internal_json(e.to_string(), Some(context.to_string())))
}

impl ManifestEditor for JsonManifestEditor {
    fn read_metadata(&self, path: &Path) -> Result<ManifestMetadata> {
        let content = io::read_file(path, "read manifest")?;
        serde_json::from_str(&content).map_err(|e| {
            Error::internal_json(
                format!("Invalid manifest {}: {}", path.display(), e),
                Some("parse manifest".to_string()),
            )
        })
    }

    fn write_metadata(&self, path: &Path, patch: &ManifestPatch) -> Result<()> {
        let content = io::read_file(path, "read manifest")
            .map_err(|e| Error::manifest_patch_failed(e.message))?;
        let mut doc: Value = serde_json::from_str(&content).map_err(|e| {
            Error::manifest_patch_failed(format!("Invalid manifest {}: {}", path.display(), e))
        })?;

        let Some(map) = doc.as_object_mut() else {
            return Err(Error::manifest_patch_failed(format!(
                "Manifest {} is not a JSON object",
                path.display()
            )));
        };

        set_key(map, "version", patch.version.clone().map(Value::String));
        if patch.clear_prerelease {
            map.remove("prerelease");
        } else {
            set_key(map, "prerelease", patch.prerelease.clone().map(Value::String));
        }
        set_key(map, "author", patch.author.clone().map(Value::String));
        set_key(map, "companyName", patch.company_name.clone().map(Value::String));
        set_key(map, "copyright", patch.copyright.clone().map(Value::String));
        set_key(map, "description", patch.description.clone().map(Value::String));
        set_key(map, "projectUri", patch.project_uri.clone().map(Value::String));
        set_key(map, "licenseUri", patch.license_uri.clone().map(Value::String));
        set_key(map, "iconUri", patch.icon_uri.clone().map(Value::String));
        set_key(map, "releaseNotes", patch.release_notes.clone().map(Value::String));

        if let Some(tags) = &patch.tags {
            map.insert("tags".to_string(), to_value(tags, "manifest tags")?);
        }
        if let Some(editions) = &patch.compatible_editions {
            map.insert(
                "compatibleEditions".to_string(),
                to_value(editions, "manifest editions")?,
            );
        }
        if let Some(modules) = &patch.required_modules {
            map.insert(
                "requiredModules".to_string(),
                to_value(modules, "manifest required modules")?,
            );
        }
        if let Some(external) = &patch.external_module_dependencies {
            map.insert(
                "externalModuleDependencies".to_string(),
                to_value(external, "manifest external dependencies")?,
            );
        }
        if let Some(functions) = &patch.functions_to_export {
            map.insert(
                "functionsToExport".to_string(),
                to_value(functions, "manifest exports")?,
            );
        }
        if let Some(aliases) = &patch.aliases_to_export {
            map.insert(
                "aliasesToExport".to_string(),
                to_value(aliases, "manifest aliases")?,
            );
        }

        let output = serde_json::to_string_pretty(&doc)
            .map_err(|e| Error::manifest_patch_failed(e.to_string()))?;
        io::write_file_atomic(path, &output, "write manifest")
            .map_err(|e| Error::manifest_patch_failed(e.message))
    }
}
