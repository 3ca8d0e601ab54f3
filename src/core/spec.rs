//! The versioned input contract.
//!
//! Callers (a CLI layer, automation) hand the orchestrator a `ModuleSpec`
//! decoded from JSON. The orchestrator never parses command-line text; the
//! spec plus its segments is the only input channel.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::segment::Segment;

pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    pub schema_version: u32,
    pub build: BuildSpec,
    #[serde(default)]
    pub install: InstallSpec,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    pub module_name: String,
    pub source_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_root: Option<String>,
    pub version_expression: String,
    /// Defaults to the parent of `sourceRoot`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_root: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InstallStrategy {
    /// Only ever keep the currently resolved version.
    Exact,
    /// Keep the `keepVersions` most recent versions.
    #[default]
    AutoRevision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LegacyFlatHandling {
    /// Proceed and log; the flat install is left in place.
    #[default]
    Warn,
    /// Convert the flat install into the first versioned folder.
    Migrate,
    /// Leave it untouched and install alongside it.
    Ignore,
}

fn default_keep_versions() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallSpec {
    pub enabled: bool,
    pub strategy: InstallStrategy,
    #[serde(rename = "keepVersions")]
    pub keep_versions: u32,
    pub roots: Vec<String>,
    #[serde(rename = "legacyFlatHandling")]
    pub legacy_flat: LegacyFlatHandling,
    /// Version folder names never pruned, regardless of retention count.
    pub preserve_versions: Vec<String>,
    /// Rewrite the installed manifest to the resolved version. Disable for
    /// development installs that must keep the staged version verbatim.
    pub update_manifest_to_resolved_version: bool,
}

impl Default for InstallSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: InstallStrategy::default(),
            keep_versions: default_keep_versions(),
            roots: Vec::new(),
            legacy_flat: LegacyFlatHandling::default(),
            preserve_versions: Vec::new(),
            update_manifest_to_resolved_version: default_true(),
        }
    }
}

impl ModuleSpec {
    pub fn from_json(content: &str) -> Result<Self> {
        let spec: ModuleSpec = serde_json::from_str(content)
            .map_err(|e| Error::validation_invalid_json(e.to_string(), Some("spec".to_string())))?;

        if spec.schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(Error::config_invalid_value(
                "schemaVersion",
                Some(spec.schema_version.to_string()),
                format!(
                    "Unsupported schema version {} (supported: {})",
                    spec.schema_version, SUPPORTED_SCHEMA_VERSION
                ),
            ));
        }

        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "schemaVersion": 1,
        "build": {
            "moduleName": "Sample",
            "sourceRoot": "/work/sample/src",
            "versionExpression": "1.0.0"
        }
    }"#;

    #[test]
    fn minimal_spec_decodes_with_defaults() {
        let spec = ModuleSpec::from_json(MINIMAL).unwrap();
        assert_eq!(spec.build.module_name, "Sample");
        assert!(spec.segments.is_empty());
        assert!(!spec.install.enabled);
        assert_eq!(spec.install.keep_versions, 3);
        assert_eq!(spec.install.strategy, InstallStrategy::AutoRevision);
        assert!(spec.install.update_manifest_to_resolved_version);
    }

    #[test]
    fn unsupported_schema_version_is_rejected() {
        let raw = MINIMAL.replace("\"schemaVersion\": 1", "\"schemaVersion\": 99");
        let err = ModuleSpec::from_json(&raw).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn install_spec_decodes_policy_fields() {
        let raw = r#"{
            "schemaVersion": 1,
            "build": {
                "moduleName": "Sample",
                "sourceRoot": "/work/sample/src",
                "versionExpression": "2.0.X"
            },
            "install": {
                "enabled": true,
                "strategy": "Exact",
                "keepVersions": 1,
                "roots": ["~/modules"],
                "legacyFlatHandling": "Migrate",
                "preserveVersions": ["1.0.0"]
            }
        }"#;
        let spec = ModuleSpec::from_json(raw).unwrap();
        assert!(spec.install.enabled);
        assert_eq!(spec.install.strategy, InstallStrategy::Exact);
        assert_eq!(spec.install.legacy_flat, LegacyFlatHandling::Migrate);
        assert_eq!(spec.install.preserve_versions, vec!["1.0.0"]);
    }
}
