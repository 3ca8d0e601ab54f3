//! Boundary implementations bundled for the runner.
//!
//! The pipeline only ever sees trait objects; this module picks the shipped
//! implementations and wires the plan builder's version lookup to them.

use std::path::Path;
use std::time::Duration;

use crate::deps::{CommandModuleInstaller, ModuleInstaller};
use crate::docs::{CommentHelpGenerator, HelpGenerator};
use crate::error::Result;
use crate::manifest::{self, JsonManifestEditor, ManifestEditor};
use crate::plan::VersionLookup;
use crate::publish::{CommandPackageRegistry, GitHubReleaseHost, PackageRegistry, ReleaseHost};
use crate::signing::{CommandSigningTool, SigningTool};
use crate::staging::{CopyStagingBuilder, StagingBuilder};

/// Default external tool programs. Overridable by constructing a custom
/// toolchain; the pipeline itself never names a tool.
const DEFAULT_PACKAGE_TOOL: &str = "modget";
const DEFAULT_SIGNING_TOOL: &str = "scriptsign";

pub struct Toolchain {
    pub manifest: Box<dyn ManifestEditor>,
    pub builder: Box<dyn StagingBuilder>,
    pub installer: Box<dyn ModuleInstaller>,
    pub signer: Box<dyn SigningTool>,
    pub registry: Box<dyn PackageRegistry>,
    pub releases: Box<dyn ReleaseHost>,
    pub help: Box<dyn HelpGenerator>,
}

impl Toolchain {
    /// The standard toolchain: JSON manifests, copy-based staging build,
    /// command-line package manager and signer, GitHub-style release host.
    pub fn standard(command_timeout: Duration) -> Self {
        Self {
            manifest: Box::new(JsonManifestEditor::new()),
            builder: Box::new(CopyStagingBuilder::new()),
            installer: Box::new(CommandModuleInstaller::new(
                DEFAULT_PACKAGE_TOOL,
                command_timeout,
            )),
            signer: Box::new(CommandSigningTool::new(
                DEFAULT_SIGNING_TOOL,
                command_timeout,
            )),
            registry: Box::new(CommandPackageRegistry::new(
                DEFAULT_PACKAGE_TOOL,
                command_timeout,
            )),
            releases: Box::new(GitHubReleaseHost::new(command_timeout)),
            help: Box::new(CommentHelpGenerator::new()),
        }
    }
}

/// Version lookup backed by the toolchain's registry and manifest editor.
/// A registry that cannot be reached degrades to `None` so auto-step
/// resolution can still proceed from the local manifest.
pub struct ToolchainVersionLookup<'a> {
    toolchain: &'a Toolchain,
}

impl<'a> ToolchainVersionLookup<'a> {
    pub fn new(toolchain: &'a Toolchain) -> Self {
        Self { toolchain }
    }
}

impl VersionLookup for ToolchainVersionLookup<'_> {
    fn remote_latest(&self, module_name: &str) -> Result<Option<String>> {
        match self.toolchain.registry.latest_version(module_name, None) {
            Ok(version) => Ok(version),
            Err(e) => {
                log_status!(
                    "plan",
                    "Remote version lookup for {} failed: {}",
                    module_name,
                    e.message
                );
                Ok(None)
            }
        }
    }

    fn local_manifest_version(
        &self,
        source_root: &Path,
        module_name: &str,
    ) -> Result<Option<String>> {
        let path = manifest::manifest_path(source_root, module_name);
        if !path.is_file() {
            return Ok(None);
        }
        let metadata = self.toolchain.manifest.read_metadata(&path)?;
        Ok(if metadata.version.trim().is_empty() {
            None
        } else {
            Some(metadata.version)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn local_lookup_reads_the_source_manifest() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("Sample.json"),
            r#"{"name":"Sample","version":"2.0.5"}"#,
        )
        .unwrap();

        let toolchain = Toolchain::standard(Duration::from_secs(5));
        let lookup = ToolchainVersionLookup::new(&toolchain);

        let version = lookup
            .local_manifest_version(dir.path(), "Sample")
            .unwrap();
        assert_eq!(version.as_deref(), Some("2.0.5"));
    }

    #[test]
    fn missing_manifest_yields_none() {
        let dir = tempdir().unwrap();
        let toolchain = Toolchain::standard(Duration::from_secs(5));
        let lookup = ToolchainVersionLookup::new(&toolchain);

        let version = lookup
            .local_manifest_version(dir.path(), "Sample")
            .unwrap();
        assert_eq!(version, None);
    }

    #[test]
    fn unreachable_registry_degrades_to_none() {
        let toolchain = Toolchain::standard(Duration::from_secs(1));
        let lookup = ToolchainVersionLookup::new(&toolchain);
        // The default package tool is not installed in the test environment.
        assert_eq!(lookup.remote_latest("Sample").unwrap(), None);
    }
}
