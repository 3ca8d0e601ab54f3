use clap::Args;
use serde::Serialize;
use shipwright::plan::build_plan;
use shipwright::toolchain::{Toolchain, ToolchainVersionLookup};
use shipwright::version::VersionSource;

use crate::commands::{load_spec, CmdResult};

#[derive(Args)]
pub struct VersionArgs {
    /// Spec: file path, inline JSON, or '-' for stdin
    pub spec: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionOutput {
    pub module_name: String,
    pub expression: String,
    pub resolved_version: String,
    pub source: VersionSource,
}

/// Resolve the target version for a spec without building anything.
pub fn run(args: VersionArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<VersionOutput> {
    let spec = load_spec(&args.spec)?;

    let toolchain = Toolchain::standard(std::time::Duration::from_secs(30));
    let lookup = ToolchainVersionLookup::new(&toolchain);
    let plan = build_plan(&spec, &lookup)?;

    Ok((
        VersionOutput {
            module_name: plan.module_name,
            expression: plan.expected_version,
            resolved_version: plan.resolved_version,
            source: plan.version_source,
        },
        0,
    ))
}
