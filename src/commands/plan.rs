use clap::Args;
use serde::Serialize;
use shipwright::plan::{build_plan, Plan};
use shipwright::steps::{self, PipelineStep};
use shipwright::toolchain::{Toolchain, ToolchainVersionLookup};

use crate::commands::{load_spec, CmdResult};

#[derive(Args)]
pub struct PlanArgs {
    /// Spec: file path, inline JSON, or '-' for stdin
    pub spec: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutput {
    pub plan: Plan,
    pub steps: Vec<PipelineStep>,
}

/// Compute and print the resolved plan plus its step list without
/// executing anything. What you preview is what `run` executes.
pub fn run(args: PlanArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<PlanOutput> {
    let spec = load_spec(&args.spec)?;

    let toolchain = Toolchain::standard(std::time::Duration::from_secs(30));
    let lookup = ToolchainVersionLookup::new(&toolchain);
    let plan = build_plan(&spec, &lookup)?;
    let steps = steps::sequence(&plan);

    Ok((PlanOutput { plan, steps }, 0))
}
