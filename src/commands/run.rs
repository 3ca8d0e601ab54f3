use clap::Args;
use shipwright::context::RunContext;
use shipwright::pipeline::{self, RunReport, RunStatus};
use shipwright::plan::build_plan;
use shipwright::toolchain::{Toolchain, ToolchainVersionLookup};

use crate::commands::{load_spec, CmdResult};

#[derive(Args)]
pub struct RunArgs {
    /// Spec: file path, inline JSON, or '-' for stdin
    pub spec: String,

    /// Per-command timeout for external tools, in seconds
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,
}

pub fn run(args: RunArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<RunReport> {
    let spec = load_spec(&args.spec)?;

    let toolchain = Toolchain::standard(std::time::Duration::from_secs(args.timeout));
    let lookup = ToolchainVersionLookup::new(&toolchain);
    let plan = build_plan(&spec, &lookup)?;

    let mut ctx = RunContext::for_plan(&plan)?;
    ctx.command_timeout = std::time::Duration::from_secs(args.timeout);

    let report = pipeline::run(&plan, &ctx, &toolchain)?;
    let exit_code = match report.status {
        RunStatus::Success => 0,
        RunStatus::PartialSuccess | RunStatus::Failed | RunStatus::Cancelled => 20,
    };

    Ok((report, exit_code))
}
