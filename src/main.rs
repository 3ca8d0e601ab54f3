use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{plan, run, version, GlobalArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "shipwright")]
#[command(version = VERSION)]
#[command(about = "Build, sign, package, publish, and install script modules")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the release pipeline for a spec
    Run(run::RunArgs),
    /// Show the resolved plan and step list without executing
    Plan(plan::PlanArgs),
    /// Resolve the target version for a spec
    Version(version::VersionArgs),
}

fn run_json(command: Commands, global: &GlobalArgs) -> (shipwright::Result<serde_json::Value>, i32) {
    match command {
        Commands::Run(args) => output::map_cmd_result_to_json(run::run(args, global)),
        Commands::Plan(args) => output::map_cmd_result_to_json(plan::run(args, global)),
        Commands::Version(args) => output::map_cmd_result_to_json(version::run(args, global)),
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    let (json_result, exit_code) = run_json(cli.command, &global);
    output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
