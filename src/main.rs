use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{config, plan, providers, run};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "transtats-jobs")]
#[command(version = VERSION)]
#[command(about = "Run translation pipeline jobs: clone, download, filter, calculate, upload")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a job document against seed params
    Run(run::RunArgs),
    /// Resolve a job's tasks without running them
    Plan(plan::PlanArgs),
    /// List command keywords, operations and aliases
    Providers(providers::ProvidersArgs),
    /// Show engine configuration
    Config(config::ConfigArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    if output::print_json_result(json_result).is_err() {
        return std::process::ExitCode::from(1);
    }

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
