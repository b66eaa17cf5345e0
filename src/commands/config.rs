use clap::{Args, Subcommand};
use serde::Serialize;

use transtats_jobs::defaults::{self, JobsConfig};

use super::CmdResult;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Display configuration (merged defaults + file)
    Show {
        /// Show only built-in defaults (ignore jobs.json)
        #[arg(long)]
        builtin: bool,
    },
    /// Show the path to jobs.json
    Path,
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<JobsConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exists: Option<bool>,
}

pub fn run(args: ConfigArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    match args.command {
        ConfigCommand::Show { builtin } => show(builtin),
        ConfigCommand::Path => path(),
    }
}

fn show(builtin: bool) -> CmdResult<ConfigOutput> {
    let config = if builtin {
        JobsConfig::default()
    } else {
        defaults::load_config()
    };
    Ok((
        ConfigOutput {
            command: "config.show".to_string(),
            config: Some(config),
            path: None,
            exists: None,
        },
        0,
    ))
}

fn path() -> CmdResult<ConfigOutput> {
    Ok((
        ConfigOutput {
            command: "config.path".to_string(),
            config: None,
            path: Some(defaults::config_path()?),
            exists: Some(defaults::config_exists()),
        },
        0,
    ))
}
