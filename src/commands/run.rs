use clap::Args;
use serde::Serialize;
use serde_json::Value;

use transtats_jobs::defaults;
use transtats_jobs::engine::{CommandRegistry, JobParams, PipelineExecutor, RunReport, RunStatus};
use transtats_jobs::services::Services;

use super::CmdResult;

#[derive(Args)]
pub struct RunArgs {
    /// Job document (JSON or YAML file, or - for stdin)
    pub job: String,

    /// Seed params (JSON object, @file or -)
    #[arg(long, value_name = "JSON")]
    pub params: Option<String>,

    /// Fill %KEY% placeholders in the job document
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Run resolved tasks even when others failed to resolve
    #[arg(long)]
    pub lenient: bool,

    /// Extra params as --key value pairs, after a '--' separator
    #[arg(last = true, allow_hyphen_values = true)]
    pub extra: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    command: String,
    job: String,
    #[serde(flatten)]
    report: RunReport,
}

pub fn run(args: RunArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<RunOutput> {
    let mut params = super::read_params(args.params.as_deref())?;
    params.extend(super::parse_kv_flags(&args.extra)?);

    let variables = super::job_variables(&params, &args.vars)?;
    let job = super::load_job(&args.job, &variables)?;
    let mut list = job.task_list()?;
    let seed = JobParams::from_value(Value::Object(params))?.with_job_defaults(&job);

    let mut config = defaults::load_engine_config();
    if args.lenient {
        config.strict_resolution = false;
    }
    let registry = CommandRegistry::with_builtin();
    let services = Services::default();

    let report = PipelineExecutor::new(&registry, &config, &services).run(&mut list, &seed)?;
    let exit_code = match report.status {
        RunStatus::Failed => 20,
        RunStatus::Success | RunStatus::EarlyExit => 0,
    };

    Ok((
        RunOutput {
            command: "run".to_string(),
            job: job.name,
            report,
        },
        exit_code,
    ))
}
