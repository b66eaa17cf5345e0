use clap::Args;
use serde::Serialize;

use transtats_jobs::engine::resolver::PlanStepView;
use transtats_jobs::engine::{ActionResolver, CommandRegistry};

use super::CmdResult;

#[derive(Args)]
pub struct PlanArgs {
    /// Job document (JSON or YAML file, or - for stdin)
    pub job: String,

    /// Fill %KEY% placeholders in the job document
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PlanOutput {
    command: String,
    job: String,
    resolved: bool,
    steps: Vec<PlanStepView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

/// Resolve every task without running anything. Exits 4 when a task is
/// unresolved.
pub fn run(args: PlanArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<PlanOutput> {
    let variables = super::parse_vars(&args.vars)?;
    let job = super::load_job(&args.job, &variables)?;
    let list = job.task_list()?;

    let registry = CommandRegistry::with_builtin();
    let plan = ActionResolver::new(&registry).plan(&list);
    let resolved = plan.is_resolved();

    Ok((
        PlanOutput {
            command: "plan".to_string(),
            job: job.name,
            resolved,
            steps: plan.views(),
            warnings: plan.warnings,
        },
        if resolved { 0 } else { 4 },
    ))
}
