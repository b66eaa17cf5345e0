//! Pipeline executor.
//!
//! Walks the task list head to tail. Each step sees a snapshot of the
//! execution context, its output is merged back (last writer wins) and any
//! path it produced inside the sandbox is registered for cleanup before the
//! next step starts.
//! The cleanup guard runs on every exit path.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::defaults::EngineConfig;
use crate::error::{Error, Result};
use crate::log_status;
use crate::providers::{StepCall, StepEnv};
use crate::services::Services;

use super::cleanup::{CleanupGuard, CleanupReport, ResourceKind};
use super::context::{is_truthy, ExecutionContext};
use super::job::JobParams;
use super::log::{RunLog, StepLog};
use super::resolver::{ActionResolver, CommandRegistry, ExecutionPlan};
use super::sandbox::Sandbox;
use super::task::TaskList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    EarlyExit,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Returned a non-empty result.
    Completed,
    /// Ran but found nothing.
    Empty,
    Failed,
}

/// What happened at one list position.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub position: usize,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<&'static str>,
    pub status: StepStatus,
    /// Context snapshot the step was invoked with.
    #[serde(skip)]
    pub input: Map<String, Value>,
    #[serde(skip)]
    pub output: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<Value>,
    pub log: RunLog,
    pub steps: Vec<StepRecord>,
    pub sandbox: String,
    pub cleanup: CleanupReport,
    #[serde(skip)]
    pub context: ExecutionContext,
}

impl RunReport {
    pub fn step(&self, position: usize) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.position == position)
    }
}

/// Mutable state of one run, kept outside the loop so a failure can still
/// report it.
struct RunState {
    context: ExecutionContext,
    log: RunLog,
    steps: Vec<StepRecord>,
    result: Option<Value>,
    build: Option<Value>,
}

pub struct PipelineExecutor<'a> {
    registry: &'a CommandRegistry,
    config: &'a EngineConfig,
    services: &'a Services,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(registry: &'a CommandRegistry, config: &'a EngineConfig, services: &'a Services) -> Self {
        Self {
            registry,
            config,
            services,
        }
    }

    pub fn plan(&self, list: &TaskList) -> ExecutionPlan {
        ActionResolver::new(self.registry).plan(list)
    }

    pub fn run(&self, list: &mut TaskList, params: &JobParams) -> Result<RunReport> {
        self.run_with_seed(list, params.to_seed())
    }

    pub fn run_with_seed(&self, list: &mut TaskList, seed: Map<String, Value>) -> Result<RunReport> {
        let plan = self.plan(list);
        for warning in &plan.warnings {
            log_status!("plan", "{}", warning);
        }
        if self.config.strict_resolution {
            plan.ensure_resolved()?;
        }

        let sandbox = Sandbox::create(&self.config.sandbox_root_path())?;
        let mut guard = CleanupGuard::new();
        guard.register(ResourceKind::Sandbox, sandbox.path());

        let mut state = RunState {
            context: ExecutionContext::new(seed),
            log: RunLog::default(),
            steps: Vec::new(),
            result: None,
            build: None,
        };

        let outcome = self.drive(list, &plan, &sandbox, &mut guard, &mut state);
        let cleanup = guard.finish();
        for failure in &cleanup.failed {
            log_status!("cleanup", "Could not remove {}: {}", failure.path, failure.error);
        }

        match outcome {
            Ok(status) => Ok(RunReport {
                run_id: sandbox.run_id().to_string(),
                status,
                result: state.result,
                build: state.build,
                log: state.log,
                steps: state.steps,
                sandbox: sandbox.path().display().to_string(),
                cleanup,
                context: state.context,
            }),
            Err(err) => {
                let steps = serde_json::to_value(&state.steps).unwrap_or(Value::Null);
                Err(err
                    .with_detail("run_id", Value::String(sandbox.run_id().to_string()))
                    .with_detail("status", Value::String("failed".to_string()))
                    .with_detail("log", state.log.to_value())
                    .with_detail("steps", steps))
            }
        }
    }

    fn drive(
        &self,
        list: &mut TaskList,
        plan: &ExecutionPlan,
        sandbox: &Sandbox,
        guard: &mut CleanupGuard,
        state: &mut RunState,
    ) -> Result<RunStatus> {
        let env = StepEnv {
            sandbox,
            config: self.config,
            services: self.services,
        };
        let positions: Vec<(usize, String)> =
            list.iter().map(|(p, node)| (p, node.command.clone())).collect();

        for (position, command) in positions {
            let input = state.context.snapshot();
            let resolution = match plan.resolution(position) {
                Some(Ok(resolution)) => resolution,
                Some(Err(err)) => {
                    state.steps.push(failed_record(position, &command, None, input));
                    return Err(err.clone());
                }
                None => {
                    return Err(Error::internal_unexpected(format!(
                        "No resolution recorded for task {}",
                        position
                    )))
                }
            };

            log_status!("run", "Task {}: {} {}", position, command, resolution.operation);
            let call = StepCall {
                operation: resolution.operation,
                input: &input,
                params: &resolution.keyword_params,
                env,
            };
            let provider = self.registry.get(&resolution.command).ok_or_else(|| {
                Error::internal_unexpected(format!("Provider {} vanished", resolution.command))
            })?;

            let step = match provider.invoke(&call) {
                Ok(step) => step,
                Err(err) => {
                    absorb_step_log(&mut state.log, &err);
                    state.steps.push(failed_record(
                        position,
                        &command,
                        Some(resolution.operation),
                        input,
                    ));
                    list.set_status(false);
                    return Err(err);
                }
            };

            state.log.append(&step.log);
            let output = step.result.filter(|o| !o.is_empty());
            list.set_status(is_truthy(output.as_ref()));

            let mut early_exit = false;
            if let Some(output) = &output {
                state.context.merge(output);
                // Only paths this step created inside the sandbox are run-owned.
                for (key, value) in output {
                    let (Some(kind), Some(path)) = (ResourceKind::from_output_key(key), value.as_str()) else {
                        continue;
                    };
                    if input.get(key) != Some(value) && sandbox.owns(Path::new(path)) {
                        guard.register(kind, path);
                    }
                }

                if let Some(Value::Array(builds)) = output.get("builds") {
                    match builds.first() {
                        Some(build) => state.build = Some(build.clone()),
                        None => early_exit = true,
                    }
                }

                if let Some(stats) = output.get("trans_stats") {
                    state.result = Some(stats.clone());
                } else if output.contains_key("pot_diff") || output.contains_key("push_files_resp") {
                    state.result = Some(Value::Object(output.clone()));
                }
            }

            state.steps.push(StepRecord {
                position,
                command,
                operation: Some(resolution.operation),
                status: if output.is_some() {
                    StepStatus::Completed
                } else {
                    StepStatus::Empty
                },
                input,
                output,
            });

            if early_exit {
                log_status!("run", "No build found, stopping after task {}", position);
                return Ok(RunStatus::EarlyExit);
            }
        }

        Ok(RunStatus::Success)
    }
}

fn failed_record(
    position: usize,
    command: &str,
    operation: Option<&'static str>,
    input: Map<String, Value>,
) -> StepRecord {
    StepRecord {
        position,
        command: command.to_string(),
        operation,
        status: StepStatus::Failed,
        input,
        output: None,
    }
}

/// Fold the failing step's partial log into the run log.
fn absorb_step_log(log: &mut RunLog, err: &Error) {
    let Some(Value::Object(subjects)) = err.details.get("step_log") else {
        return;
    };
    for (subject, entries) in subjects {
        if let Value::Object(entries) = entries {
            let mut step = StepLog::detached(subject.clone());
            step.entries = entries.clone();
            log.append(&step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CapabilityProvider, StepOutput};
    use serde_json::json;
    use tempfile::TempDir;

    /// Returns the `{op}` entry of its params as output.
    struct Echo;

    impl CapabilityProvider for Echo {
        fn command(&self) -> &'static str {
            "ECHO"
        }

        fn operations(&self) -> &'static [&'static str] {
            &["emit", "fail", "produce"]
        }

        fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
            let mut log = call.log(format!("Echo {}", call.operation))?;
            log.info("ran")?;
            if call.operation == "fail" {
                return Err(call.fail(&log, Error::provider_failed("ECHO", "fail", "boom")));
            }
            if call.operation == "produce" {
                let artifact = call.env.sandbox.join("artifact.src.rpm");
                std::fs::write(&artifact, b"rpm").unwrap();
                let mut output = Map::new();
                output.insert("srpm_path".into(), json!(artifact.display().to_string()));
                return Ok(StepOutput::with_result(output, log));
            }
            let output = call
                .params
                .get("emit")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default();
            Ok(StepOutput::with_result(output, log))
        }
    }

    fn setup() -> (TempDir, CommandRegistry, EngineConfig, Services) {
        let root = TempDir::new().unwrap();
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(Echo));
        let config = EngineConfig {
            sandbox_root: root.path().display().to_string(),
            ..EngineConfig::default()
        };
        (root, registry, config, Services::default())
    }

    fn echo(emit: Value) -> crate::engine::task::TaskNode {
        crate::engine::task::TaskNode::new("ECHO", "emit").with_param("emit", emit)
    }

    #[test]
    fn later_outputs_win_and_inputs_see_earlier_ones() {
        let (_root, registry, config, services) = setup();
        let mut list = TaskList::new();
        list.add_task(echo(json!({"a": 1}))).unwrap();
        list.add_task(echo(json!({"a": 2, "b": true}))).unwrap();

        let report = PipelineExecutor::new(&registry, &config, &services)
            .run_with_seed(&mut list, Map::new())
            .unwrap();

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.step(1).unwrap().input["a"], 1);
        assert_eq!(report.context.get("a"), Some(&json!(2)));
        assert!(list.status());
    }

    #[test]
    fn empty_builds_stop_the_run() {
        let (_root, registry, config, services) = setup();
        let mut list = TaskList::new();
        list.add_task(echo(json!({"builds": []}))).unwrap();
        list.add_task(echo(json!({"never": true}))).unwrap();

        let report = PipelineExecutor::new(&registry, &config, &services)
            .run_with_seed(&mut list, Map::new())
            .unwrap();

        assert_eq!(report.status, RunStatus::EarlyExit);
        assert_eq!(report.steps.len(), 1);
        assert!(report.context.get("never").is_none());
    }

    #[test]
    fn failure_cleans_up_and_carries_log() {
        let (root, registry, config, services) = setup();
        let mut list = TaskList::new();
        list.add_task("ECHO: produce").unwrap();
        list.add_task("ECHO: fail").unwrap();

        let err = PipelineExecutor::new(&registry, &config, &services)
            .run_with_seed(&mut list, Map::new())
            .unwrap_err();

        assert_eq!(err.code.as_str(), "provider.failed");
        assert_eq!(err.details["status"], "failed");
        assert!(err.details["log"]["Echo fail"].is_object());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn produced_paths_inside_sandbox_are_registered() {
        let (_root, registry, config, services) = setup();
        let mut list = TaskList::new();
        list.add_task("ECHO: produce").unwrap();

        let report = PipelineExecutor::new(&registry, &config, &services)
            .run_with_seed(&mut list, Map::new())
            .unwrap();

        let artifact = report.context.get("srpm_path").and_then(|v| v.as_str()).unwrap().to_string();
        assert_eq!(report.cleanup.removed[0], artifact);
        assert_eq!(report.cleanup.removed[1], report.sandbox);
    }

    #[test]
    fn paths_outside_sandbox_are_never_removed() {
        let (_root, registry, config, services) = setup();
        let elsewhere = TempDir::new().unwrap();
        let seeded = elsewhere.path().join("checkout");
        std::fs::create_dir_all(&seeded).unwrap();
        std::fs::write(seeded.join("keep.txt"), "x").unwrap();
        let emitted = elsewhere.path().join("cache.src.rpm");
        std::fs::write(&emitted, b"rpm").unwrap();

        let mut list = TaskList::new();
        list.add_task(echo(json!({"src_tar_dir": seeded.display().to_string()}))).unwrap();
        list.add_task(echo(json!({"srpm_path": emitted.display().to_string()}))).unwrap();
        list.add_task("ECHO: fail").unwrap();

        let mut seed = Map::new();
        seed.insert("src_tar_dir".into(), json!(seeded.display().to_string()));
        PipelineExecutor::new(&registry, &config, &services)
            .run_with_seed(&mut list, seed)
            .unwrap_err();

        assert!(seeded.join("keep.txt").is_file());
        assert!(emitted.is_file());
    }

    #[test]
    fn strict_resolution_rejects_before_sandbox() {
        let (root, registry, config, services) = setup();
        let mut list = TaskList::new();
        list.add_task(echo(json!({"a": 1}))).unwrap();
        list.add_task("NOPE: nothing").unwrap();

        let err = PipelineExecutor::new(&registry, &config, &services)
            .run_with_seed(&mut list, Map::new())
            .unwrap_err();
        assert_eq!(err.code.as_str(), "resolution.unknown_command");
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn lenient_resolution_fails_when_reached() {
        let (_root, registry, mut config, services) = setup();
        config.strict_resolution = false;
        let mut list = TaskList::new();
        list.add_task(echo(json!({"a": 1}))).unwrap();
        list.add_task("NOPE: nothing").unwrap();

        let err = PipelineExecutor::new(&registry, &config, &services)
            .run_with_seed(&mut list, Map::new())
            .unwrap_err();
        assert_eq!(err.code.as_str(), "resolution.unknown_command");
        assert_eq!(err.details["steps"][0]["status"], "completed");
        assert_eq!(err.details["steps"][1]["status"], "failed");
    }
}
