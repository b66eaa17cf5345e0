//! Command registry and action resolution.
//!
//! A task's command keyword selects a provider; its free-text description
//! selects one operation of that provider: exact name, then alias table, then
//! the best fuzzy match above a fixed cutoff. Empty or tied matches fail.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, ErrorCode, ResolutionDetails, Result};
use crate::providers::{self, CapabilityProvider};
use crate::utils::fuzzy;

use super::task::{TaskList, TaskNode};

const FUZZY_CUTOFF: f64 = 0.6;
const SUGGESTION_DISTANCE: usize = 3;

/// Command keyword to provider.
pub struct CommandRegistry {
    providers: Vec<Box<dyn CapabilityProvider>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for provider in providers::builtin() {
            registry.register(provider);
        }
        registry
    }

    /// Add a provider, replacing any registered under the same command.
    pub fn register(&mut self, provider: Box<dyn CapabilityProvider>) {
        let command = provider.command();
        self.providers.retain(|existing| existing.command() != command);
        self.providers.push(provider);
    }

    pub fn get(&self, command: &str) -> Option<&dyn CapabilityProvider> {
        let wanted = command.trim().to_uppercase();
        self.providers
            .iter()
            .find(|p| p.command() == wanted)
            .map(|p| p.as_ref())
    }

    pub fn commands(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.command()).collect()
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn CapabilityProvider> {
        self.providers.iter().map(|p| p.as_ref())
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Alias,
    Fuzzy { score: f64 },
}

/// A task resolved to one provider operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub command: String,
    pub operation: &'static str,
    /// Node parameters plus any parameter mappings carried in a structured task.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub keyword_params: Map<String, Value>,
    pub matched_by: MatchKind,
}

pub struct ActionResolver<'r> {
    registry: &'r CommandRegistry,
}

impl<'r> ActionResolver<'r> {
    pub fn new(registry: &'r CommandRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, position: usize, node: &TaskNode) -> Result<Resolution> {
        let description = node.task_description();
        let details = |candidates: Vec<String>| ResolutionDetails {
            position,
            command: node.command.clone(),
            description: description.clone(),
            candidates,
        };

        let provider = self.registry.get(&node.command).ok_or_else(|| {
            let mut err = Error::resolution_unknown_command(details(Vec::new()));
            if let Some(suggestion) = self.suggest_command(&node.command) {
                err = err.with_hint(format!("Did you mean '{}'?", suggestion));
            }
            err
        })?;

        let (operation, matched_by) = match_operation(provider, &description)
            .map_err(|(code, candidates)| match code {
                ErrorCode::ResolutionAmbiguous => Error::resolution_ambiguous(details(candidates)),
                _ => Error::resolution_no_match(details(
                    provider.operations().iter().map(|s| s.to_string()).collect(),
                )),
            })?;

        Ok(Resolution {
            command: provider.command().to_string(),
            operation,
            keyword_params: merged_params(node),
            matched_by,
        })
    }

    /// Resolve every node without side effects.
    pub fn plan(&self, list: &TaskList) -> ExecutionPlan {
        let mut plan = ExecutionPlan::default();
        for (position, node) in list.iter() {
            let outcome = self.resolve(position, node);
            if let Err(err) = &outcome {
                plan.warnings
                    .push(format!("Task {} ({}): {}", position, node.command, err.message));
            }
            plan.steps.push(PlanStep {
                position,
                command: node.command.clone(),
                description: node.task_description(),
                outcome,
            });
        }
        plan
    }

    fn suggest_command(&self, command: &str) -> Option<&'static str> {
        let wanted = command.trim().to_uppercase();
        self.registry
            .commands()
            .into_iter()
            .map(|candidate| (candidate, fuzzy::levenshtein(&wanted, candidate)))
            .filter(|(_, distance)| *distance <= SUGGESTION_DISTANCE)
            .min_by_key(|(_, distance)| *distance)
            .map(|(candidate, _)| candidate)
    }
}

/// Lower-case, `_`/`-` as spaces, single spaces.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn match_operation(
    provider: &dyn CapabilityProvider,
    description: &str,
) -> std::result::Result<(&'static str, MatchKind), (ErrorCode, Vec<String>)> {
    let wanted = normalize(description);
    if wanted.is_empty() {
        return Err((ErrorCode::ResolutionNoMatch, Vec::new()));
    }

    let operations = provider.operations();
    if let Some(operation) = operations.iter().find(|op| normalize(op) == wanted) {
        return Ok((operation, MatchKind::Exact));
    }
    if let Some((_, operation)) = provider
        .aliases()
        .iter()
        .find(|(phrase, _)| normalize(phrase) == wanted)
    {
        return Ok((operation, MatchKind::Alias));
    }

    let normalized: Vec<String> = operations.iter().map(|op| normalize(op)).collect();
    let names: Vec<&str> = normalized.iter().map(|s| s.as_str()).collect();
    let matches = fuzzy::close_matches(&wanted, &names, FUZZY_CUTOFF);
    let Some(&(_, best)) = matches.first() else {
        return Err((ErrorCode::ResolutionNoMatch, Vec::new()));
    };

    let tied: Vec<usize> = matches
        .iter()
        .filter(|(_, score)| (*score - best).abs() < f64::EPSILON)
        .filter_map(|(name, _)| names.iter().position(|n| n == name))
        .collect();
    if tied.len() > 1 {
        let candidates = tied.iter().map(|&i| operations[i].to_string()).collect();
        return Err((ErrorCode::ResolutionAmbiguous, candidates));
    }

    let index = tied
        .first()
        .copied()
        .ok_or((ErrorCode::ResolutionNoMatch, Vec::new()))?;
    Ok((operations[index], MatchKind::Fuzzy { score: best }))
}

/// Structured task parameters first, then the node's own parameters on top.
fn merged_params(node: &TaskNode) -> Map<String, Value> {
    let mut params = Map::new();
    if let Value::Array(items) = &node.task {
        for item in items.iter().skip(1) {
            if let Value::Object(extra) = item {
                for (key, value) in extra {
                    params.insert(key.clone(), value.clone());
                }
            }
        }
    }
    for (key, value) in &node.keyword_params {
        params.insert(key.clone(), value.clone());
    }
    params
}

#[derive(Debug, Clone)]
pub struct PlanStep {
    pub position: usize,
    pub command: String,
    pub description: String,
    pub outcome: Result<Resolution>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepStatus {
    Resolved,
    Unresolved,
}

/// Serializable view of one plan step.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStepView {
    pub position: usize,
    pub command: String,
    pub description: String,
    pub status: PlanStepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<MatchKind>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub keyword_params: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-position resolution of a whole task list.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
    pub warnings: Vec<String>,
}

impl ExecutionPlan {
    pub fn is_resolved(&self) -> bool {
        self.steps.iter().all(|step| step.outcome.is_ok())
    }

    pub fn resolution(&self, position: usize) -> Option<&Result<Resolution>> {
        self.steps
            .iter()
            .find(|step| step.position == position)
            .map(|step| &step.outcome)
    }

    /// Fail with every unresolved position when any step is unresolved.
    pub fn ensure_resolved(&self) -> Result<()> {
        let failed: Vec<&PlanStep> = self.steps.iter().filter(|s| s.outcome.is_err()).collect();
        if failed.is_empty() {
            return Ok(());
        }
        if let [single] = failed.as_slice() {
            if let Err(err) = &single.outcome {
                return Err(err.clone());
            }
        }
        let positions = failed.iter().map(|s| s.position).collect();
        let problems = failed
            .iter()
            .filter_map(|s| s.outcome.as_ref().err().map(|e| e.message.clone()))
            .collect();
        Err(Error::resolution_unresolved(positions, problems))
    }

    pub fn views(&self) -> Vec<PlanStepView> {
        self.steps
            .iter()
            .map(|step| {
                let (status, operation, matched_by, keyword_params, error) = match &step.outcome {
                    Ok(resolution) => (
                        PlanStepStatus::Resolved,
                        Some(resolution.operation),
                        Some(resolution.matched_by.clone()),
                        resolution.keyword_params.clone(),
                        None,
                    ),
                    Err(err) => (
                        PlanStepStatus::Unresolved,
                        None,
                        None,
                        Map::new(),
                        Some(err.message.clone()),
                    ),
                };
                PlanStepView {
                    position: step.position,
                    command: step.command.clone(),
                    description: step.description.clone(),
                    status,
                    operation,
                    matched_by,
                    keyword_params,
                    error,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{StepCall, StepOutput};
    use serde_json::json;

    struct Twins;

    impl CapabilityProvider for Twins {
        fn command(&self) -> &'static str {
            "TWINS"
        }

        fn operations(&self) -> &'static [&'static str] {
            &["pull_translations", "translation_files"]
        }

        fn invoke(&self, _: &StepCall<'_>) -> Result<StepOutput> {
            unreachable!()
        }
    }

    fn resolve(command: &str, description: &str) -> Result<Resolution> {
        let registry = CommandRegistry::with_builtin();
        ActionResolver::new(&registry).resolve(0, &TaskNode::new(command, description))
    }

    #[test]
    fn stats_resolves_to_stats() {
        let resolution = resolve("CALCULATE", "Stats").unwrap();
        assert_eq!(resolution.operation, "stats");
        assert_eq!(resolution.matched_by, MatchKind::Exact);
    }

    #[test]
    fn resolution_is_idempotent() {
        let registry = CommandRegistry::with_builtin();
        let resolver = ActionResolver::new(&registry);
        let node = TaskNode::new("FILTER", "PO files");
        let first = resolver.resolve(1, &node).unwrap();
        let second = resolver.resolve(1, &node).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.operation, "files");
        assert!(matches!(first.matched_by, MatchKind::Fuzzy { .. }));
    }

    #[test]
    fn alias_table_wins_before_fuzzy() {
        let resolution = resolve("clone", "latest git branch").unwrap();
        assert_eq!(resolution.command, "CLONE");
        assert_eq!(resolution.operation, "git_repository");
        assert_eq!(resolution.matched_by, MatchKind::Alias);
    }

    #[test]
    fn tied_fuzzy_scores_are_ambiguous() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(Twins));
        let err = ActionResolver::new(&registry)
            .resolve(0, &TaskNode::new("TWINS", "translations"))
            .unwrap_err();
        assert_eq!(err.code.as_str(), "resolution.ambiguous");
        assert_eq!(err.details["candidates"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn nothing_close_is_no_match() {
        let err = resolve("CALCULATE", "frobnicate everything").unwrap_err();
        assert_eq!(err.code.as_str(), "resolution.no_match");
        let err = resolve("CALCULATE", "   ").unwrap_err();
        assert_eq!(err.code.as_str(), "resolution.no_match");
    }

    #[test]
    fn unknown_command_suggests_nearest() {
        let err = resolve("CLONEE", "git repository").unwrap_err();
        assert_eq!(err.code.as_str(), "resolution.unknown_command");
        assert_eq!(err.message, "Action mapping failed for CLONEE command.");
        assert!(err.hints.iter().any(|h| h.message.contains("CLONE")));
    }

    #[test]
    fn structured_task_params_merge_under_node_params() {
        let node = TaskNode {
            command: "CLONE".to_string(),
            task: json!([{"name": "git repository"}, {"type": "l10n", "branch": "main"}]),
            keyword_params: json!({"branch": "devel"}).as_object().cloned().unwrap(),
        };
        let registry = CommandRegistry::with_builtin();
        let resolution = ActionResolver::new(&registry).resolve(0, &node).unwrap();
        assert_eq!(resolution.keyword_params["type"], "l10n");
        assert_eq!(resolution.keyword_params["branch"], "devel");
    }

    #[test]
    fn plan_reports_each_position() {
        let mut list = TaskList::new();
        list.add_task("CLONE: latest git branch").unwrap();
        list.add_task("BOGUS: anything").unwrap();
        list.add_task("CALCULATE: Stats").unwrap();

        let registry = CommandRegistry::with_builtin();
        let plan = ActionResolver::new(&registry).plan(&list);
        assert!(!plan.is_resolved());
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.resolution(2).unwrap().is_ok());

        let err = plan.ensure_resolved().unwrap_err();
        assert_eq!(err.code.as_str(), "resolution.unknown_command");

        let views = plan.views();
        assert_eq!(views[1].error.as_deref(), Some("Action mapping failed for BOGUS command."));
    }

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize("  Latest_Build-Info  "), "latest build info");
    }
}
