//! Decoded job documents and the typed seed parameters of a run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::utils::template;

use super::task::{TaskEntry, TaskList};

/// A job as handed over by the job manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub job_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildsys: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JobDocument {
    Wrapped { job: JobSpec },
    Bare(JobSpec),
}

impl JobSpec {
    /// Decode a JSON or YAML job document after filling `%VAR%` placeholders.
    pub fn parse(content: &str, variables: &HashMap<String, String>) -> Result<Self> {
        let filled = template::fill_job_variables(content, variables);
        let document: JobDocument = match serde_json::from_str(&filled) {
            Ok(document) => document,
            Err(json_err) => serde_yml::from_str(&filled).map_err(|yaml_err| {
                Error::validation_invalid_json(
                    format!("{} (as YAML: {})", json_err, yaml_err),
                    Some("parse job document".to_string()),
                )
            })?,
        };
        let job = match document {
            JobDocument::Wrapped { job } => job,
            JobDocument::Bare(job) => job,
        };
        if job.tasks.is_empty() {
            return Err(Error::validation_invalid_argument(
                "tasks",
                "Job has no tasks",
                (!job.name.is_empty()).then(|| job.name.clone()),
                None,
            ));
        }
        Ok(job)
    }

    pub fn task_list(&self) -> Result<TaskList> {
        let entries = self
            .tasks
            .iter()
            .cloned()
            .map(TaskEntry::from_value)
            .collect::<Result<Vec<_>>>()?;
        TaskList::from_entries(entries)
    }
}

/// Seed values for the execution context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_f: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trans_file_ext: Option<String>,
    /// Release slug to `{platform_version, ...}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_branch_map: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_tp_engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_tp_auth_usr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_tp_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_tp_auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_upstream_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_pipeline_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_ci_engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_ci_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_ci_auth_usr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_ci_auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_release: Option<String>,
    /// List of language codes, or a comma separated string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_target_langs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_project_uid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobParams {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::validation_invalid_json(e, Some("parse job params".to_string())))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::validation_invalid_json(e, Some("parse job params".to_string())))
    }

    /// Fill package and build system from the job when the caller left them out.
    pub fn with_job_defaults(mut self, job: &JobSpec) -> Self {
        if self.package.is_none() {
            self.package = job.package.clone().filter(|p| !p.is_empty());
        }
        if self.build_system.is_none() {
            self.build_system = job.buildsys.clone().filter(|b| !b.is_empty());
        }
        if self.build_tag.is_none() {
            self.build_tag = job.tags.first().cloned();
        }
        if self.release_slug.is_none() {
            self.release_slug = job.release.clone().filter(|r| !r.is_empty());
        }
        self
    }

    /// Flat context seed; unset fields are omitted.
    pub fn to_seed(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
