//! Capability providers: one per command keyword.
//!
//! A provider declares the operation names it can perform and executes one of
//! them against a snapshot of the execution context plus the task's keyword
//! parameters. Providers never touch the shared context or cleanup registry;
//! they return an output mapping and the executor merges it.

use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::defaults::EngineConfig;
use crate::engine::log::StepLog;
use crate::engine::sandbox::Sandbox;
use crate::error::{Error, Result};
use crate::services::Services;

pub mod apply;
pub mod calculate;
pub mod clone;
pub mod copy;
pub mod download;
pub mod filter;
pub mod generate;
pub mod get;
pub mod load;
pub mod pullrequest;
pub mod unpack;
pub mod upload;

pub trait CapabilityProvider: Send + Sync {
    /// Upper-case command keyword, e.g. `CLONE`.
    fn command(&self) -> &'static str;

    /// Operation names, matched against task descriptions.
    fn operations(&self) -> &'static [&'static str];

    /// `(phrase, operation)` pairs matched exactly before fuzzy matching.
    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput>;
}

/// Run-scoped handles a provider may use.
#[derive(Clone, Copy)]
pub struct StepEnv<'a> {
    pub sandbox: &'a Sandbox,
    pub config: &'a EngineConfig,
    pub services: &'a Services,
}

/// One invocation of a resolved operation.
pub struct StepCall<'a> {
    pub operation: &'a str,
    pub input: &'a Map<String, Value>,
    pub params: &'a Map<String, Value>,
    pub env: StepEnv<'a>,
}

/// Result mapping (absent when the step found nothing) and the step log.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub result: Option<Map<String, Value>>,
    pub log: StepLog,
}

impl StepOutput {
    pub fn with_result(result: Map<String, Value>, log: StepLog) -> Self {
        Self {
            result: Some(result),
            log,
        }
    }

    pub fn empty(log: StepLog) -> Self {
        Self { result: None, log }
    }
}

impl<'a> StepCall<'a> {
    pub fn log(&self, subject: impl Into<String>) -> Result<StepLog> {
        StepLog::new(subject, self.input)
    }

    pub fn input(&self, key: &str) -> Option<&'a Value> {
        self.input.get(key).filter(|v| !v.is_null())
    }

    /// Non-empty string input.
    pub fn input_str(&self, key: &str) -> Option<&'a str> {
        self.input
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn require_str(&self, key: &str) -> Result<&'a str> {
        self.input_str(key)
            .ok_or_else(|| Error::provider_missing_input(self.operation, key))
    }

    pub fn require_path(&self, key: &str) -> Result<PathBuf> {
        self.require_str(key).map(PathBuf::from)
    }

    pub fn param(&self, key: &str) -> Option<&'a Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }

    /// Non-empty string parameter. Numbers are rendered as text.
    pub fn param_str(&self, key: &str) -> Option<String> {
        match self.params.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn param_bool(&self, key: &str) -> bool {
        self.params.get(key).map(truthy).unwrap_or(false)
    }

    /// Error for an operation name the provider does not declare.
    pub fn unknown_operation(&self, command: &str) -> Error {
        Error::internal_unexpected(format!("{} has no operation '{}'", command, self.operation))
    }

    /// Attach the step log to an error raised mid-operation.
    pub fn fail(&self, log: &StepLog, err: Error) -> Error {
        attach_log(err, log)
    }
}

/// Put a step's log entries into the error details under `step_log`.
pub fn attach_log(err: Error, log: &StepLog) -> Error {
    if log.is_empty() {
        return err;
    }
    let mut step_log = Map::new();
    step_log.insert(log.subject.clone(), Value::Object(log.entries.clone()));
    err.with_detail("step_log", Value::Object(step_log))
}

/// Truthiness of a JSON value: empty strings, zero, empty collections,
/// `false` and `null` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Every built-in provider, one per command keyword.
pub fn builtin() -> Vec<Box<dyn CapabilityProvider>> {
    vec![
        Box::new(clone::CloneRepository),
        Box::new(download::Download),
        Box::new(unpack::Unpack),
        Box::new(filter::Filter),
        Box::new(load::Load),
        Box::new(apply::Apply),
        Box::new(generate::Generate),
        Box::new(calculate::Calculate),
        Box::new(copy::CopyFiles),
        Box::new(upload::Upload),
        Box::new(pullrequest::PullRequest),
        Box::new(get::Get),
    ]
}
