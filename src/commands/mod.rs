use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde_json::{json, Map, Value};

use transtats_jobs::engine::JobSpec;

pub type CmdResult<T> = transtats_jobs::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

// ============================================================================
// Input Parsing (CLI layer)
// ============================================================================

/// Parse a string value into appropriate JSON type.
/// Order: JSON literal → bool → number → string
fn parse_value(s: &str) -> Value {
    if let Ok(v) = serde_json::from_str(s) {
        return v;
    }
    if s == "true" {
        return json!(true);
    }
    if s == "false" {
        return json!(false);
    }
    if let Ok(n) = s.parse::<i64>() {
        return json!(n);
    }
    json!(s)
}

/// Read a document from a string, a file (`@path`) or stdin (`-`).
fn read_source(spec: &str, field: &str) -> transtats_jobs::Result<String> {
    if spec.trim() == "-" {
        if crate::tty::is_stdin_tty() {
            return Err(transtats_jobs::Error::validation_invalid_argument(
                field,
                "Cannot read from stdin when stdin is a TTY",
                None,
                None,
            ));
        }
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map_err(|e| {
            transtats_jobs::Error::internal_io(e.to_string(), Some("read stdin".to_string()))
        })?;
        return Ok(buf);
    }

    if let Some(path) = spec.strip_prefix('@') {
        if path.trim().is_empty() {
            return Err(transtats_jobs::Error::validation_invalid_argument(
                field,
                "Invalid source '@' (missing file path)",
                None,
                None,
            ));
        }
        return read_file(path);
    }

    Ok(spec.to_string())
}

fn read_file(path: &str) -> transtats_jobs::Result<String> {
    std::fs::read_to_string(Path::new(path))
        .map_err(|e| transtats_jobs::Error::internal_io(e.to_string(), Some(format!("read {}", path))))
}

/// Job params from `--params` (inline JSON, `@file` or `-`).
pub(crate) fn read_params(spec: Option<&str>) -> transtats_jobs::Result<Map<String, Value>> {
    let Some(spec) = spec else {
        return Ok(Map::new());
    };
    let raw = read_source(spec, "params")?;
    match serde_json::from_str(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(transtats_jobs::Error::validation_invalid_argument(
            "params",
            "Params must be a JSON object",
            Some(raw.chars().take(200).collect()),
            None,
        )),
        Err(e) => Err(transtats_jobs::Error::validation_invalid_json(
            e,
            Some("parse params".to_string()),
        )),
    }
}

/// Parse `KEY=VALUE` pairs given with `--var`.
pub(crate) fn parse_vars(vars: &[String]) -> transtats_jobs::Result<HashMap<String, String>> {
    let mut parsed = HashMap::new();
    for var in vars {
        let (key, value) = var.split_once('=').ok_or_else(|| {
            transtats_jobs::Error::validation_invalid_argument(
                "var",
                format!("Expected KEY=VALUE, got '{}'", var),
                Some(var.clone()),
                None,
            )
        })?;
        parsed.insert(key.trim().to_string(), value.to_string());
    }
    Ok(parsed)
}

/// Placeholder values: scalar params first, explicit `--var` pairs override.
pub(crate) fn job_variables(
    params: &Map<String, Value>,
    vars: &[String],
) -> transtats_jobs::Result<HashMap<String, String>> {
    let mut variables: HashMap<String, String> = params
        .iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key.clone(), s.clone())),
            Value::Number(n) => Some((key.clone(), n.to_string())),
            _ => None,
        })
        .collect();
    variables.extend(parse_vars(vars)?);
    Ok(variables)
}

/// Read and decode a job document from a file path or `-`.
pub(crate) fn load_job(
    source: &str,
    variables: &HashMap<String, String>,
) -> transtats_jobs::Result<JobSpec> {
    let content = if source.trim() == "-" {
        read_source(source, "job")?
    } else {
        read_file(source)?
    };
    JobSpec::parse(&content, variables)
}

/// Parse `--key value` pairs into task params overrides.
pub(crate) fn parse_kv_flags(extra: &[String]) -> transtats_jobs::Result<Map<String, Value>> {
    let mut obj = Map::new();
    let mut iter = extra.iter();

    while let Some(arg) = iter.next() {
        if let Some(key) = arg.strip_prefix("--") {
            let value = iter.next().ok_or_else(|| {
                transtats_jobs::Error::validation_invalid_argument(
                    key,
                    format!("Missing value for flag --{}", key),
                    None,
                    None,
                )
            })?;
            obj.insert(key.to_string(), parse_value(value));
        }
    }

    Ok(obj)
}

pub mod config;
pub mod plan;
pub mod providers;
pub mod run;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (transtats_jobs::Result<serde_json::Value>, i32) {
    crate::tty::status("transtats-jobs is working...");

    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Plan(args) => dispatch!(args, global, plan),
        crate::Commands::Providers(args) => dispatch!(args, global, providers),
        crate::Commands::Config(args) => dispatch!(args, global, config),
    }
}
