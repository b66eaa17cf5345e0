//! GET: read-only build-system metadata.

use serde_json::{Map, Value};

use crate::error::Result;

use super::{CapabilityProvider, StepCall, StepOutput};

pub struct Get;

impl CapabilityProvider for Get {
    fn command(&self) -> &'static str {
        "GET"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["latest_build_info", "task_info"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("latest build", "latest_build_info"),
            ("build info", "latest_build_info"),
            ("task details", "task_info"),
        ]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "task_info" => task_info(call),
            "latest_build_info" => latest_build_info(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

fn latest_build_info(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Latest Build Details")?;
    let package = call
        .input_str("pkg_downstream_name")
        .or_else(|| call.input_str("package"))
        .unwrap_or_default();
    let tag = call.input_str("build_tag").unwrap_or_default();
    let hub_url = call.input_str("hub_url").unwrap_or_default();

    let builds = call
        .env
        .services
        .build_system
        .latest_build(hub_url, tag, package)
        .map_err(|e| call.fail(&log, e))?;

    match builds.first() {
        Some(latest) => log.info(latest.to_string())?,
        None => log.info(format!("No build details found for {}.", tag))?,
    }

    let mut result = Map::new();
    result.insert("builds".to_string(), Value::Array(builds));
    Ok(StepOutput::with_result(result, log))
}

fn task_info(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Task Details")?;
    let hub_url = call.input_str("hub_url").unwrap_or_default();
    let task_id = call.param("task_id").cloned().unwrap_or(Value::Null);

    let build_system = &call.env.services.build_system;
    let info = build_system
        .task_info(hub_url, &task_id)
        .map_err(|e| call.fail(&log, e))?;
    let mut task = build_system
        .task_result(hub_url, &task_id)
        .map_err(|e| call.fail(&log, e))?;

    if !same_id(&task_id, info.get("id")) {
        log.info(format!("No task info found for id {}.", display_id(&task_id)))?;
    } else {
        let mut combined = info.clone();
        combined.extend(task.clone());
        log.info(Value::Object(combined).to_string())?;
    }
    if let Some(id) = info.get("id").filter(|id| !id.is_null()) {
        task.insert("task_id".to_string(), id.clone());
    }

    let mut result = Map::new();
    result.insert("task".to_string(), Value::Object(task));
    Ok(StepOutput::with_result(result, log))
}

/// Task ids arrive as numbers or numeric strings.
fn same_id(wanted: &Value, found: Option<&Value>) -> bool {
    match found {
        Some(found) if !found.is_null() => display_id(wanted) == display_id(found),
        _ => false,
    }
}

fn display_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::providers::testing::Harness;
    use crate::services::{BuildSystem, Services};
    use serde_json::json;

    struct Koji {
        builds: Vec<Value>,
    }

    impl BuildSystem for Koji {
        fn latest_build(&self, _: &str, tag: &str, package: &str) -> Result<Vec<Value>> {
            assert_eq!(tag, "f39");
            assert_eq!(package, "anaconda-downstream");
            Ok(self.builds.clone())
        }

        fn task_info(&self, _: &str, task_id: &Value) -> Result<Map<String, Value>> {
            if task_id == &json!(42) {
                Ok(json!({"id": 42, "state": 2}).as_object().cloned().unwrap())
            } else {
                Ok(Map::new())
            }
        }

        fn task_result(&self, _: &str, _: &Value) -> Result<Map<String, Value>> {
            Ok(json!({"srpms": ["a.src.rpm"]}).as_object().cloned().unwrap())
        }

        fn build_srpm_path(&self, _: &str, _: &Value) -> Result<String> {
            Err(Error::other("unused"))
        }

        fn task_path(&self, _: &str, _: &Value) -> Result<String> {
            Err(Error::other("unused"))
        }
    }

    fn input() -> Value {
        json!({"package": "anaconda", "pkg_downstream_name": "anaconda-downstream",
               "build_tag": "f39", "hub_url": "https://koji.example.org/kojihub"})
    }

    #[test]
    fn latest_build_prefers_downstream_name() {
        let harness = Harness::with_services(
            Services::default().with_build_system(Koji {
                builds: vec![json!({"nvr": "anaconda-39.1-1.fc39"})],
            }),
        );
        let output = harness.invoke(&Get, "latest_build_info", input(), json!({})).unwrap();
        assert_eq!(output.result.unwrap()["builds"][0]["nvr"], "anaconda-39.1-1.fc39");
        assert_eq!(output.log.subject, "Latest Build Details");
    }

    #[test]
    fn no_builds_is_logged_not_raised() {
        let harness = Harness::with_services(Services::default().with_build_system(Koji { builds: vec![] }));
        let output = harness.invoke(&Get, "latest_build_info", input(), json!({})).unwrap();
        assert_eq!(output.result.unwrap()["builds"], json!([]));
        assert_eq!(output.log.messages(), vec!["No build details found for f39."]);
    }

    #[test]
    fn task_info_merges_id_and_flags_mismatch() {
        let harness = Harness::with_services(Services::default().with_build_system(Koji { builds: vec![] }));

        let found = harness.invoke(&Get, "task_info", input(), json!({"task_id": 42})).unwrap();
        assert_eq!(found.result.unwrap()["task"]["task_id"], 42);

        let missing = harness.invoke(&Get, "task_info", input(), json!({"task_id": 7})).unwrap();
        assert_eq!(missing.log.messages(), vec!["No task info found for id 7."]);
        assert!(missing.result.unwrap()["task"].get("task_id").is_none());
    }

    #[test]
    fn unconfigured_build_system_raises() {
        let harness = Harness::new();
        let err = harness.invoke(&Get, "latest_build_info", input(), json!({})).unwrap_err();
        assert_eq!(err.code.as_str(), "provider.not_configured");
    }
}
