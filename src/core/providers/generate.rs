//! GENERATE: produce a POT template from the source tree.

use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::defaults::EngineConfig;
use crate::error::{Error, Result};
use crate::utils::{command, io};

use super::{truthy, CapabilityProvider, StepCall, StepOutput};

pub struct Generate;

impl CapabilityProvider for Generate {
    fn command(&self) -> &'static str {
        "GENERATE"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["pot_file"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[("pot", "pot_file"), ("template", "pot_file")]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "pot_file" => pot_file(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

fn pot_file(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Generate POT File")?;
    let domain = call
        .param_str("domain")
        .or_else(|| call.input_str("package").map(String::from))
        .unwrap_or_default();

    let mut result = Map::new();
    result.insert("i18n_domain".to_string(), Value::String(domain.clone()));

    let Some(command_line) = call.param("cmd").and_then(|v| v.as_str()).filter(|c| !c.trim().is_empty()) else {
        log.info("Command to generate POT missing.")?;
        result.insert("src_pot_file".to_string(), Value::String(String::new()));
        return Ok(StepOutput::with_result(result, log));
    };
    verify_command(call.env.config, command_line).map_err(|e| call.fail(&log, e))?;

    let src_tar_dir = call.require_path("src_tar_dir")?;
    let po_dir = io::find_dir(&src_tar_dir, "po")
        .or_else(|| io::find_dir(&src_tar_dir, "locale"))
        .unwrap_or_else(|| src_tar_dir.clone());
    let pot_name = format!("{}.pot", domain);
    let pot_file: PathBuf = po_dir.join(&pot_name);

    if pot_file.exists() && call.param("overwrite").map(truthy).unwrap_or(false) {
        io::remove_path(&pot_file).map_err(|e| call.fail(&log, e))?;
    }

    let output = match command::run_shell_in(&src_tar_dir, command_line) {
        Ok(output) => output,
        Err(err) => {
            log.info(format!("POT file generation failed {}", err.message))?;
            return Err(call.fail(&log, err));
        }
    };

    if !pot_file.is_file() {
        let message = format!("POT file generation failed with command: {}", command_line);
        log.info(message.clone())?;
        let err = Error::provider_failed("GENERATE", call.operation, message)
            .with_detail("stderr", Value::String(output.stderr.trim().to_string()));
        return Err(call.fail(&log, err));
    }

    log.with_prefix(
        output.stdout.trim().to_string(),
        &format!("POT file generated successfully. [ {} ]", pot_name),
    )?;
    result.insert(
        "src_pot_file".to_string(),
        Value::String(pot_file.display().to_string()),
    );
    Ok(StepOutput::with_result(result, log))
}

/// Shell syntax that would chain or substitute commands past the allow-list.
const FORBIDDEN_SYNTAX: [&str; 5] = ["|", "`", "$(", "\n", "\r"];

/// Every `;` or `&&` separated command must start with an allowed program.
fn verify_command(config: &EngineConfig, command_line: &str) -> Result<()> {
    let chained = command_line.replace("&&", ";");
    if let Some(syntax) = FORBIDDEN_SYNTAX
        .iter()
        .find(|syntax| command_line.contains(*syntax))
        .copied()
        .or_else(|| chained.contains('&').then_some("&"))
    {
        return Err(Error::command_not_allowed(syntax.escape_debug().to_string()));
    }

    for part in chained.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let base = shlex::split(part)
            .and_then(|words| words.into_iter().next())
            .unwrap_or_else(|| part.split_whitespace().next().unwrap_or_default().to_string());
        if !config.is_allowed_command(&base) {
            return Err(Error::command_not_allowed(base));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::Harness;
    use serde_json::json;
    use std::fs;

    fn source_tree(harness: &Harness) -> PathBuf {
        let src = harness.sandbox.join("pkg");
        fs::create_dir_all(src.join("po")).unwrap();
        src
    }

    #[test]
    fn allow_list_checks_each_command() {
        let config = EngineConfig::default();
        assert!(verify_command(&config, "cd po && make pkg.pot").is_ok());
        assert!(verify_command(&config, "mkdir -p po; xgettext -o po/x.pot a.c").is_ok());

        let err = verify_command(&config, "cd po && rm -rf /").unwrap_err();
        assert_eq!(err.code.as_str(), "command.not_allowed");
        assert_eq!(err.message, "Invalid command: rm");
    }

    #[test]
    fn mixed_separators_are_all_checked() {
        let config = EngineConfig::default();
        let err = verify_command(&config, "make; mkdir po && rm -rf x").unwrap_err();
        assert_eq!(err.message, "Invalid command: rm");
        assert!(verify_command(&config, "cd po; make && make pot").is_ok());
    }

    #[test]
    fn chaining_and_substitution_are_rejected() {
        let config = EngineConfig::default();
        for line in [
            "make | rm -rf x",
            "make || rm -rf x",
            "make & rm -rf x",
            "make\nrm -rf x",
            "make `rm -rf x`",
            "make $(rm -rf x)",
        ] {
            let err = verify_command(&config, line).unwrap_err();
            assert_eq!(err.code.as_str(), "command.not_allowed", "{}", line);
        }
    }

    #[test]
    fn interpreters_are_not_allowed_by_default() {
        let config = EngineConfig::default();
        for line in ["sh -c 'rm -rf x'", "bash x.sh", "python x.py", "cp a b", "mv a b"] {
            assert!(verify_command(&config, line).is_err(), "{}", line);
        }
    }

    #[test]
    fn generates_pot_in_po_dir() {
        let mut harness = Harness::new();
        harness.config.allowed_commands.push("cp".into());
        let src = source_tree(&harness);
        fs::write(src.join("seed.pot"), "msgid \"\"\nmsgstr \"\"\n").unwrap();
        let output = harness
            .invoke(
                &Generate,
                "pot_file",
                json!({"package": "pkg", "src_tar_dir": src.display().to_string()}),
                json!({"cmd": "cd po && cp ../seed.pot app.pot", "domain": "app"}),
            )
            .unwrap();
        let result = output.result.unwrap();
        assert_eq!(result["i18n_domain"], "app");
        assert_eq!(
            result["src_pot_file"].as_str().unwrap(),
            src.join("po/app.pot").display().to_string()
        );
        assert!(output.log.messages()[0].starts_with(" :: POT file generated successfully. [ app.pot ]"));
    }

    #[test]
    fn missing_output_raises() {
        let mut harness = Harness::new();
        harness.config.allowed_commands.push("true".into());
        let src = source_tree(&harness);
        let err = harness
            .invoke(
                &Generate,
                "pot_file",
                json!({"package": "pkg", "src_tar_dir": src.display().to_string()}),
                json!({"cmd": "true"}),
            )
            .unwrap_err();
        assert_eq!(err.code.as_str(), "provider.failed");
        assert_eq!(err.message, "POT file generation failed with command: true");
    }

    #[test]
    fn overwrite_removes_stale_template() {
        let mut harness = Harness::new();
        harness.config.allowed_commands.push("true".into());
        let src = source_tree(&harness);
        fs::write(src.join("po/pkg.pot"), "stale").unwrap();
        let err = harness
            .invoke(
                &Generate,
                "pot_file",
                json!({"package": "pkg", "src_tar_dir": src.display().to_string()}),
                json!({"cmd": "true", "overwrite": true}),
            )
            .unwrap_err();
        assert_eq!(err.code.as_str(), "provider.failed");
        assert!(!src.join("po/pkg.pot").exists());
    }

    #[test]
    fn no_command_is_logged() {
        let harness = Harness::new();
        let output = harness
            .invoke(&Generate, "pot_file", json!({"package": "pkg"}), json!({}))
            .unwrap();
        assert_eq!(output.log.messages(), vec!["Command to generate POT missing."]);
        let result = output.result.unwrap();
        assert_eq!(result["src_pot_file"], "");
        assert_eq!(result["i18n_domain"], "pkg");
    }
}
