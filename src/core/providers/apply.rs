//! APPLY: replay `%prep` translation copies and downstream patches.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{CommandFailedDetails, Error, Result};
use crate::specfile::{SpecFile, SpecSections};
use crate::utils::{command, io};

use super::{CapabilityProvider, StepCall, StepOutput};

const WRONG_STRIP: &str = "Perhaps you used the wrong -p";
const MAX_STRIP: u32 = 5;

pub struct Apply;

impl CapabilityProvider for Apply {
    fn command(&self) -> &'static str {
        "APPLY"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["patch"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[("patches", "patch"), ("downstream patches", "patch")]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "patch" => patch(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

fn patch(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Apply Patches")?;
    let src_tar_dir = call.require_path("src_tar_dir")?;

    let spec: SpecFile = decode(call.input("spec_obj"));
    let mut result = Map::new();
    result.insert(
        "src_tar_dir".to_string(),
        Value::String(src_tar_dir.display().to_string()),
    );
    if !spec.patches.is_empty() {
        result.insert("patches".to_string(), serde_json::json!(spec.patches));
    }

    let src_translations: Vec<String> = call
        .input("src_translations")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|i| i.as_str().map(String::from)).collect())
        .unwrap_or_default();

    if !src_translations.is_empty() {
        let sections: SpecSections = decode(call.input("spec_sections"));
        let ran = apply_prep(&spec, sections.main_section("prep"), &src_translations, &src_tar_dir)
            .map_err(|e| call.fail(&log, e))?;
        if !ran.is_empty() {
            let prefix = format!("{} prep command(s) ran", ran.len());
            log.with_prefix(ran, &prefix)?;
        }
    }

    let search_root = call
        .input_str("extract_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| src_tar_dir.clone());
    let patches = io::files_with_extension(&search_root, "patch");
    if patches.is_empty() && src_translations.is_empty() {
        log.info("No patches found.")?;
        return Ok(StepOutput::with_result(result, log));
    }

    for patch in &patches {
        if let Err(err) = apply_one(patch, &src_tar_dir) {
            log.info(format!("Something went wrong in applying patches: {}", err.message))?;
            return Err(call.fail(&log, err));
        }
    }

    let applied: Vec<String> = patches.iter().map(|p| p.display().to_string()).collect();
    let prefix = format!("{} patches applied", applied.len());
    log.with_prefix(applied, &prefix)?;
    Ok(StepOutput::with_result(result, log))
}

/// Copy po sources the way `cp %{SOURCEn} ...` / `install ...` lines in
/// `%prep` would. Returns the equivalent commands.
fn apply_prep(
    spec: &SpecFile,
    prep: &[String],
    src_translations: &[String],
    tar_dir: &Path,
) -> Result<Vec<String>> {
    let mut ran = Vec::new();
    for (tag, source) in spec.sources_dict.iter().filter(|(_, v)| v.contains(".po")) {
        let needle = tag.to_uppercase();
        let Some(step) = prep.iter().find(|line| line.contains(&needle)) else {
            continue;
        };
        let Some(src_po) = src_translations.iter().find(|po| po.contains(source.as_str())) else {
            continue;
        };

        let parts: Vec<&str> = step.split_whitespace().collect();
        let (Some(program), Some(target)) = (parts.first(), parts.last()) else {
            continue;
        };
        if !matches!(*program, "cp" | "install") || !target.contains(".po") {
            continue;
        }

        let destination = tar_dir.join(target);
        let bytes = io::read_bytes(Path::new(src_po), "read prep source")?;
        io::write_bytes(&destination, &bytes, "copy prep source")?;
        ran.push(format!("{} {} {}", program, src_po, destination.display()));
    }
    Ok(ran)
}

/// Copy the patch next to the sources and retry strip levels 0..5 while
/// `patch` reports a wrong strip level. Fails unless one level applies.
fn apply_one(patch: &Path, src_tar_dir: &Path) -> Result<()> {
    command::require_program("patch")?;
    let copied = io::copy_into(patch, src_tar_dir, "copy patch")?;
    let name = copied
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut last = None;
    for strip in 0..MAX_STRIP {
        let level = format!("-p{}", strip);
        let output = command::capture_in(src_tar_dir, "patch", &[&level, "-i", &name])?;
        if output.success {
            return Ok(());
        }
        let wrong_strip = output.stdout.contains(WRONG_STRIP);
        last = Some((level, output));
        if !wrong_strip {
            break;
        }
    }

    let (level, output) = last.unwrap_or_default();
    let mut err = Error::command_failed(CommandFailedDetails {
        command: format!("patch {} -i {}", level, name),
        exit_code: output.exit_code,
        stdout: output.stdout.trim().to_string(),
        stderr: output.stderr.trim().to_string(),
    });
    err.message = format!("{} could not be applied", name);
    Err(err)
}

fn decode<T: serde::de::DeserializeOwned + Default>(value: Option<&Value>) -> T {
    value
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::Harness;
    use serde_json::json;
    use std::fs;

    const SPEC: &str = "\
Name: pkg
Version: 1.0
Release: 1%{?dist}
Source0: pkg-1.0.tar.gz
Source2: pkg-extra-ja.po
Patch0: fix.patch

%prep
%setup -q
cp %{SOURCE2} po/ja.po
";

    fn input(harness: &Harness) -> Value {
        let spec = SpecFile::parse(SPEC);
        let sections = SpecSections::parse(SPEC);
        let extract = harness.sandbox.join("pkg");
        let src = extract.join("pkg-1.0");
        fs::create_dir_all(src.join("po")).unwrap();
        let extra = extract.join("pkg-extra-ja.po");
        fs::write(&extra, "msgid \"a\"\nmsgstr \"b\"\n").unwrap();
        json!({
            "src_tar_dir": src.display().to_string(),
            "extract_dir": extract.display().to_string(),
            "spec_obj": spec,
            "spec_sections": sections,
            "src_translations": [extra.display().to_string()],
        })
    }

    #[test]
    fn prep_copies_po_sources_into_tree() {
        let harness = Harness::new();
        let input = input(&harness);
        let src = PathBuf::from(input["src_tar_dir"].as_str().unwrap());

        let output = harness.invoke(&Apply, "patch", input, json!({})).unwrap();
        assert!(src.join("po/ja.po").is_file());

        let result = output.result.unwrap();
        assert_eq!(result["patches"], json!(["fix.patch"]));
        let messages = output.log.messages();
        assert!(messages[0].starts_with(" :: 1 prep command(s) ran, cp "));
        assert_eq!(messages[1], " :: 0 patches applied, ");
    }

    #[test]
    fn nothing_to_do_logs_no_patches() {
        let harness = Harness::new();
        let src = harness.sandbox.join("bare");
        fs::create_dir_all(&src).unwrap();
        let output = harness
            .invoke(&Apply, "patch", json!({"src_tar_dir": src.display().to_string()}), json!({}))
            .unwrap();
        assert_eq!(output.log.messages(), vec!["No patches found."]);
        assert!(output.result.unwrap().get("patches").is_none());
    }

    #[test]
    fn patch_applies_at_discovered_strip_level() {
        if which::which("patch").is_err() {
            return;
        }
        let harness = Harness::new();
        let extract = harness.sandbox.join("pkg");
        let src = extract.join("pkg-1.0");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("hello.txt"), "hello\n").unwrap();
        fs::write(
            extract.join("fix.patch"),
            "--- a/hello.txt\n+++ b/hello.txt\n@@ -1 +1 @@\n-hello\n+hello world\n",
        )
        .unwrap();

        let output = harness
            .invoke(
                &Apply,
                "patch",
                json!({"src_tar_dir": src.display().to_string(),
                       "extract_dir": extract.display().to_string()}),
                json!({}),
            )
            .unwrap();
        assert_eq!(fs::read_to_string(src.join("hello.txt")).unwrap(), "hello world\n");
        assert!(output.log.messages()[0].starts_with(" :: 1 patches applied"));
    }

    #[test]
    fn rejected_hunk_fails_the_step() {
        if which::which("patch").is_err() {
            return;
        }
        let harness = Harness::new();
        let extract = harness.sandbox.join("pkg");
        let src = extract.join("pkg-1.0");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("hello.txt"), "goodbye\n").unwrap();
        fs::write(
            extract.join("fix.patch"),
            "--- a/hello.txt\n+++ b/hello.txt\n@@ -1 +1 @@\n-hello\n+hello world\n",
        )
        .unwrap();

        let err = harness
            .invoke(
                &Apply,
                "patch",
                json!({"src_tar_dir": src.display().to_string(),
                       "extract_dir": extract.display().to_string()}),
                json!({}),
            )
            .unwrap_err();
        assert_eq!(err.code.as_str(), "command.failed");
        assert_eq!(err.message, "fix.patch could not be applied");
        let log = err.details["step_log"]["Apply Patches"].to_string();
        assert!(log.contains("Something went wrong in applying patches: fix.patch could not be applied"));
        assert!(!log.contains("patches applied"));
        assert_eq!(fs::read_to_string(src.join("hello.txt")).unwrap(), "goodbye\n");
    }
}
