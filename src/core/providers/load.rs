//! LOAD: locate the build descriptor of an unpacked source package.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::specfile::{SpecFile, SpecSections};

use super::{CapabilityProvider, StepCall, StepOutput};

const TARBALL_EXTENSIONS: [&str; 6] = [".tar", ".tar.gz", ".tar.bz2", ".tar.xz", ".tgz", ".gem"];

pub struct Load;

impl CapabilityProvider for Load {
    fn command(&self) -> &'static str {
        "LOAD"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["spec_file"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[("spec", "spec_file"), ("specfile", "spec_file")]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "spec_file" => spec_file(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

/// Files of interest found under the extract directory.
#[derive(Debug, Default)]
struct Contents {
    spec_file: Option<PathBuf>,
    tarballs: Vec<PathBuf>,
    translations: Vec<PathBuf>,
}

impl Contents {
    fn scan(root: &Path) -> Self {
        let mut contents = Contents::default();
        let files = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file());

        for entry in files {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".spec") && !name.starts_with('.') {
                contents.spec_file = Some(entry.path().to_path_buf());
            }
            // translations are not shipped in test tarballs
            if TARBALL_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) && !name.contains("test") {
                contents.tarballs.push(entry.path().to_path_buf());
            }
            if name.ends_with(".po") {
                contents.translations.push(entry.path().to_path_buf());
            }
        }
        contents
    }

    fn tarball(&self, file_name: &str) -> Option<&PathBuf> {
        self.tarballs.iter().find(|p| file_name_of(p) == file_name)
    }
}

fn spec_file(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Load Spec file")?;
    let extract_dir = call.require_path("extract_dir")?;
    let package = call.input_str("package").unwrap_or_default();

    let contents = Contents::scan(&extract_dir);
    let Some(spec_path) = contents.spec_file.clone() else {
        let err = Error::provider_failed(
            "LOAD",
            call.operation,
            format!("Loading Spec file failed: no spec file under {}", extract_dir.display()),
        );
        log.info(err.message.clone())?;
        return Err(call.fail(&log, err));
    };
    let (spec, sections) = SpecFile::load(&spec_path).map_err(|e| call.fail(&log, e))?;

    let src_tar_file = main_tarball(&spec, &contents);
    let related = related_tarballs(&spec, &sections, &contents, package);

    log.with_prefix(spec.sources.clone(), "Spec file loaded, Sources")?;

    let spec_obj = serde_json::to_value(&spec)
        .map_err(|e| call.fail(&log, Error::internal_json(e.to_string(), Some("encode spec".into()))))?;
    let spec_sections = serde_json::to_value(&sections).map_err(|e| {
        call.fail(&log, Error::internal_json(e.to_string(), Some("encode spec sections".into())))
    })?;

    let mut result = Map::new();
    result.insert("spec_file".to_string(), path_value(&spec_path));
    result.insert(
        "src_tar_file".to_string(),
        src_tar_file.map(|p| path_value(&p)).unwrap_or(Value::Null),
    );
    result.insert("spec_obj".to_string(), spec_obj);
    result.insert("src_translations".to_string(), paths_value(&contents.translations));
    result.insert("spec_sections".to_string(), spec_sections);
    result.insert("related_tarballs".to_string(), paths_value(&related));
    Ok(StepOutput::with_result(result, log))
}

/// The tarball named by the first source, else the first tarball found.
fn main_tarball(spec: &SpecFile, contents: &Contents) -> Option<PathBuf> {
    let first = contents.tarballs.first()?;
    let probable = spec.source_file_names().into_iter().next().unwrap_or_default();
    Some(contents.tarball(&probable).unwrap_or(first).clone())
}

/// Release-specific tarballs plus the translation tarball when `%prep`
/// unpacks it into the source tree.
fn related_tarballs(
    spec: &SpecFile,
    sections: &SpecSections,
    contents: &Contents,
    package: &str,
) -> Vec<PathBuf> {
    let sources = spec.source_file_names();
    let listed = |path: &&PathBuf| sources.iter().any(|s| s == file_name_of(path));

    let release_prefix = spec.release.split('%').next().unwrap_or_default();
    let mut related: Vec<PathBuf> = if release_prefix.is_empty() {
        Vec::new()
    } else {
        contents
            .tarballs
            .iter()
            .filter(listed)
            .filter(|p| file_name_of(p).contains(release_prefix))
            .cloned()
            .collect()
    };

    let po_tarball_name = format!("{}-po", package);
    let po_tarball = contents
        .tarballs
        .iter()
        .filter(listed)
        .find(|p| file_name_of(p).contains(&po_tarball_name));

    if let Some(po_tarball) = po_tarball {
        let prep = sections.package_section("prep", package);
        let macro_lines = joined(prep, |line| line.starts_with('%'));
        let tar_lines = joined(prep, |line| line.starts_with("tar -x"));

        let unpacked_by_setup = spec
            .source_number(file_name_of(po_tarball))
            .map(|n| macro_lines.contains(&format!("-a {}", n)))
            .unwrap_or(false);
        if (unpacked_by_setup || tar_lines.contains(package)) && !related.contains(po_tarball) {
            related.push(po_tarball.clone());
        }
    }
    related
}

fn joined(lines: &[String], keep: impl Fn(&str) -> bool) -> String {
    lines
        .iter()
        .filter(|line| keep(line))
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

fn file_name_of(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

fn path_value(path: &Path) -> Value {
    Value::String(path.display().to_string())
}

fn paths_value(paths: &[PathBuf]) -> Value {
    Value::Array(paths.iter().map(|p| path_value(p)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::Harness;
    use serde_json::json;
    use std::fs;

    const SPEC: &str = "\
Name:           anaconda
Version:        39.32
Release:        1%{?dist}
Source0:        https://example.org/%{name}-%{version}.tar.gz
Source1:        anaconda-po-39.tar.gz

%prep
%autosetup -p1 -a 1
";

    fn extracted(harness: &Harness, spec: &str) -> PathBuf {
        let dir = harness.sandbox.join("anaconda");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("anaconda.spec"), spec).unwrap();
        fs::write(dir.join("anaconda-39.32.tar.gz"), b"").unwrap();
        fs::write(dir.join("anaconda-po-39.tar.gz"), b"").unwrap();
        fs::write(dir.join("anaconda-tests.tar.gz"), b"").unwrap();
        fs::write(dir.join("extra-ja.po"), "msgid \"\"\nmsgstr \"\"\n").unwrap();
        dir
    }

    fn load(harness: &Harness, dir: &Path) -> Map<String, Value> {
        harness
            .invoke(
                &Load,
                "spec_file",
                json!({"package": "anaconda", "extract_dir": dir.display().to_string()}),
                json!({}),
            )
            .unwrap()
            .result
            .unwrap()
    }

    #[test]
    fn picks_main_tarball_from_first_source() {
        let harness = Harness::new();
        let dir = extracted(&harness, SPEC);
        let result = load(&harness, &dir);

        assert_eq!(
            result["src_tar_file"].as_str().unwrap(),
            dir.join("anaconda-39.32.tar.gz").display().to_string()
        );
        assert_eq!(result["spec_obj"]["version"], "39.32");
        assert_eq!(result["src_translations"].as_array().unwrap().len(), 1);
        assert_eq!(
            result["spec_sections"]["section"]["prep"]["anaconda"][0],
            "%autosetup -p1 -a 1"
        );
    }

    #[test]
    fn po_tarball_is_related_when_setup_unpacks_it() {
        let harness = Harness::new();
        let dir = extracted(&harness, SPEC);
        let related = load(&harness, &dir)["related_tarballs"].clone();
        let related: Vec<&str> = related.as_array().unwrap().iter().filter_map(|v| v.as_str()).collect();
        assert!(related.iter().any(|p| p.ends_with("anaconda-po-39.tar.gz")));
        assert!(!related.iter().any(|p| p.contains("tests")));
    }

    #[test]
    fn po_tarball_ignored_when_prep_never_unpacks_it() {
        let harness = Harness::new();
        let spec = SPEC.replace("%autosetup -p1 -a 1", "%autosetup -p1");
        let dir = extracted(&harness, &spec);
        let related = load(&harness, &dir)["related_tarballs"].clone();
        assert!(!related
            .as_array()
            .unwrap()
            .iter()
            .any(|p| p.as_str().unwrap().ends_with("anaconda-po-39.tar.gz")));
    }

    #[test]
    fn missing_spec_raises() {
        let harness = Harness::new();
        let dir = harness.sandbox.join("empty");
        fs::create_dir_all(&dir).unwrap();
        let err = harness
            .invoke(&Load, "spec_file", json!({"extract_dir": dir.display().to_string()}), json!({}))
            .unwrap_err();
        assert_eq!(err.code.as_str(), "provider.failed");
        assert!(err.details["step_log"]["Load Spec file"].is_object());
    }
}
