//! FILTER: collect translation files of one extension.

use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::utils::io;

use super::{CapabilityProvider, StepCall, StepOutput};

const DEFAULT_EXT: &str = "po";

pub struct Filter;

impl CapabilityProvider for Filter {
    fn command(&self) -> &'static str {
        "FILTER"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["files"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("po files", "files"),
            ("translation files", "files"),
            ("json files", "files"),
        ]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "files" => files(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

fn files(call: &StepCall<'_>) -> Result<StepOutput> {
    let file_ext = file_extension(call);
    let mut log = call.log(format!("Filter {} files", file_ext.to_uppercase()))?;

    let base = call
        .input_str("extract_dir")
        .or_else(|| call.input_str("src_tar_dir"))
        .map(PathBuf::from)
        .ok_or_else(|| call.fail(&log, Error::provider_missing_input(call.operation, "src_tar_dir")))?;
    let search_dir = match call.param_str("dir") {
        Some(dir) => base.join(dir.trim_start_matches('/')),
        None => base,
    };

    let trans_files = io::files_with_extension(&search_dir, &file_ext);
    let domain = call.param_str("domain");
    let locale_index = domain.as_deref().and_then(|d| locale_index(&trans_files, d));

    let dirs = translation_dirs(&trans_files, locale_index.is_some());
    if dirs.len() > 1 {
        let shown: Vec<String> = dirs
            .iter()
            .map(|dir| match dir.strip_prefix(&search_dir) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel.display().to_string(),
                _ => dir.display().to_string(),
            })
            .collect();
        log.with_prefix(
            shown,
            &format!(
                "[WARN] Translations are found in {} directories. Setting 'dir' may help.",
                dirs.len()
            ),
        )?;
    }

    let listed: Vec<String> = trans_files.iter().map(|p| p.display().to_string()).collect();
    log.with_prefix(
        listed.clone(),
        &format!("{} {} files filtered", listed.len(), file_ext.to_uppercase()),
    )?;

    let mut result = Map::new();
    result.insert(
        "trans_files".to_string(),
        Value::Array(listed.into_iter().map(Value::String).collect()),
    );
    result.insert("file_ext".to_string(), Value::String(file_ext));
    if let Some(index) = locale_index {
        result.insert("podir".to_string(), Value::Bool(true));
        result.insert("locale_index".to_string(), Value::from(index));
    }
    Ok(StepOutput::with_result(result, log))
}

/// `ext` parameter, else the configured translation extension, else `po`.
fn file_extension(call: &StepCall<'_>) -> String {
    if let Some(ext) = call.param_str("ext") {
        return ext.trim_start_matches('.').to_lowercase();
    }
    call.input_str("trans_file_ext")
        .map(|ext| ext.trim_start_matches('.').to_string())
        .unwrap_or_else(|| DEFAULT_EXT.to_string())
}

/// Position of the locale segment counted from the file name when files follow
/// `locale/<lang>/<domain>.po` (-2) or `locale/<lang>/LC_MESSAGES/<domain>.mo` (-3).
fn locale_index(files: &[PathBuf], domain: &str) -> Option<i64> {
    for file in files {
        let parts: Vec<&str> = file
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        let stem = parts
            .last()
            .and_then(|name| name.split('.').next())
            .unwrap_or_default();
        if stem != domain {
            return None;
        }
        let from_end = |n: usize| parts.len().checked_sub(n).map(|i| parts[i]);
        if from_end(3) == Some("locale") {
            return Some(-2);
        }
        if from_end(4) == Some("locale") && from_end(2) == Some("LC_MESSAGES") {
            return Some(-3);
        }
    }
    None
}

/// Distinct directories holding translations, in discovery order.
fn translation_dirs(files: &[PathBuf], podir: bool) -> Vec<PathBuf> {
    let levels = if podir { 3 } else { 1 };
    let mut dirs: Vec<PathBuf> = Vec::new();
    for file in files {
        let dir = file
            .ancestors()
            .nth(levels)
            .unwrap_or_else(|| Path::new(""))
            .to_path_buf();
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::Harness;
    use serde_json::json;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "msgid \"\"\nmsgstr \"\"\n").unwrap();
    }

    #[test]
    fn filters_by_extension_and_warns_on_many_dirs() {
        let harness = Harness::new();
        let src = harness.sandbox.join("pkg");
        touch(&src.join("po/de.po"));
        touch(&src.join("po/fr.po"));
        touch(&src.join("help/po/ja.po"));
        touch(&src.join("po/pkg.pot"));

        let output = harness
            .invoke(&Filter, "files", json!({"src_tar_dir": src.display().to_string()}), json!({}))
            .unwrap();
        let result = output.result.unwrap();
        assert_eq!(result["trans_files"].as_array().unwrap().len(), 3);
        assert_eq!(result["file_ext"], "po");
        assert!(result.get("podir").is_none());
        assert_eq!(output.log.subject, "Filter PO files");

        let messages = output.log.messages();
        assert!(messages[0].contains("[WARN] Translations are found in 2 directories."));
        assert!(messages[0].contains("help/po"));
        assert!(messages[1].contains("3 PO files filtered"));
    }

    #[test]
    fn dir_param_narrows_search() {
        let harness = Harness::new();
        let src = harness.sandbox.join("pkg");
        touch(&src.join("po/de.po"));
        touch(&src.join("help/po/ja.po"));

        let output = harness
            .invoke(
                &Filter,
                "files",
                json!({"src_tar_dir": src.display().to_string()}),
                json!({"dir": "help"}),
            )
            .unwrap();
        assert_eq!(output.result.unwrap()["trans_files"].as_array().unwrap().len(), 1);
        assert_eq!(output.log.messages().len(), 1);
    }

    #[test]
    fn extension_param_wins_over_input() {
        let harness = Harness::new();
        let src = harness.sandbox.join("pkg");
        touch(&src.join("i18n/de.json"));
        let output = harness
            .invoke(
                &Filter,
                "files",
                json!({"src_tar_dir": src.display().to_string(), "trans_file_ext": "po"}),
                json!({"ext": "JSON"}),
            )
            .unwrap();
        assert_eq!(output.log.subject, "Filter JSON files");
        assert_eq!(output.result.unwrap()["file_ext"], "json");
    }

    #[test]
    fn locale_layouts_are_podirs() {
        let plain = vec![PathBuf::from("/s/locale/de/app.po")];
        assert_eq!(locale_index(&plain, "app"), Some(-2));

        let messages = vec![PathBuf::from("/s/locale/de/LC_MESSAGES/app.mo")];
        assert_eq!(locale_index(&messages, "app"), Some(-3));

        assert_eq!(locale_index(&plain, "other"), None);
        assert_eq!(locale_index(&[PathBuf::from("/s/po/de.po")], "de"), None);
    }

    #[test]
    fn podir_groups_by_locale_parent() {
        let files = vec![
            PathBuf::from("/s/locale/de/app.po"),
            PathBuf::from("/s/locale/fr/app.po"),
        ];
        assert_eq!(translation_dirs(&files, true), vec![PathBuf::from("/s")]);
        assert_eq!(translation_dirs(&files, false).len(), 2);
    }
}
