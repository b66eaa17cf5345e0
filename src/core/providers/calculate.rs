//! CALCULATE: translation statistics and template differences.

use std::collections::HashSet;
use std::path::{Component, Path};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::gettext::{Catalog, CatalogEntry};
use crate::git;

use super::{truthy, CapabilityProvider, StepCall, StepOutput};

const DEFAULT_LOCALE_INDEX: i64 = -2;

pub struct Calculate;

impl CapabilityProvider for Calculate {
    fn command(&self) -> &'static str {
        "CALCULATE"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["stats", "diff"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("translation stats", "stats"),
            ("statistics", "stats"),
            ("differences", "diff"),
            ("pot diff", "diff"),
        ]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "diff" => diff(call),
            "stats" => stats(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStats {
    pub unit: &'static str,
    pub locale: String,
    pub translated: usize,
    pub untranslated: usize,
    pub fuzzy: usize,
    pub total: usize,
}

impl FileStats {
    fn from_catalog(catalog: &Catalog, locale: String) -> Self {
        let translated = catalog.translated_entries().len();
        let untranslated = catalog.untranslated_entries().len();
        let fuzzy = catalog.fuzzy_entries().len();
        Self {
            unit: "MESSAGE",
            locale,
            translated,
            untranslated,
            fuzzy,
            total: translated + untranslated + fuzzy,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TranslationStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub stats: Vec<FileStats>,
}

fn stats(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Calculate Translation Stats")?;

    let id = match (call.input_str("build_system"), call.input_str("build_tag")) {
        (Some(system), Some(tag)) => Some(format!("{} - {}", system, tag)),
        _ => call.input_str("upstream_repo_url").map(|_| "Upstream".to_string()),
    };
    let podir = call.input("podir").map(truthy).unwrap_or(false);
    let locale_index = call
        .input("locale_index")
        .and_then(|v| v.as_i64())
        .unwrap_or(DEFAULT_LOCALE_INDEX);

    let files: Vec<&str> = call
        .input("trans_files")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|i| i.as_str()).collect())
        .unwrap_or_default();

    let mut trans_stats = TranslationStats { id, stats: Vec::new() };
    for file in files {
        let path = Path::new(file);
        match Catalog::load(path) {
            Ok(catalog) => {
                let locale = if podir {
                    path_segment(path, locale_index)
                } else {
                    file_stem(path)
                };
                trans_stats.stats.push(FileStats::from_catalog(&catalog, locale));
            }
            Err(err) => log.info(format!(
                "Something went wrong while parsing {}: {}",
                file, err.message
            ))?,
        }
    }

    let value = serde_json::to_value(&trans_stats)
        .map_err(|e| call.fail(&log, Error::internal_json(e.to_string(), Some("encode stats".into()))))?;
    log.with_prefix(value.to_string(), "Calculated Stats")?;

    let mut result = Map::new();
    result.insert("trans_stats".to_string(), value);
    Ok(StepOutput::with_result(result, log))
}

/// Segment of `path` counted from the end, `-1` being the file name.
fn path_segment(path: &Path, index_from_end: i64) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    let back = index_from_end.unsigned_abs() as usize;
    parts
        .len()
        .checked_sub(back)
        .and_then(|i| parts.get(i).cloned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .and_then(|name| name.split('.').next().map(String::from))
        .unwrap_or_default()
}

fn diff(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Calculate Differences")?;
    let mut result = Map::new();
    result.insert("pot_diff".to_string(), Value::String(String::new()));
    result.insert("full_diff".to_string(), Value::String(String::new()));
    result.insert("diff_count".to_string(), Value::from(0));

    let src_pot = call.input_str("src_pot_file").unwrap_or_default();
    let platform_pot = call.input_str("platform_pot_path").unwrap_or_default();

    let catalogs = Catalog::load(Path::new(src_pot))
        .and_then(|src| Catalog::load(Path::new(platform_pot)).map(|platform| (src, platform)));
    let (src_catalog, platform_catalog) = match catalogs {
        Ok(pair) => pair,
        Err(err) => {
            log.info(format!("Something went wrong in calculating diff: {}", err.message))?;
            return Ok(StepOutput::with_result(result, log));
        }
    };

    let changed = new_untranslated(&src_catalog, &platform_catalog);
    let pot_diff: String = changed.iter().map(|entry| describe(entry)).collect();
    if changed.is_empty() {
        log.info("No new or updated messages found.")?;
    }

    let full_diff = match git::diff_no_index(call.env.sandbox.path(), Path::new(platform_pot), Path::new(src_pot)) {
        Ok(diff) => diff,
        Err(err) => {
            log.info(format!("Something went wrong in calculating diff: {}", err.message))?;
            String::new()
        }
    };

    if !changed.is_empty() {
        log.with_prefix(
            format!("{} messages differ.\n\n{}", changed.len(), pot_diff),
            "Calculated Diff",
        )?;
    }

    result.insert("pot_diff".to_string(), Value::String(pot_diff));
    result.insert("full_diff".to_string(), Value::String(full_diff));
    result.insert("diff_count".to_string(), Value::from(changed.len()));
    Ok(StepOutput::with_result(result, log))
}

/// Untranslated messages of `src` whose msgid the platform template lacks,
/// one per msgid, in source order.
fn new_untranslated<'a>(src: &'a Catalog, platform: &Catalog) -> Vec<&'a CatalogEntry> {
    let known: HashSet<&str> = platform
        .untranslated_entries()
        .into_iter()
        .map(|e| e.msgid.as_str())
        .collect();
    let mut seen = HashSet::new();
    src.untranslated_entries()
        .into_iter()
        .filter(|e| !known.contains(e.msgid.as_str()))
        .filter(|e| seen.insert(e.msgid.as_str()))
        .collect()
}

fn describe(entry: &CatalogEntry) -> String {
    let occurrences: Vec<String> = entry
        .occurrences
        .iter()
        .map(|(file, line)| format!("{} {}", file, line))
        .collect();
    format!(
        "line {}\n{}\n{}\n\n",
        entry.linenum,
        occurrences.join("\n"),
        entry.msgid
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::Harness;
    use serde_json::json;
    use std::fs;

    const DE_PO: &str = r#"msgid ""
msgstr ""
"Language: de\n"

msgid "Open"
msgstr "Öffnen"

#, fuzzy
msgid "Close"
msgstr "Schliessen"

msgid "Quit"
msgstr ""

#~ msgid "Old"
#~ msgstr "Alt"
"#;

    #[test]
    fn stats_count_per_file() {
        let harness = Harness::new();
        let po = harness.sandbox.join("pkg/po/de.po");
        fs::create_dir_all(po.parent().unwrap()).unwrap();
        fs::write(&po, DE_PO).unwrap();

        let output = harness
            .invoke(
                &Calculate,
                "stats",
                json!({"build_system": "koji", "build_tag": "f39",
                       "trans_files": [po.display().to_string()]}),
                json!({}),
            )
            .unwrap();
        let stats = &output.result.unwrap()["trans_stats"];
        assert_eq!(stats["id"], "koji - f39");
        assert_eq!(
            stats["stats"][0],
            json!({"unit": "MESSAGE", "locale": "de", "translated": 1,
                   "untranslated": 1, "fuzzy": 1, "total": 3})
        );
        assert!(output.log.messages()[0].starts_with(" :: Calculated Stats, "));
    }

    #[test]
    fn podir_takes_locale_from_path() {
        let harness = Harness::new();
        let po = harness.sandbox.join("pkg/locale/pt_BR/LC_MESSAGES/app.po");
        fs::create_dir_all(po.parent().unwrap()).unwrap();
        fs::write(&po, DE_PO).unwrap();

        let output = harness
            .invoke(
                &Calculate,
                "stats",
                json!({"upstream_repo_url": "https://example.org/app.git",
                       "trans_files": [po.display().to_string()],
                       "podir": true, "locale_index": -3}),
                json!({}),
            )
            .unwrap();
        let stats = &output.result.unwrap()["trans_stats"];
        assert_eq!(stats["id"], "Upstream");
        assert_eq!(stats["stats"][0]["locale"], "pt_BR");
    }

    #[test]
    fn unreadable_file_is_logged_and_skipped() {
        let harness = Harness::new();
        let output = harness
            .invoke(
                &Calculate,
                "stats",
                json!({"trans_files": ["/nonexistent/xx.po"]}),
                json!({}),
            )
            .unwrap();
        let stats = &output.result.unwrap()["trans_stats"];
        assert!(stats.get("id").is_none());
        assert_eq!(stats["stats"], json!([]));
        assert!(output.log.messages()[0].starts_with("Something went wrong while parsing /nonexistent/xx.po"));
    }

    #[test]
    fn diff_lists_messages_missing_from_platform() {
        let harness = Harness::new();
        let src = harness.sandbox.join("src.pot");
        let platform = harness.sandbox.join("platform.pot");
        fs::write(
            &src,
            "#: ui.c:10\nmsgid \"Open\"\nmsgstr \"\"\n\n#: ui.c:20\nmsgid \"Save\"\nmsgstr \"\"\n",
        )
        .unwrap();
        fs::write(&platform, "msgid \"Open\"\nmsgstr \"\"\n").unwrap();

        let output = harness
            .invoke(
                &Calculate,
                "diff",
                json!({"src_pot_file": src.display().to_string(),
                       "platform_pot_path": platform.display().to_string()}),
                json!({}),
            )
            .unwrap();
        let result = output.result.unwrap();
        assert_eq!(result["diff_count"], 1);
        assert_eq!(result["pot_diff"], "line 6\nui.c 20\nSave\n\n");
    }

    #[test]
    fn identical_templates_report_nothing() {
        let harness = Harness::new();
        let pot = harness.sandbox.join("same.pot");
        fs::write(&pot, "msgid \"Open\"\nmsgstr \"\"\n").unwrap();
        let output = harness
            .invoke(
                &Calculate,
                "diff",
                json!({"src_pot_file": pot.display().to_string(),
                       "platform_pot_path": pot.display().to_string()}),
                json!({}),
            )
            .unwrap();
        assert_eq!(output.result.unwrap()["diff_count"], 0);
        assert_eq!(output.log.messages()[0], "No new or updated messages found.");
    }

    #[test]
    fn missing_templates_are_logged() {
        let harness = Harness::new();
        let output = harness
            .invoke(&Calculate, "diff", json!({"src_pot_file": ""}), json!({}))
            .unwrap();
        assert_eq!(output.result.unwrap()["full_diff"], "");
        assert!(output.log.messages()[0].starts_with("Something went wrong in calculating diff"));
    }
}
