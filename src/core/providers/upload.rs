//! UPLOAD: push translation files to a translation or CI platform.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::engine::log::StepLog;
use crate::error::{Error, Result};
use crate::services::{PlatformAuth, TranslationPush};
use crate::utils::{io, locale};

use super::download::{LangJobMap, DOUBLE_UNDERSCORE};
use super::{CapabilityProvider, StepCall, StepOutput};

const MEMSOURCE: &str = "memsource";
const WEBLATE: &str = "weblate";
const TEMPLATE_PREHOOK: &str = "copy_template_for_target_langs";
const PLATFORM_ENGINES: [&str; 5] = ["damnedlies", "transifex", "zanata", "weblate", "memsource"];

pub struct Upload;

impl CapabilityProvider for Upload {
    fn command(&self) -> &'static str {
        "UPLOAD"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["push_files", "submit_translations"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("push", "push_files"),
            ("push translations", "push_files"),
            ("submit", "submit_translations"),
        ]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "submit_translations" => submit_translations(call),
            "push_files" => push_files(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

/// Platform coordinates, preferring the CI platform over the translation platform.
struct Platform {
    engine: String,
    api_url: String,
    auth: PlatformAuth,
}

impl Platform {
    fn ci_first(call: &StepCall<'_>) -> Self {
        let pick = |ci: &str, tp: &str| {
            call.input_str(ci)
                .or_else(|| call.input_str(tp))
                .map(String::from)
        };
        Self {
            engine: pick("pkg_ci_engine", "pkg_tp_engine").unwrap_or_default(),
            api_url: pick("pkg_ci_url", "pkg_tp_url").unwrap_or_default(),
            auth: PlatformAuth {
                user: pick("pkg_ci_auth_usr", "pkg_tp_auth_usr"),
                token: pick("pkg_ci_auth_token", "pkg_tp_auth_token"),
            },
        }
    }

    fn translation(call: &StepCall<'_>) -> Self {
        let get = |key: &str| call.input_str(key).map(String::from);
        Self {
            engine: get("pkg_tp_engine").unwrap_or_default(),
            api_url: get("pkg_tp_url").unwrap_or_default(),
            auth: PlatformAuth {
                user: get("pkg_tp_auth_usr"),
                token: get("pkg_tp_auth_token"),
            },
        }
    }

    fn secret(&self) -> &str {
        self.auth.token.as_deref().unwrap_or_default()
    }
}

fn push_files(call: &StepCall<'_>) -> Result<StepOutput> {
    let platform = Platform::ci_first(call);
    let mut log = call.log("Push translations files")?.redacting(platform.secret());

    let mut trans_files = string_list(call.input("trans_files"));
    if let Some(prehook) = call.param_str("prehook") {
        if prehook == TEMPLATE_PREHOOK {
            copy_template_for_target_langs(call, &mut trans_files, &mut log)?;
        } else {
            log.info(format!("[WARN] Unknown prehook: {}", prehook))?;
        }
    }

    let package = call.input_str("package").unwrap_or_default();
    let project = call.input_str("ci_project_uid").unwrap_or(package).to_string();
    let file_ext = call
        .param_str("ext")
        .or_else(|| call.input_str("file_ext").map(String::from))
        .map(|ext| ext.to_lowercase())
        .unwrap_or_else(|| "po".to_string());
    let target_langs = call
        .param("target_langs")
        .map(locale::format_target_langs)
        .unwrap_or_default();
    check_ci_langs(call, &target_langs, "Provided target langs do NOT belong to the CI Pipeline.")
        .map_err(|e| call.fail(&log, e))?;

    let podir = call.input("podir").map(super::truthy).unwrap_or(false);
    let collected = collect_files(&trans_files, &file_ext, &target_langs, podir);
    let mut responses = Map::new();

    if collected.is_empty() {
        log.info(
            "[WARN] Files could not be collected to upload. Filename should have either locale or template.",
        )?;
        return Ok(push_result(&project, responses, log));
    }
    log_collected(&mut log, &collected, &file_ext)?;

    let update = call.param_bool("update");
    let job_map_input = call.input("ci_lang_job_map");
    let mut failed_langs = Vec::new();

    for (lang, file) in &collected {
        let path = PathBuf::from(file);
        let data = io::read_bytes(&path, "read translation file").map_err(|e| call.fail(&log, e))?;
        let mut file_name = file_name_of(&path);
        if podir {
            let ext = file_name.split('.').nth(1).unwrap_or(&file_ext).to_string();
            file_name = format!("{}.{}", parent_name(&path), ext);
        }

        let mut job_map = LangJobMap::from_input(job_map_input);
        if update && job_map_input.is_some() && !job_map.has_lang(lang) {
            return Err(call.fail(
                &log,
                Error::provider_failed(
                    "UPLOAD",
                    call.operation,
                    format!("Job ID NOT found for lang: {}. Please refresh the pipeline.", lang),
                ),
            ));
        }

        let mut headers = BTreeMap::new();
        let mut options = Map::new();
        if platform.engine == MEMSOURCE {
            options = memsource_options(call, &mut log, &platform, &mut job_map, lang, update)
                .map_err(|e| call.fail(&log, e))?;

            // Prefixes only change the uploaded name; files in `trans_files` stay put.
            for prefix in rename_prefixes(call, package) {
                file_name = format!("{}{}{}", prefix, DOUBLE_UNDERSCORE, file_name);
            }
            headers.insert("Memsource".to_string(), Value::Object(options.clone()).to_string());
            headers.insert(
                "Content-Disposition".to_string(),
                format!("attachment; filename=\"{}\"", file_name),
            );
        }

        let request = TranslationPush {
            engine: platform.engine.clone(),
            api_url: platform.api_url.clone(),
            project: project.clone(),
            version: None,
            lang: lang.clone(),
            file_name: file_name.clone(),
            data,
            headers,
            options,
            auth: platform.auth.clone(),
        };
        let service = &call.env.services.translation_platform;
        let reply = if update {
            service.update_source(&request)
        } else {
            service.push_translation(&request)
        };

        match reply {
            Err(err) => {
                log.info(format!("Something went wrong in uploading: {}", err.message))?;
                failed_langs.push(lang.clone());
            }
            Ok(reply) => {
                let prefix = if reply.ok {
                    format!("{} uploaded for {}", file_name, lang)
                } else {
                    format!("Could not upload: {} for {}", file_name, lang)
                };
                log.with_prefix(Value::Object(reply.body.clone()).to_string(), &prefix)?;
                if reply.ok {
                    let mut body = reply.body;
                    body.insert("project".to_string(), json!({ "uid": project }));
                    responses.insert(lang.clone(), Value::Object(body));
                } else {
                    failed_langs.push(lang.clone());
                }
            }
        }
    }

    if let Some(first) = failed_langs.first() {
        let err = Error::provider_failed("UPLOAD", call.operation, format!("Push failed for lang {}.", first))
            .with_detail("failed_langs", Value::from(failed_langs.clone()));
        return Err(call.fail(&log, err.redacted(platform.secret())));
    }
    Ok(push_result(&project, responses, log))
}

fn push_result(project: &str, responses: Map<String, Value>, log: StepLog) -> StepOutput {
    let mut by_project = Map::new();
    by_project.insert(project.to_string(), Value::Object(responses));
    let mut result = Map::new();
    result.insert("push_files_resp".to_string(), Value::Object(by_project));
    StepOutput::with_result(result, log)
}

/// Job options the memsource engine reads from the `Memsource` header.
fn memsource_options(
    call: &StepCall<'_>,
    log: &mut StepLog,
    platform: &Platform,
    job_map: &mut LangJobMap,
    lang: &str,
    update: bool,
) -> Result<Map<String, Value>> {
    let mut options = Map::new();
    if update {
        let prepend_branch = call.param_bool("prepend_branch");
        match call.input_str("repo_branch") {
            Some(branch) if prepend_branch => job_map.retain_containing(branch),
            _ if !prepend_branch => job_map.retain_plain_names(),
            _ => {}
        }
        let uid = job_map.uid_for(lang).ok_or_else(|| {
            Error::provider_failed("UPLOAD", call.operation, "Job ID NOT found. Please refresh the pipeline.")
        })?;
        options.insert("jobs".to_string(), json!([{ "uid": uid }]));
        options.insert("preTranslate".to_string(), json!("false"));
        return Ok(options);
    }

    options.insert("targetLangs".to_string(), json!([lang]));
    let Some(settings) = call.param_str("import_settings") else {
        return Ok(options);
    };
    if settings == "project" {
        log.info("[INFO] Using Project Import Settings.")?;
        options.insert("useProjectFileImportSettings".to_string(), json!("true"));
    } else if is_import_setting_uid(&settings) {
        let details = call
            .env
            .services
            .translation_platform
            .import_setting_details(&platform.engine, &platform.api_url, &settings, &platform.auth)?
            .ok_or_else(|| {
                Error::provider_failed("UPLOAD", call.operation, format!("Invalid ImportSetting: {}", settings))
            })?;
        if details.get("uid").and_then(|v| v.as_str()) == Some(settings.as_str()) {
            let name = details.get("name").and_then(|v| v.as_str()).unwrap_or_default();
            log.info(format!("[INFO] Using Import Settings: {} - {}", name, settings))?;
            options.insert("importSettings".to_string(), json!({ "uid": settings }));
        }
    }
    Ok(options)
}

fn is_import_setting_uid(value: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9]{22}$")
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

/// Prefixes to prepend with `__` before pushing, in application order.
fn rename_prefixes(call: &StepCall<'_>, package: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    if call.param_bool("prepend_branch") {
        if let Some(branch) = call.input_str("repo_branch") {
            prefixes.push(branch.to_string());
        }
    }
    if call.param_bool("prepend_package") {
        prefixes.push(package.to_string());
    }
    prefixes
}

/// Copy the template (first translation file) once per CI target language.
fn copy_template_for_target_langs(
    call: &StepCall<'_>,
    trans_files: &mut Vec<String>,
    log: &mut StepLog,
) -> Result<()> {
    let mut hook_log = StepLog::new(format!("Upload Prehook: {}", TEMPLATE_PREHOOK), call.input)?;

    let Some(template) = trans_files.first().cloned() else {
        hook_log.info("No template found.")?;
        log.entries.extend(hook_log.entries);
        return Ok(());
    };
    let lowered = template.to_lowercase();
    if !lowered.contains("template") && !lowered.contains("pot") {
        return Ok(());
    }
    hook_log.with_prefix(template.clone(), "Template collected")?;

    let base_dir = call.input_str("base_dir").map(Path::new);
    let resolve = |file: &str| match base_dir {
        Some(base) => base.join(file),
        None => PathBuf::from(file),
    };

    let target_langs = call
        .input("ci_target_langs")
        .map(locale::format_target_langs)
        .unwrap_or_default();
    let source = resolve(&template);
    for lang in &target_langs {
        let lang_file = template_for_lang(&template, lang);
        let bytes = io::read_bytes(&source, "read translation template")?;
        io::write_bytes(&resolve(&lang_file), &bytes, "copy translation template")?;
        trans_files.push(lang_file);
    }

    hook_log.info(format!(
        "{} files copied for {}.",
        target_langs.len(),
        target_langs.join(", ")
    ))?;
    log.entries.extend(hook_log.entries);
    Ok(())
}

/// `po/template.json` becomes `po/de.json`; `po/app.pot` becomes `po/de.po`.
fn template_for_lang(template: &str, lang: &str) -> String {
    let path = Path::new(template);
    let name = file_name_of(path);
    let renamed = if name.contains("template") {
        name.replace("template", lang)
    } else if name.ends_with(".pot") {
        format!("{}.po", lang)
    } else {
        name.replace("pot", "po")
    };
    path.with_file_name(renamed).display().to_string()
}

fn submit_translations(call: &StepCall<'_>) -> Result<StepOutput> {
    let platform = Platform::translation(call);
    let mut log = call.log("Submit translations")?.redacting(platform.secret());

    let repo_type = call.param_str("type").ok_or_else(|| {
        call.fail(&log, Error::provider_failed("UPLOAD", call.operation, "Please provide REPO_TYPE."))
    })?;
    let branch = call
        .param_str("branch")
        .or_else(|| call.input_str("repo_branch").map(String::from))
        .ok_or_else(|| {
            call.fail(&log, Error::provider_failed("UPLOAD", call.operation, "Please provide REPO_BRANCH."))
        })?;
    let file_ext = call
        .param_str("ext")
        .map(|ext| ext.to_lowercase())
        .unwrap_or_else(|| "po".to_string());
    let target_langs = call
        .input("target_langs")
        .map(locale::format_target_langs)
        .unwrap_or_default();
    check_ci_langs(call, &target_langs, "Provided target langs do NOT belong to CI Pipeline.")
        .map_err(|e| call.fail(&log, e))?;

    let project = call.input_str("package").unwrap_or_default().to_string();
    let trans_files = string_list(call.input("trans_files"));
    let collected = collect_files(&trans_files, &file_ext, &target_langs, false);
    if !collected.is_empty() {
        log_collected(&mut log, &collected, &file_ext)?;
    }
    if !PLATFORM_ENGINES.contains(&repo_type.as_str()) {
        log.info(format!("[WARN] Submitting to {} repositories is not supported.", repo_type))?;
        let mut result = Map::new();
        result.insert("submit_translations".to_string(), Value::Object(Map::new()));
        return Ok(StepOutput::with_result(result, log));
    }

    let mut responses = Map::new();
    let mut failed_langs = Vec::new();
    for (lang, file) in &collected {
        let path = Path::new(file);
        let file_name = file_name_of(path);
        let lang = locale::format_locale(lang, call.param_bool("alias_zh"));
        let data = io::read_bytes(path, "read translation file").map_err(|e| call.fail(&log, e))?;

        let mut options = Map::new();
        if platform.engine == WEBLATE {
            options.insert("overwrite".to_string(), json!("yes"));
            options.insert(
                "conflicts".to_string(),
                json!(call.param_str("conflicts").unwrap_or_else(|| "replace-translated".into())),
            );
            options.insert(
                "method".to_string(),
                json!(call.param_str("method").unwrap_or_else(|| "translate".into())),
            );
        }

        let request = TranslationPush {
            engine: platform.engine.clone(),
            api_url: platform.api_url.clone(),
            project: project.clone(),
            version: Some(branch.clone()),
            lang: lang.clone(),
            file_name: file_name.clone(),
            data,
            headers: BTreeMap::new(),
            options,
            auth: platform.auth.clone(),
        };
        match call.env.services.translation_platform.push_translation(&request) {
            Err(err) => {
                log.info(format!("Something went wrong in uploading: {}", err.message))?;
                failed_langs.push(lang);
            }
            Ok(reply) => {
                let prefix = if reply.ok {
                    format!("{} uploaded for {}", file_name, lang)
                } else {
                    format!("Could not upload: {} for {}", file_name, lang)
                };
                log.with_prefix(Value::Object(reply.body.clone()).to_string(), &prefix)?;
                if reply.ok {
                    responses.insert(lang, Value::Object(reply.body));
                } else {
                    failed_langs.push(lang);
                }
            }
        }
    }

    if let Some(first) = failed_langs.first() {
        let err = Error::provider_failed(
            "UPLOAD",
            call.operation,
            format!("Submit failed for lang {} of branch {}.", first, branch),
        )
        .with_detail("failed_langs", Value::from(failed_langs.clone()));
        return Err(call.fail(&log, err.redacted(platform.secret())));
    }

    let mut result = Map::new();
    result.insert("submit_translations".to_string(), Value::Object(responses));
    Ok(StepOutput::with_result(result, log))
}

/// Target languages of a CI pipeline run must come from the pipeline itself.
fn check_ci_langs(call: &StepCall<'_>, target_langs: &[String], message: &str) -> Result<()> {
    let ci_langs = call.input("ci_target_langs").map(locale::format_target_langs);
    match ci_langs {
        Some(ci_langs)
            if !target_langs.is_empty()
                && call.input("ci_pipeline_uuid").is_some()
                && !ci_langs.is_empty()
                && !target_langs.iter().all(|lang| ci_langs.contains(lang)) =>
        {
            Err(Error::provider_failed("UPLOAD", call.operation, message))
        }
        _ => Ok(()),
    }
}

/// Pair each target language with the last file whose locale part contains it.
fn collect_files(files: &[String], ext: &str, langs: &[String], podir: bool) -> Vec<(String, String)> {
    let suffix = format!(".{}", ext);
    let mut collected: Vec<(String, String)> = Vec::new();
    for lang in langs {
        for file in files {
            let path = Path::new(file);
            let file_lang = if podir {
                parent_name(path)
            } else {
                file_name_of(path).replace(&suffix, "")
            };
            if file_lang.contains(lang.as_str()) || file_lang.to_lowercase().contains(lang.as_str()) {
                match collected.iter_mut().find(|(l, _)| l == lang) {
                    Some(slot) => slot.1 = file.clone(),
                    None => collected.push((lang.clone(), file.clone())),
                }
            }
        }
    }
    collected
}

fn log_collected(log: &mut StepLog, collected: &[(String, String)], ext: &str) -> Result<()> {
    let listing: Map<String, Value> = collected
        .iter()
        .map(|(lang, file)| (lang.clone(), Value::String(file.clone())))
        .collect();
    log.with_prefix(
        Value::Object(listing).to_string(),
        &format!("{} {} files collected", collected.len(), ext.to_uppercase()),
    )
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|i| i.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn parent_name(path: &Path) -> String {
    path.parent().map(file_name_of).unwrap_or_default()
}
