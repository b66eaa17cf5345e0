//! DOWNLOAD: source packages, platform templates and translation files.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use url::Url;

use crate::engine::log::StepLog;
use crate::error::{Error, Result};
use crate::gettext;
use crate::services::{FetchAuth, FetchOutcome, PlatformAuth, TranslationPull};
use crate::utils::template::{self, TemplateVars};
use crate::utils::{io, locale};

use super::{CapabilityProvider, StepCall, StepOutput};

pub(super) const DOUBLE_UNDERSCORE: &str = "__";
const STORAGE_ROOT: &str = "/mnt/koji";

/// Keys that route a pull through the CI platform instead of the translation platform.
const CI_KEYS: [&str; 6] = [
    "ci_project_uid",
    "pkg_ci_engine",
    "pkg_ci_url",
    "pkg_ci_auth_usr",
    "pkg_ci_auth_token",
    "ci_lang_job_map",
];

/// Platform template URL per translation engine.
const POT_URL_TEMPLATES: [(&str, &str); 5] = [
    ("damnedlies", "{platform_url}/POT/{project}.{version}/{project}.{version}.pot"),
    ("transifex", "{platform_url}/api/2/project/{project}/resource/{version}/content/?file"),
    ("zanata", "{platform_url}/rest/file/source/{project}/{version}/pot?docId={domain}"),
    ("weblate", "{platform_url}/api/components/{project}/{version}/new_template/"),
    ("memsource", "{platform_url}/api2/v1/projects/{project}/jobs/{version}/original"),
];

pub struct Download;

impl CapabilityProvider for Download {
    fn command(&self) -> &'static str {
        "DOWNLOAD"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["srpm", "platform_pot_file", "pull_translations", "translation_files"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("translations", "pull_translations"),
            ("platform pot", "platform_pot_file"),
            ("source rpm", "srpm"),
        ]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "platform_pot_file" => platform_pot_file(call),
            "pull_translations" => pull_translations(call, call.input),
            "translation_files" => {
                let mut input = call.input.clone();
                for key in CI_KEYS {
                    input.remove(key);
                }
                pull_translations(call, &input)
            }
            "srpm" => srpm(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

fn srpm(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Download SRPM")?;
    let hub_url = call.require_str("hub_url")?;
    let build_system = call.env.services.build_system.as_ref();
    let server = call
        .input_str("build_system")
        .and_then(|name| call.env.config.download_server(name))
        .unwrap_or_default();

    let mut storage_path = None;
    if let Some(build) = call.input("builds").and_then(|b| b.as_array()).and_then(|b| b.first()) {
        storage_path = Some(
            build_system
                .build_srpm_path(hub_url, build)
                .map_err(|e| call.fail(&log, e))?,
        );
    }
    if let Some(task) = call.input("task").and_then(|t| t.as_object()) {
        if let Some(task_id) = task.get("task_id").filter(|id| !id.is_null()) {
            let task_dir = build_system
                .task_path(hub_url, task_id)
                .map_err(|e| call.fail(&log, e))?;
            let srpm_name = task_srpm_name(task).unwrap_or_default();
            storage_path = Some(format!("{}/{}", task_dir.trim_end_matches('/'), srpm_name));
        }
    }

    let storage_path = storage_path.ok_or_else(|| {
        call.fail(&log, Error::provider_missing_input(call.operation, "builds"))
    })?;
    let url = storage_path.replace(STORAGE_ROOT, server);
    let file_name = url.rsplit('/').next().unwrap_or_default();
    let target = call.env.sandbox.join(if file_name.is_empty() { "package.src.rpm" } else { file_name });

    match call
        .env
        .services
        .fetcher
        .fetch(&url, &FetchAuth::default())
        .map_err(|e| call.fail(&log, e))?
    {
        FetchOutcome::NotFound => {
            let err = Error::http_not_found(url.clone());
            return Err(call.fail(
                &log,
                Error::new(
                    err.code,
                    "SRPM download failed. URL returns 404 NOT FOUND error.",
                    err.details,
                ),
            ));
        }
        FetchOutcome::Found(body) => {
            io::write_bytes(&target, &body, "write SRPM").map_err(|e| call.fail(&log, e))?;
        }
    }
    log.info(format!("Successfully downloaded from {}", url))?;

    let mut result = Map::new();
    result.insert("srpm_path".to_string(), path_value(&target));
    Ok(StepOutput::with_result(result, log))
}

fn task_srpm_name(task: &Map<String, Value>) -> Option<String> {
    let from_single = task.get("srpm").and_then(|s| s.as_str());
    let from_list = task
        .get("srpms")
        .and_then(|s| s.as_array())
        .and_then(|s| s.first())
        .and_then(|s| s.as_str());
    from_single
        .or(from_list)
        .and_then(|path| path.rsplit('/').next())
        .map(|name| name.to_string())
}

fn platform_pot_file(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Download platform POT file")?;
    let package = call.require_str("package")?;
    let release = call.input_str("release_slug");

    let version = release
        .and_then(|slug| call.input("pkg_branch_map")?.get(slug))
        .filter(|mapping| mapping.as_object().map(|m| !m.is_empty()).unwrap_or(false))
        .map(|mapping| {
            mapping
                .get("platform_version")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        });
    let Some(version) = version else {
        let message = format!(
            "No branch mapping for {} package of {} release.",
            package,
            release.unwrap_or("given release")
        );
        log.info(message.as_str())?;
        return Err(call.fail(
            &log,
            Error::provider_failed("DOWNLOAD", call.operation, message),
        ));
    };

    let Some(engine) = call.input_str("pkg_tp_engine") else {
        return Ok(StepOutput::empty(log));
    };
    let Some(url_template) = POT_URL_TEMPLATES
        .iter()
        .find(|(name, _)| *name == engine)
        .map(|(_, template)| *template)
    else {
        let detail = format!("Unsupported platform engine: {}", engine);
        return Err(pot_failure(call, &mut log, &detail)?);
    };

    let doc_prefix = call.param_str("dir").map(|d| quote_path(&d)).unwrap_or_default();
    let i18n_domain = call.input_str("i18n_domain").unwrap_or_default();
    let platform_url = call.input_str("pkg_tp_url").unwrap_or_default();
    let auth = platform_fetch_auth(call, engine);
    let target = call.env.sandbox.join(format!("platform.{}.pot", i18n_domain));

    let render = |version: &str, domain: &str| {
        template::render(
            url_template,
            &[
                (TemplateVars::PLATFORM_URL, platform_url),
                (TemplateVars::PROJECT, package),
                (TemplateVars::VERSION, version),
                (TemplateVars::DOMAIN, domain),
            ],
        )
    };

    let mut domain = format!("{}{}", doc_prefix, i18n_domain);
    let mut attempts = vec![render(&version, &domain)];
    if let Some(upstream) = call.input_str("pkg_upstream_name") {
        if upstream != package && package == i18n_domain {
            domain = format!("{}{}", doc_prefix, upstream);
            attempts.push(render(&version, &domain));
        }
    }
    for probable in call.env.config.probable_versions.iter().map(|v| v.as_str()).chain([package]) {
        attempts.push(render(probable, &domain));
    }

    let mut located = None;
    for url in &attempts {
        match call.env.services.fetcher.fetch(url, &auth) {
            Ok(FetchOutcome::Found(body)) => {
                located = Some((url.clone(), body));
                break;
            }
            Ok(FetchOutcome::NotFound) => continue,
            Err(err) => return Err(pot_failure(call, &mut log, &err.message)?),
        }
    }

    let Some((url, body)) = located else {
        return Err(pot_failure(call, &mut log, "POT file could not be located at platform.")?);
    };

    io::write_bytes(&target, &body, "write platform POT").map_err(|e| call.fail(&log, e))?;
    if let Err(err) = gettext::Catalog::load(&target) {
        return Err(pot_failure(call, &mut log, &err.message)?);
    }
    log.info(format!("POT downloaded successfully. URL: {}", url))?;

    let mut result = Map::new();
    result.insert("platform_pot_path".to_string(), path_value(&target));
    Ok(StepOutput::with_result(result, log))
}

fn pot_failure(call: &StepCall<'_>, log: &mut StepLog, detail: &str) -> Result<Error> {
    let message = format!("POT download failed. Details: {}", detail);
    log.info(message.as_str())?;
    Ok(call.fail(log, Error::provider_failed("DOWNLOAD", call.operation, message)))
}

/// Transifex uses basic auth, zanata `X-Auth-*` headers, weblate a prefixed
/// `Authorization` header.
fn platform_fetch_auth(call: &StepCall<'_>, engine: &str) -> FetchAuth {
    let mut auth = FetchAuth::default();
    let (Some(user), Some(token)) = (call.input_str("pkg_tp_auth_usr"), call.input_str("pkg_tp_auth_token")) else {
        return auth;
    };
    let prefix = call.env.config.token_prefix(engine);
    match engine {
        "transifex" => auth.basic = Some((prefix.to_string(), token.to_string())),
        "zanata" => {
            auth.headers.push(("X-Auth-User".to_string(), user.to_string()));
            auth.headers.push(("X-Auth-Token".to_string(), token.to_string()));
        }
        "weblate" => auth
            .headers
            .push(("Authorization".to_string(), format!("{} {}", prefix, token))),
        _ => {}
    }
    auth
}

/// Percent-encode a path fragment the way a URL path would carry it.
fn quote_path(raw: &str) -> String {
    match Url::parse("http://quote.invalid/").and_then(|base| base.join(raw)) {
        Ok(url) => url.path().trim_start_matches('/').to_string(),
        Err(_) => raw.to_string(),
    }
}

fn pull_translations(call: &StepCall<'_>, input: &Map<String, Value>) -> Result<StepOutput> {
    let mut log = StepLog::new("Download translations", input)?;
    let get = |key: &str| {
        input
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    };

    let package = get("package").unwrap_or_default();
    let mut file_ext = "po".to_string();
    if let Some(ext) = get("trans_file_ext") {
        file_ext = ext.trim_start_matches('.').to_string();
    }
    if let Some(ext) = call.param_str("ext") {
        file_ext = ext.to_lowercase();
    }

    let download_dir = call
        .env
        .sandbox
        .join(call.param_str("dir").unwrap_or_else(|| "downloads".to_string()));
    let ci_project = get("ci_project_uid");
    let platform_project = ci_project.unwrap_or(package);
    let target_langs = call
        .param("target_langs")
        .map(locale::format_target_langs)
        .unwrap_or_default();

    let mut job_map = LangJobMap::from_input(input.get("ci_lang_job_map"));
    if ci_project.is_some() && !target_langs.iter().all(|lang| job_map.has_lang(lang)) {
        return Err(call.fail(
            &log,
            Error::provider_failed("DOWNLOAD", call.operation, "Job UID could NOT be found for target langs."),
        ));
    }

    let repo_branch = get("repo_branch");
    if call.param_bool("prepend_branch") && repo_branch.is_some() {
        job_map.retain_containing(repo_branch.unwrap_or_default());
    } else if call.param_bool("prepend_package") {
        job_map.retain_containing(package);
    } else if !call.param_bool("prepend_branch") {
        job_map.retain_plain_names();
    }

    let engine = get("pkg_ci_engine").or_else(|| get("pkg_tp_engine")).unwrap_or_default();
    let api_url = get("pkg_ci_url").or_else(|| get("pkg_tp_url")).unwrap_or_default();
    let auth = PlatformAuth {
        user: get("pkg_ci_auth_usr").or_else(|| get("pkg_tp_auth_usr")).map(String::from),
        token: get("pkg_ci_auth_token").or_else(|| get("pkg_tp_auth_token")).map(String::from),
    };
    let release_version = get("ci_release")
        .and_then(|release| input.get("pkg_branch_map")?.get(release)?.get("platform_version")?.as_str())
        .map(String::from);

    let mut trans_files = Vec::new();
    let mut failed_langs = Vec::new();
    for lang in &target_langs {
        let mut version = job_map
            .uid_for(lang)
            .or_else(|| repo_branch.map(String::from))
            .or_else(|| release_version.clone())
            .unwrap_or_default();
        if ci_project.is_none() {
            if let Some(branch) = call.param_str("branch") {
                version = branch;
            }
        }
        let remote_name = job_map
            .file_name_for(lang)
            .unwrap_or_else(|| format!("{}.{}", lang, file_ext));

        let request = TranslationPull {
            engine: engine.to_string(),
            api_url: api_url.to_string(),
            project: platform_project.to_string(),
            version,
            locale: match engine {
                "transifex" => Some(locale::format_locale(lang, false)),
                "weblate" => Some(locale::format_locale(lang, call.param_bool("alias_zh"))),
                _ => None,
            },
            lang: lang.clone(),
            auth: auth.clone(),
        };

        let reply = match call.env.services.translation_platform.pull_translation(&request) {
            Ok(reply) => reply,
            Err(err) => {
                log.info(format!("Something went wrong in pulling: {}", err.message))?;
                failed_langs.push(lang.clone());
                continue;
            }
        };
        if !reply.ok {
            log.info(format!(
                "Something went wrong in pulling translation file for {}: {}",
                lang,
                String::from_utf8_lossy(&reply.body)
            ))?;
            failed_langs.push(lang.clone());
            continue;
        }

        let mut file_name = remote_name;
        if call.param_bool("prepend_package") && file_name.contains(package) && file_name.contains(DOUBLE_UNDERSCORE) {
            log.info(format!("{} to be downloaded and renamed.", file_name))?;
            file_name = file_name.replace(package, "").replace(DOUBLE_UNDERSCORE, "");
        }
        let path = download_dir.join(&file_name);
        if io::write_bytes(&path, &reply.body, "write translation").is_err() {
            log.info(format!("Something went wrong in writing: {}", path.display()))?;
            failed_langs.push(lang.clone());
            continue;
        }
        log.info(format!("{} downloaded successfully.", file_name))?;
        trans_files.push(path_value(&path));
    }

    if !failed_langs.is_empty() {
        let lang = &failed_langs[0];
        return Err(call.fail(
            &log,
            Error::provider_failed(
                "DOWNLOAD",
                call.operation,
                format!("Pull failed for lang {}.", lang),
            )
            .with_detail("failed_langs", Value::from(failed_langs.clone())),
        ));
    }

    let mut result = Map::new();
    result.insert("download_dir".to_string(), path_value(&download_dir));
    result.insert("trans_files".to_string(), Value::Array(trans_files));
    result.insert("target_langs".to_string(), Value::from(target_langs));
    Ok(StepOutput::with_result(result, log))
}

/// CI job uid to `[lang, remote file name]`.
#[derive(Debug, Default)]
pub(super) struct LangJobMap {
    jobs: Vec<(String, String, String)>,
}

impl LangJobMap {
    pub(super) fn from_input(value: Option<&Value>) -> Self {
        let mut jobs = Vec::new();
        if let Some(Value::Object(map)) = value {
            for (uid, entry) in map {
                let fields: Vec<&str> = entry
                    .as_array()
                    .map(|items| items.iter().filter_map(|i| i.as_str()).collect())
                    .unwrap_or_default();
                if let [lang, file_name, ..] = fields.as_slice() {
                    jobs.push((uid.clone(), lang.to_string(), file_name.to_string()));
                }
            }
        }
        Self { jobs }
    }

    pub(super) fn has_lang(&self, lang: &str) -> bool {
        self.jobs.iter().any(|(_, l, _)| l == lang)
    }

    pub(super) fn retain_containing(&mut self, needle: &str) {
        self.jobs
            .retain(|(_, lang, file)| lang.contains(needle) || file.contains(needle));
    }

    pub(super) fn retain_plain_names(&mut self) {
        self.jobs.retain(|(_, _, file)| !file.contains(DOUBLE_UNDERSCORE));
    }

    pub(super) fn matching(&self, lang: &str) -> Option<&(String, String, String)> {
        self.jobs
            .iter()
            .find(|(_, l, file)| l.contains(lang) || file.contains(lang))
    }

    pub(super) fn uid_for(&self, lang: &str) -> Option<String> {
        self.matching(lang).map(|(uid, _, _)| uid.clone())
    }

    pub(super) fn file_name_for(&self, lang: &str) -> Option<String> {
        self.matching(lang).map(|(_, _, file)| file.clone())
    }
}

fn path_value(path: &Path) -> Value {
    Value::String(PathBuf::from(path).display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::Harness;
    use crate::services::{
        BuildSystem, Fetcher, PlatformReply, Services, TranslationPlatform, TranslationPush,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const POT: &str = "msgid \"\"\nmsgstr \"\"\n\nmsgid \"Hello\"\nmsgstr \"\"\n";

    /// Serves fixed bodies by URL and records every request.
    struct StaticFetcher {
        bodies: HashMap<String, Vec<u8>>,
        seen: Mutex<Vec<(String, FetchAuth)>>,
    }

    impl StaticFetcher {
        fn new(bodies: &[(&str, &str)]) -> Self {
            Self {
                bodies: bodies
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.as_bytes().to_vec()))
                    .collect(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Fetcher for StaticFetcher {
        fn fetch(&self, url: &str, auth: &FetchAuth) -> Result<FetchOutcome> {
            self.seen.lock().unwrap().push((url.to_string(), auth.clone()));
            Ok(match self.bodies.get(url) {
                Some(body) => FetchOutcome::Found(body.clone()),
                None => FetchOutcome::NotFound,
            })
        }
    }

    struct Koji;

    impl BuildSystem for Koji {
        fn latest_build(&self, _: &str, _: &str, _: &str) -> Result<Vec<Value>> {
            Ok(vec![])
        }

        fn task_info(&self, _: &str, _: &Value) -> Result<Map<String, Value>> {
            Ok(Map::new())
        }

        fn task_result(&self, _: &str, _: &Value) -> Result<Map<String, Value>> {
            Ok(Map::new())
        }

        fn build_srpm_path(&self, _: &str, build: &Value) -> Result<String> {
            Ok(format!("/mnt/koji/packages/{}.src.rpm", build["nvr"].as_str().unwrap_or_default()))
        }

        fn task_path(&self, _: &str, task_id: &Value) -> Result<String> {
            Ok(format!("/mnt/koji/work/tasks/{}", task_id))
        }
    }

    #[test]
    fn srpm_rewrites_storage_root_to_server() {
        let harness = Harness::with_services(
            Services::default().with_build_system(Koji).with_fetcher(StaticFetcher::new(&[(
                "https://kojipkgs.fedoraproject.org/packages/anaconda-39.src.rpm",
                "rpm-bytes",
            )])),
        );
        let output = harness
            .invoke(
                &Download,
                "srpm",
                json!({"hub_url": "https://koji/kojihub", "build_system": "koji",
                       "builds": [{"nvr": "anaconda-39"}]}),
                json!({}),
            )
            .unwrap();
        let path = output.result.unwrap()["srpm_path"].as_str().unwrap().to_string();
        assert!(path.ends_with("anaconda-39.src.rpm"));
        assert_eq!(std::fs::read(path).unwrap(), b"rpm-bytes");
    }

    #[test]
    fn srpm_not_found_is_hard_error() {
        let harness = Harness::with_services(
            Services::default().with_build_system(Koji).with_fetcher(StaticFetcher::new(&[])),
        );
        let err = harness
            .invoke(
                &Download,
                "srpm",
                json!({"hub_url": "h", "build_system": "koji",
                       "task": {"task_id": 9, "srpms": ["x/y/pkg-1.src.rpm"]}}),
                json!({}),
            )
            .unwrap_err();
        assert_eq!(err.code.as_str(), "http.not_found");
        assert_eq!(err.message, "SRPM download failed. URL returns 404 NOT FOUND error.");
        assert_eq!(
            err.details["url"],
            "https://kojipkgs.fedoraproject.org/work/tasks/9/pkg-1.src.rpm"
        );
    }

    fn pot_input() -> Value {
        json!({"package": "anaconda", "i18n_domain": "anaconda", "release_slug": "fedora-39",
               "pkg_branch_map": {"fedora-39": {"platform_version": "f39"}},
               "pkg_tp_engine": "weblate", "pkg_tp_url": "https://weblate.example.org",
               "pkg_tp_auth_usr": "bot", "pkg_tp_auth_token": "tok"})
    }

    #[test]
    fn pot_falls_back_through_probable_versions() {
        let fetcher = StaticFetcher::new(&[(
            "https://weblate.example.org/api/components/anaconda/master/new_template/",
            POT,
        )]);
        let harness = Harness::with_services(Services::default().with_fetcher(fetcher));
        let output = harness
            .invoke(&Download, "platform_pot_file", pot_input(), json!({}))
            .unwrap();
        let path = output.result.unwrap()["platform_pot_path"].as_str().unwrap().to_string();
        assert!(path.ends_with("platform.anaconda.pot"));
        assert!(output.log.messages()[0].starts_with("POT downloaded successfully."));
    }

    #[test]
    fn pot_exhausted_fallbacks_raise() {
        let harness = Harness::with_services(Services::default().with_fetcher(StaticFetcher::new(&[])));
        let err = harness
            .invoke(&Download, "platform_pot_file", pot_input(), json!({}))
            .unwrap_err();
        assert_eq!(
            err.message,
            "POT download failed. Details: POT file could not be located at platform."
        );
    }

    #[test]
    fn pot_requires_branch_mapping() {
        let harness = Harness::new();
        let mut input = pot_input();
        input["release_slug"] = json!("rhel-9");
        let err = harness
            .invoke(&Download, "platform_pot_file", input, json!({}))
            .unwrap_err();
        assert_eq!(err.message, "No branch mapping for anaconda package of rhel-9 release.");
    }

    #[test]
    fn weblate_auth_uses_prefixed_header() {
        let harness = Harness::new();
        let input = pot_input();
        let params = Map::new();
        let call = StepCall {
            operation: "platform_pot_file",
            input: input.as_object().unwrap(),
            params: &params,
            env: harness.env(),
        };
        let auth = platform_fetch_auth(&call, "weblate");
        assert_eq!(auth.headers, vec![("Authorization".to_string(), "Token tok".to_string())]);
        assert_eq!(platform_fetch_auth(&call, "transifex").basic, Some(("api".into(), "tok".into())));
    }

    #[test]
    fn quote_path_encodes_spaces() {
        assert_eq!(quote_path("help docs/"), "help%20docs/");
    }

    struct Platform {
        refuse: &'static str,
    }

    impl TranslationPlatform for Platform {
        fn pull_translation(&self, request: &TranslationPull) -> Result<PlatformReply<Vec<u8>>> {
            if request.lang == self.refuse {
                return Ok(PlatformReply::refused(b"denied".to_vec()));
            }
            Ok(PlatformReply::ok(format!("# {}", request.lang).into_bytes()))
        }

        fn push_translation(&self, _: &TranslationPush) -> Result<PlatformReply<Map<String, Value>>> {
            unreachable!()
        }

        fn update_source(&self, _: &TranslationPush) -> Result<PlatformReply<Map<String, Value>>> {
            unreachable!()
        }

        fn import_setting_details(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &PlatformAuth,
        ) -> Result<Option<Map<String, Value>>> {
            unreachable!()
        }
    }

    #[test]
    fn pull_writes_one_file_per_language() {
        let harness = Harness::with_services(
            Services::default().with_translation_platform(Platform { refuse: "none" }),
        );
        let output = harness
            .invoke(
                &Download,
                "translation_files",
                json!({"package": "anaconda", "pkg_tp_engine": "weblate",
                       "ci_project_uid": "should-be-ignored"}),
                json!({"target_langs": "de, fr", "dir": "trans"}),
            )
            .unwrap();
        let result = output.result.unwrap();
        assert!(result["download_dir"].as_str().unwrap().ends_with("trans"));
        assert_eq!(result["target_langs"], json!(["de", "fr"]));
        let files = result["trans_files"].as_array().unwrap();
        assert!(files[0].as_str().unwrap().ends_with("trans/de.po"));
    }

    #[test]
    fn refused_language_fails_after_the_rest() {
        let harness = Harness::with_services(
            Services::default().with_translation_platform(Platform { refuse: "de" }),
        );
        let err = harness
            .invoke(
                &Download,
                "pull_translations",
                json!({"package": "anaconda", "pkg_tp_engine": "weblate"}),
                json!({"target_langs": ["de", "fr"]}),
            )
            .unwrap_err();
        assert_eq!(err.message, "Pull failed for lang de.");
        assert_eq!(err.details["failed_langs"], json!(["de"]));
        let log = err.details["step_log"]["Download translations"].to_string();
        assert!(log.contains("fr.po downloaded successfully."));
    }

    #[test]
    fn unwritable_file_fails_the_language() {
        let harness = Harness::with_services(
            Services::default().with_translation_platform(Platform { refuse: "none" }),
        );
        let blocked = harness.sandbox.join("blocked");
        std::fs::create_dir_all(&blocked).unwrap();
        std::fs::create_dir_all(blocked.join("de.po")).unwrap();

        let err = harness
            .invoke(
                &Download,
                "pull_translations",
                json!({"package": "anaconda", "pkg_tp_engine": "weblate"}),
                json!({"target_langs": ["de", "fr"], "dir": "blocked"}),
            )
            .unwrap_err();
        assert_eq!(err.message, "Pull failed for lang de.");
        assert_eq!(err.details["failed_langs"], json!(["de"]));
        let log = err.details["step_log"]["Download translations"].to_string();
        assert!(log.contains("Something went wrong in writing"));
        assert!(log.contains("fr.po downloaded successfully."));
        assert!(!log.contains("de.po downloaded successfully."));
    }

    #[test]
    fn ci_project_requires_jobs_for_every_lang() {
        let harness = Harness::new();
        let err = harness
            .invoke(
                &Download,
                "pull_translations",
                json!({"package": "anaconda", "ci_project_uid": "p1",
                       "ci_lang_job_map": {"uid1": ["de", "de.po"]}}),
                json!({"target_langs": ["de", "fr"]}),
            )
            .unwrap_err();
        assert_eq!(err.message, "Job UID could NOT be found for target langs.");
    }
}
