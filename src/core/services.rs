//! External services consumed by capability providers.
//!
//! Build systems, git hosting and translation platforms sit behind these traits;
//! their wire protocols live in implementations supplied by the embedding
//! application. Unconfigured services fail with `provider.not_configured`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::http::HttpFetcher;

/// Credentials for a translation or CI platform.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformAuth {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip)]
    pub token: Option<String>,
}

/// Outcome reported by a platform call that can refuse without erroring.
#[derive(Debug, Clone)]
pub struct PlatformReply<T> {
    pub ok: bool,
    pub body: T,
}

impl<T> PlatformReply<T> {
    pub fn ok(body: T) -> Self {
        Self { ok: true, body }
    }

    pub fn refused(body: T) -> Self {
        Self { ok: false, body }
    }
}

#[derive(Debug, Clone)]
pub struct TranslationPull {
    pub engine: String,
    pub api_url: String,
    pub project: String,
    pub version: String,
    /// Locale as the platform expects it, when the engine addresses files by locale.
    pub locale: Option<String>,
    pub lang: String,
    pub auth: PlatformAuth,
}

#[derive(Debug, Clone)]
pub struct TranslationPush {
    pub engine: String,
    pub api_url: String,
    pub project: String,
    pub version: Option<String>,
    pub lang: String,
    pub file_name: String,
    pub data: Vec<u8>,
    pub headers: BTreeMap<String, String>,
    /// Engine-specific form fields or job options.
    pub options: Map<String, Value>,
    pub auth: PlatformAuth,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullRequestPayload {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

pub trait BuildSystem: Send + Sync {
    /// Latest builds of `package` tagged `tag`, newest first.
    fn latest_build(&self, hub_url: &str, tag: &str, package: &str) -> Result<Vec<Value>>;

    /// Task metadata; contains `id` when the task exists.
    fn task_info(&self, hub_url: &str, task_id: &Value) -> Result<Map<String, Value>>;

    fn task_result(&self, hub_url: &str, task_id: &Value) -> Result<Map<String, Value>>;

    /// Storage path of the source package of `build` (e.g. under `/mnt/koji`).
    fn build_srpm_path(&self, hub_url: &str, build: &Value) -> Result<String>;

    /// Storage directory of a task's outputs.
    fn task_path(&self, hub_url: &str, task_id: &Value) -> Result<String>;
}

pub trait TranslationPlatform: Send + Sync {
    fn pull_translation(&self, request: &TranslationPull) -> Result<PlatformReply<Vec<u8>>>;

    fn push_translation(&self, request: &TranslationPush) -> Result<PlatformReply<Map<String, Value>>>;

    fn update_source(&self, request: &TranslationPush) -> Result<PlatformReply<Map<String, Value>>>;

    fn import_setting_details(
        &self,
        engine: &str,
        api_url: &str,
        uid: &str,
        auth: &PlatformAuth,
    ) -> Result<Option<Map<String, Value>>>;
}

pub trait GitHosting: Send + Sync {
    /// Account that owns forks and authors pull requests.
    fn user(&self) -> Option<String>;

    /// Token embedded in push URLs.
    fn api_token(&self) -> Option<String>;

    fn fork_exists(&self, repo_url: &str) -> Result<bool>;

    fn delete_fork(&self, repo_url: &str) -> Result<()>;

    /// Create a fork; returns its clone URL when the platform reports one.
    fn create_fork(&self, repo_url: &str) -> Result<Option<String>>;

    /// Returns the pull request URL, or the platform's refusal reason.
    fn create_pull_request(
        &self,
        repo_url: &str,
        payload: &PullRequestPayload,
    ) -> Result<PlatformReply<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct FetchAuth {
    pub basic: Option<(String, String)>,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    NotFound,
    Found(Vec<u8>),
}

pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, auth: &FetchAuth) -> Result<FetchOutcome>;
}

/// Stand-in for a service the embedding application did not provide.
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured(pub &'static str);

impl Unconfigured {
    fn fail<T>(&self) -> Result<T> {
        Err(Error::provider_not_configured(self.0))
    }
}

impl BuildSystem for Unconfigured {
    fn latest_build(&self, _: &str, _: &str, _: &str) -> Result<Vec<Value>> {
        self.fail()
    }

    fn task_info(&self, _: &str, _: &Value) -> Result<Map<String, Value>> {
        self.fail()
    }

    fn task_result(&self, _: &str, _: &Value) -> Result<Map<String, Value>> {
        self.fail()
    }

    fn build_srpm_path(&self, _: &str, _: &Value) -> Result<String> {
        self.fail()
    }

    fn task_path(&self, _: &str, _: &Value) -> Result<String> {
        self.fail()
    }
}

impl TranslationPlatform for Unconfigured {
    fn pull_translation(&self, _: &TranslationPull) -> Result<PlatformReply<Vec<u8>>> {
        self.fail()
    }

    fn push_translation(&self, _: &TranslationPush) -> Result<PlatformReply<Map<String, Value>>> {
        self.fail()
    }

    fn update_source(&self, _: &TranslationPush) -> Result<PlatformReply<Map<String, Value>>> {
        self.fail()
    }

    fn import_setting_details(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: &PlatformAuth,
    ) -> Result<Option<Map<String, Value>>> {
        self.fail()
    }
}

impl GitHosting for Unconfigured {
    fn user(&self) -> Option<String> {
        None
    }

    fn api_token(&self) -> Option<String> {
        None
    }

    fn fork_exists(&self, _: &str) -> Result<bool> {
        self.fail()
    }

    fn delete_fork(&self, _: &str) -> Result<()> {
        self.fail()
    }

    fn create_fork(&self, _: &str) -> Result<Option<String>> {
        self.fail()
    }

    fn create_pull_request(&self, _: &str, _: &PullRequestPayload) -> Result<PlatformReply<String>> {
        self.fail()
    }
}

/// Service handles shared by every provider in a run.
pub struct Services {
    pub build_system: Box<dyn BuildSystem>,
    pub translation_platform: Box<dyn TranslationPlatform>,
    pub git_hosting: Box<dyn GitHosting>,
    pub fetcher: Box<dyn Fetcher>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            build_system: Box::new(Unconfigured("build system")),
            translation_platform: Box::new(Unconfigured("translation platform")),
            git_hosting: Box::new(Unconfigured("git hosting")),
            fetcher: Box::new(HttpFetcher::new()),
        }
    }
}

impl Services {
    pub fn with_build_system(mut self, build_system: impl BuildSystem + 'static) -> Self {
        self.build_system = Box::new(build_system);
        self
    }

    pub fn with_translation_platform(
        mut self,
        platform: impl TranslationPlatform + 'static,
    ) -> Self {
        self.translation_platform = Box::new(platform);
        self
    }

    pub fn with_git_hosting(mut self, hosting: impl GitHosting + 'static) -> Self {
        self.git_hosting = Box::new(hosting);
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }
}
