use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::paths;

/// Root configuration structure for jobs.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobsConfig {
    #[serde(default)]
    pub engine: EngineConfig,
}

/// All configurable engine settings that can be overridden via jobs.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory under which each run gets its own sandbox. `~` is expanded.
    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: String,

    /// Base commands a GENERATE step may run.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Build system name to artifact download server.
    #[serde(default = "default_download_servers")]
    pub download_servers: BTreeMap<String, String>,

    /// Versions tried, in order, when a platform template is not found.
    /// The package name is always tried last.
    #[serde(default = "default_probable_versions")]
    pub probable_versions: Vec<String>,

    /// Translation platform engine to API token prefix.
    #[serde(default = "default_platform_token_prefixes")]
    pub platform_token_prefixes: BTreeMap<String, String>,

    #[serde(default = "default_fork_wait_secs")]
    pub fork_wait_secs: u64,

    #[serde(default)]
    pub git: GitIdentity,

    /// Refuse to start a run while any task is unresolved.
    #[serde(default = "default_strict_resolution")]
    pub strict_resolution: bool,
}

/// Identity used when committing and pushing translations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitIdentity {
    #[serde(default = "default_git_user")]
    pub user: String,
    #[serde(default = "default_git_email")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

impl Default for GitIdentity {
    fn default() -> Self {
        Self {
            user: default_git_user(),
            email: default_git_email(),
            token: String::new(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sandbox_root: default_sandbox_root(),
            allowed_commands: default_allowed_commands(),
            download_servers: default_download_servers(),
            probable_versions: default_probable_versions(),
            platform_token_prefixes: default_platform_token_prefixes(),
            fork_wait_secs: default_fork_wait_secs(),
            git: GitIdentity::default(),
            strict_resolution: default_strict_resolution(),
        }
    }
}

impl EngineConfig {
    pub fn sandbox_root_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.sandbox_root).to_string())
    }

    pub fn download_server(&self, build_system: &str) -> Option<&str> {
        self.download_servers.get(build_system).map(|s| s.as_str())
    }

    pub fn token_prefix(&self, engine: &str) -> &str {
        self.platform_token_prefixes
            .get(engine)
            .map(|s| s.as_str())
            .unwrap_or("Token")
    }

    pub fn is_allowed_command(&self, base: &str) -> bool {
        self.allowed_commands.iter().any(|allowed| allowed == base)
    }
}

fn default_sandbox_root() -> String {
    paths::default_sandbox_root().display().to_string()
}

fn default_allowed_commands() -> Vec<String> {
    [
        "make",
        "intltool-update",
        "xgettext",
        "msgfmt",
        "msgmerge",
        "./setup.py",
        "npm",
        "yarn",
        "meson",
        "ninja",
        "cmake",
        "cd",
        "mkdir",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_download_servers() -> BTreeMap<String, String> {
    let mut servers = BTreeMap::new();
    servers.insert(
        "brew".to_string(),
        "http://download.eng.bos.redhat.com/brewroot".to_string(),
    );
    servers.insert(
        "koji".to_string(),
        "https://kojipkgs.fedoraproject.org".to_string(),
    );
    servers
}

fn default_probable_versions() -> Vec<String> {
    vec!["main".to_string(), "master".to_string(), "default".to_string()]
}

fn default_platform_token_prefixes() -> BTreeMap<String, String> {
    let mut prefixes = BTreeMap::new();
    prefixes.insert("transifex".to_string(), "api".to_string());
    prefixes.insert("weblate".to_string(), "Token".to_string());
    prefixes
}

fn default_fork_wait_secs() -> u64 {
    2
}

fn default_git_user() -> String {
    "transtats".to_string()
}

fn default_git_email() -> String {
    "transtats@localhost".to_string()
}

fn default_strict_resolution() -> bool {
    true
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load engine settings, merging file config with built-in defaults.
/// If jobs.json is missing or invalid, silently returns built-in defaults.
pub fn load_engine_config() -> EngineConfig {
    load_config().engine
}

/// Load the full jobs.json config, falling back to defaults on any error.
pub fn load_config() -> JobsConfig {
    load_config_from_file().unwrap_or_default()
}

fn load_config_from_file() -> crate::Result<JobsConfig> {
    let path = paths::jobs_json()?;

    if !path.exists() {
        return Err(crate::Error::other("jobs.json not found"));
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    parse_config(&content, &path.display().to_string())
}

pub fn parse_config(content: &str, origin: &str) -> crate::Result<JobsConfig> {
    serde_json::from_str(content).map_err(|e| crate::Error::config_invalid_json(origin, e))
}

/// Get the path to jobs.json (for display purposes)
pub fn config_path() -> crate::Result<String> {
    Ok(paths::jobs_json()?.display().to_string())
}

pub fn config_exists() -> bool {
    paths::jobs_json().map(|p| p.exists()).unwrap_or(false)
}
