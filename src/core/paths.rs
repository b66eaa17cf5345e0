use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base config directory (~/.config/transtats-jobs/ on Unix-like systems)
pub fn config_dir() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("transtats-jobs"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("transtats-jobs"))
    }
}

/// Global jobs.json config file path
pub fn jobs_json() -> Result<PathBuf> {
    Ok(config_dir()?.join("jobs.json"))
}

/// Default root under which per-run sandboxes are created
pub fn default_sandbox_root() -> PathBuf {
    env::temp_dir().join("transtats-jobs")
}
