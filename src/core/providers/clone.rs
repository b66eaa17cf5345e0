//! CLONE: fetch the upstream source repository into the sandbox.

use std::thread;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::git::{self, CloneOptions};
use crate::utils::{io, redact};

use super::{CapabilityProvider, StepCall, StepOutput};

const WEBLATE: &str = "weblate";
const L10N_REPO: &str = "l10n";

pub struct CloneRepository;

impl CapabilityProvider for CloneRepository {
    fn command(&self) -> &'static str {
        "CLONE"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["git_repository"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("latest git branch", "git_repository"),
            ("git repo", "git_repository"),
            ("repository", "git_repository"),
        ]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "git_repository" => git_repository(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

fn git_repository(call: &StepCall<'_>) -> Result<StepOutput> {
    let token = call.input_str("pkg_tp_auth_token").unwrap_or_default();
    let mut log = call.log("Clone Repository")?.redacting(token);

    let package = call.require_str("package")?;
    let src_tar_dir = call.env.sandbox.join(package);
    if io::is_non_empty_dir(&src_tar_dir) {
        io::remove_path(&src_tar_dir).map_err(|e| call.fail(&log, e))?;
    }

    let repo_type = call.param_str("type").unwrap_or_default();
    let options = CloneOptions {
        branch: call.param_str("branch").filter(|_| repo_type != WEBLATE),
        recursive: call.param_bool("recursive"),
    };

    let mut clone_url = call.require_str("upstream_repo_url")?.to_string();
    if repo_type == L10N_REPO {
        if let Some(l10n_url) = call.input_str("upstream_l10n_repo_url") {
            clone_url = l10n_url.to_string();
        }
    }

    if call.param_bool("fork") {
        clone_url = fork(call, &clone_url).map_err(|e| call.fail(&log, e))?;
    }

    if repo_type == WEBLATE {
        let user = call.input_str("pkg_tp_auth_usr").unwrap_or_default();
        clone_url = git::url_with_credentials(&clone_url, user, token)
            .map_err(|e| call.fail(&log, e.redacted(token)))?;
    }

    log.info(format!(
        "Start cloning {} repository.",
        redact::mask_url_credentials(&clone_url)
    ))?;
    if let Err(err) = git::clone_repo(&clone_url, &src_tar_dir, &options) {
        let err = err.redacted(token);
        log.info(format!("Cloning failed. Details: {}", err.message))?;
        let branch = options.branch.clone().unwrap_or_default();
        let failure = Error::git_command_failed(format!(
            "Cloning '{}' branch failed. Details: {}",
            branch, err.message
        ));
        return Err(call.fail(&log, failure.redacted(token)));
    }

    log.with_prefix(io::list_dir(&src_tar_dir), "Cloning git repo completed.")?;

    let mut result = Map::new();
    result.insert(
        "src_tar_dir".to_string(),
        Value::String(src_tar_dir.display().to_string()),
    );
    Ok(StepOutput::with_result(result, log))
}

/// Replace any stale fork with a fresh one and return the URL to clone.
fn fork(call: &StepCall<'_>, repo_url: &str) -> Result<String> {
    let hosting = &call.env.services.git_hosting;
    if hosting.fork_exists(repo_url)? {
        hosting.delete_fork(repo_url)?;
    }
    match hosting.create_fork(repo_url)? {
        Some(fork_url) if !fork_url.is_empty() => {
            thread::sleep(Duration::from_secs(call.env.config.fork_wait_secs));
            Ok(fork_url)
        }
        _ => Ok(repo_url.to_string()),
    }
}
