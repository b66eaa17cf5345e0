//! PULLREQUEST: commit copied translations, push, and open a pull request.

use std::path::Path;

use serde_json::{Map, Value};
use url::Url;

use crate::error::{Error, Result};
use crate::git;
use crate::services::PullRequestPayload;
use crate::utils::locale;

use super::{CapabilityProvider, StepCall, StepOutput};

const COMMIT_MESSAGE: &str = "Add or Update Translations";
const L10N_REPO: &str = "l10n";
const ORIGIN: &str = "origin";

pub struct PullRequest;

impl CapabilityProvider for PullRequest {
    fn command(&self) -> &'static str {
        "PULLREQUEST"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["git_repo"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[("merge request", "git_repo"), ("pull request", "git_repo"), ("git repository", "git_repo")]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "git_repo" => git_repo(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

fn git_repo(call: &StepCall<'_>) -> Result<StepOutput> {
    let hosting = &call.env.services.git_hosting;
    let identity = &call.env.config.git;
    let token = hosting
        .api_token()
        .unwrap_or_else(|| identity.token.clone());
    let mut log = call.log("Pull Request")?.redacting(&token);

    let mut repo_url = call.require_str("upstream_repo_url")?;
    if call.param_str("type").as_deref() == Some(L10N_REPO) {
        if let Some(l10n_url) = call.input_str("upstream_l10n_repo_url") {
            repo_url = l10n_url;
        }
    }
    let repo_dir = call.require_path("src_tar_dir")?;
    let copied_files: Vec<String> = call
        .input("copied_files")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|i| i.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let git_user = hosting.user().unwrap_or_else(|| identity.user.clone());
    let sha = commit_files(&repo_dir, &git_user, &identity.email, &copied_files)
        .map_err(|e| call.fail(&log, e))?;
    log.with_prefix(
        copied_files.clone(),
        &format!("Files have been committed. SHA: {}", sha),
    )?;

    let origin = git::remote_url(&repo_dir, ORIGIN).ok_or_else(|| {
        call.fail(&log, Error::git_command_failed("Push URL cannot be blank."))
    })?;
    if !token.is_empty() {
        git::url_with_credentials(&origin, &token, "x-oauth-basic")
            .and_then(|url| git::set_remote_url(&repo_dir, ORIGIN, &url))
            .map_err(|e| call.fail(&log, e.redacted(&token)))?;
    }
    git::push(&repo_dir, ORIGIN).map_err(|e| call.fail(&log, e.redacted(&token)))?;
    log.info(format!("Files have been pushed to {}.", hosting_name(repo_url)))?;

    let branch_from = git::current_branch(&repo_dir).map_err(|e| call.fail(&log, e))?;
    let langs = call
        .input("ci_target_langs")
        .map(locale::format_target_langs)
        .unwrap_or_default();
    let payload = PullRequestPayload {
        title: COMMIT_MESSAGE.to_string(),
        body: format!("Translations for {} languages.", langs.join(", ")),
        head: format!("{}:{}", git_user, branch_from),
        base: call.param_str("branch").unwrap_or_else(|| branch_from.clone()),
    };

    let reply = hosting
        .create_pull_request(repo_url, &payload)
        .map_err(|e| call.fail(&log, e.redacted(&token)))?;
    let pull_request_url = if reply.ok {
        log.info(format!("Pull request has been created. Visit {}", reply.body))?;
        reply.body
    } else {
        log.info(format!("Pull request could not be created. {}", reply.body))?;
        String::new()
    };

    let mut result = Map::new();
    result.insert("pull_request_url".to_string(), Value::String(pull_request_url));
    Ok(StepOutput::with_result(result, log))
}

fn commit_files(repo_dir: &Path, user: &str, email: &str, files: &[String]) -> Result<String> {
    git::set_config(repo_dir, "user.name", user)?;
    git::set_config(repo_dir, "user.email", email)?;
    if !files.is_empty() {
        git::add(repo_dir, files)?;
    }
    git::commit(repo_dir, COMMIT_MESSAGE)
}

/// Host of the repository URL, used to name the platform in logs.
fn hosting_name(repo_url: &str) -> String {
    Url::parse(repo_url)
        .ok()
        .and_then(|url| url.host_str().map(String::from))
        .unwrap_or_else(|| repo_url.to_string())
}
