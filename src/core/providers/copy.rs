//! COPY: place downloaded translations into the cloned repository.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::utils::io;

use super::{CapabilityProvider, StepCall, StepOutput};

pub struct CopyFiles;

impl CapabilityProvider for CopyFiles {
    fn command(&self) -> &'static str {
        "COPY"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["downloaded_files"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[("downloads", "downloaded_files"), ("translations", "downloaded_files")]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "downloaded_files" => downloaded_files(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

fn downloaded_files(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Copy Downloaded Files")?;

    let dir = match call.param_str("dir") {
        Some(dir) => dir.trim_matches('/').to_string(),
        None => {
            log.info("Dir value was empty, copying to root.")?;
            String::new()
        }
    };

    let repo_dir = call.require_str("src_tar_dir")?;
    let target_dir = Path::new(repo_dir).join(&dir);
    io::ensure_dir(&target_dir, "create copy target").map_err(|e| call.fail(&log, e))?;

    let base_dir = call.input_str("base_dir").map(Path::new);
    let files: Vec<&str> = call
        .input("trans_files")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|i| i.as_str()).collect())
        .unwrap_or_default();

    let mut copied_files = Vec::new();
    for file in files {
        let source = match base_dir {
            Some(base) => base.join(file),
            None => Path::new(file).to_path_buf(),
        };
        let copied = io::copy_into(&source, &target_dir, "copy downloaded file")
            .map_err(|e| call.fail(&log, e))?;
        let name = copied
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        copied_files.push(Path::new(&dir).join(name).display().to_string());
    }

    let prefix = format!("{} files copied to the repository.", copied_files.len());
    log.with_prefix(copied_files.clone(), &prefix)?;

    let mut result = Map::new();
    result.insert(
        "copied_files".to_string(),
        Value::Array(copied_files.into_iter().map(Value::String).collect()),
    );
    result.insert("repo_dir".to_string(), Value::String(repo_dir.to_string()));
    Ok(StepOutput::with_result(result, log))
}
