//! UNPACK: open source packages and tarballs inside the sandbox.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::error::Result;
use crate::utils::{archive, command, io};

use super::{CapabilityProvider, StepCall, StepOutput};

/// Keys copied from the input so later steps see them next to `src_tar_dir`.
const PASS_THROUGH: [&str; 3] = ["src_translations", "spec_obj", "spec_sections"];

pub struct Unpack;

impl CapabilityProvider for Unpack {
    fn command(&self) -> &'static str {
        "UNPACK"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["srpm", "tarball"]
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("source rpm", "srpm"),
            ("src rpm", "srpm"),
            ("tar", "tarball"),
            ("source tarball", "tarball"),
        ]
    }

    fn invoke(&self, call: &StepCall<'_>) -> Result<StepOutput> {
        match call.operation {
            "tarball" => tarball(call),
            "srpm" => srpm(call),
            _ => Err(call.unknown_operation(self.command())),
        }
    }
}

fn srpm(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Unpack SRPM")?;

    let srpm_path = call.require_path("srpm_path")?;
    let srpm_path = match call.input_str("base_dir") {
        Some(base) => Path::new(base).join(srpm_path),
        None => srpm_path,
    };
    let extract_dir = call.env.sandbox.join(call.require_str("package")?);
    io::ensure_dir(&extract_dir, "create extract dir").map_err(|e| call.fail(&log, e))?;

    let source = srpm_path.display().to_string();
    let target = extract_dir.display().to_string();
    if let Err(err) = command::pipe_in(
        call.env.sandbox.path(),
        ("rpm2cpio", &[source.as_str()]),
        ("cpio", &["-idm", "-D", target.as_str()]),
    ) {
        log.info(format!("SRPM Extraction Failed {}", err.message))?;
        return Err(call.fail(&log, err));
    }

    log.with_prefix(io::list_dir(&extract_dir), "SRPM Extracted Successfully")?;

    let mut result = Map::new();
    result.insert("extract_dir".to_string(), path_value(&extract_dir));
    Ok(StepOutput::with_result(result, log))
}

fn tarball(call: &StepCall<'_>) -> Result<StepOutput> {
    let mut log = call.log("Unpack tarball")?;

    let tar_file = call.require_path("src_tar_file")?;
    let extract_dir = call.require_path("extract_dir")?;
    let package = call.input_str("package").unwrap_or_default();

    let src_tar_dir = match extract_all(call, &tar_file, &extract_dir) {
        Ok(dir) => dir,
        Err(err) => {
            log.info(format!("Tarball Extraction Failed {}", err.message))?;
            return Err(call.fail(&log, err));
        }
    };
    let src_tar_dir = match src_tar_dir.filter(|dir| dir.is_dir()) {
        Some(dir) => dir,
        None => package_dir(&extract_dir, package),
    };

    let tar_name = tar_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    log.with_prefix(
        io::list_dir(&src_tar_dir),
        &format!("Tarball [ {} ] Extracted Successfully", tar_name),
    )?;

    let mut result = Map::new();
    result.insert("src_tar_dir".to_string(), path_value(&src_tar_dir));
    for key in PASS_THROUGH {
        result.insert(
            key.to_string(),
            call.input(key).cloned().unwrap_or(Value::Null),
        );
    }
    Ok(StepOutput::with_result(result, log))
}

/// Extract the main tarball, its related tarballs and nested gem data.
///
/// Returns the directory the first member landed in, if any.
fn extract_all(call: &StepCall<'_>, tar_file: &Path, extract_dir: &Path) -> Result<Option<PathBuf>> {
    let members = archive::member_names(tar_file)?;
    let mut src_tar_dir = archive::first_member_path(tar_file, extract_dir)?;
    archive::extract(tar_file, extract_dir)?;

    let related: Vec<&str> = call
        .input("related_tarballs")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|i| i.as_str()).collect())
        .unwrap_or_default();
    let related_dest = src_tar_dir.clone().unwrap_or_else(|| extract_dir.to_path_buf());
    for related_tarball in related {
        archive::extract(Path::new(related_tarball), &related_dest)?;
    }

    let is_gem = tar_file
        .extension()
        .map(|ext| ext == "gem")
        .unwrap_or(false);
    if is_gem && members.iter().any(|name| name == "data.tar.gz") {
        let data_dir = extract_dir.join("data");
        archive::extract(&extract_dir.join("data.tar.gz"), &data_dir)?;
        src_tar_dir = Some(data_dir);
    }

    Ok(src_tar_dir)
}

/// A top-level directory named after the package, else the extract root.
fn package_dir(extract_dir: &Path, package: &str) -> PathBuf {
    WalkDir::new(extract_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_dir() && entry.file_name() == package)
        .map(|entry| entry.into_path())
        .unwrap_or_else(|| extract_dir.to_path_buf())
}

fn path_value(path: &Path) -> Value {
    Value::String(path.display().to_string())
}
