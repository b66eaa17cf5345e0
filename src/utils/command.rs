//! Command execution primitives with consistent error handling.

use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde::Serialize;

use crate::error::{CommandFailedDetails, Error, Result};

/// Run a command and capture its output without judging the exit status.
pub fn capture_in(dir: &Path, program: &str, args: &[&str]) -> Result<CapturedOutput> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("run {}", program))))?;

    Ok(CapturedOutput::from_output(&output))
}

/// Run a command line through `sh -c` inside `dir`.
pub fn run_shell_in(dir: &Path, command_line: &str) -> Result<CapturedOutput> {
    capture_in(dir, "sh", &["-c", command_line])
}

/// Fail early when `program` is not on `PATH`.
pub fn require_program(program: &str) -> Result<()> {
    which::which(program).map(|_| ()).map_err(|e| {
        let mut err = Error::command_failed(CommandFailedDetails {
            command: program.to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: e.to_string(),
        });
        err.message = format!("{} is not installed", program);
        err
    })
}

/// Pipe the stdout of one command into another, e.g. `rpm2cpio x | cpio -idm`.
pub fn pipe_in(
    dir: &Path,
    producer: (&str, &[&str]),
    consumer: (&str, &[&str]),
) -> Result<CapturedOutput> {
    let (producer_program, producer_args) = producer;
    let (consumer_program, consumer_args) = consumer;
    require_program(producer_program)?;
    require_program(consumer_program)?;

    let mut upstream = Command::new(producer_program)
        .args(producer_args)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("spawn {}", producer_program)))
        })?;

    let upstream_stdout = upstream.stdout.take().ok_or_else(|| {
        Error::internal_unexpected(format!("{} produced no stdout handle", producer_program))
    })?;

    let downstream = Command::new(consumer_program)
        .args(consumer_args)
        .current_dir(dir)
        .stdin(Stdio::from(upstream_stdout))
        .output()
        .map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("run {}", consumer_program)))
        })?;

    let upstream_output = upstream.wait_with_output().map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("wait {}", producer_program)))
    })?;

    if !upstream_output.status.success() {
        return Err(failure(producer_program, producer_args, &upstream_output));
    }
    if !downstream.status.success() {
        return Err(failure(consumer_program, consumer_args, &downstream));
    }

    Ok(CapturedOutput::from_output(&downstream))
}

/// Extract error text from command output.
///
/// Prefers stderr, falls back to stdout if stderr is empty.
pub fn error_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        stderr.trim().to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}

fn failure(program: &str, args: &[&str], output: &Output) -> Error {
    let mut command = vec![program.to_string()];
    command.extend(args.iter().map(|a| a.to_string()));

    let mut err = Error::command_failed(CommandFailedDetails {
        command: command.join(" "),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    });
    err.message = format!("{} failed: {}", program, error_text(output));
    err
}

/// Captured output from command execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapturedOutput {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl CapturedOutput {
    pub fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}
