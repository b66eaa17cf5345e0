use serde::{Deserialize, Serialize};
use serde_json::Value;

mod codes;

pub use codes::{all_codes, parse_code};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidJson,

    JobInvalidTask,

    ResolutionUnknownCommand,
    ResolutionNoMatch,
    ResolutionAmbiguous,
    ResolutionUnresolved,

    ProviderFailed,
    ProviderMissingInput,
    ProviderNotConfigured,

    CommandNotAllowed,
    CommandFailed,
    GitCommandFailed,

    HttpRequestFailed,
    HttpNotFound,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",

            ErrorCode::JobInvalidTask => "job.invalid_task",

            ErrorCode::ResolutionUnknownCommand => "resolution.unknown_command",
            ErrorCode::ResolutionNoMatch => "resolution.no_match",
            ErrorCode::ResolutionAmbiguous => "resolution.ambiguous",
            ErrorCode::ResolutionUnresolved => "resolution.unresolved",

            ErrorCode::ProviderFailed => "provider.failed",
            ErrorCode::ProviderMissingInput => "provider.missing_input",
            ErrorCode::ProviderNotConfigured => "provider.not_configured",

            ErrorCode::CommandNotAllowed => "command.not_allowed",
            ErrorCode::CommandFailed => "command.failed",
            ErrorCode::GitCommandFailed => "git.command_failed",

            ErrorCode::HttpRequestFailed => "http.request_failed",
            ErrorCode::HttpNotFound => "http.not_found",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionDetails {
    pub position: usize,
    pub command: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFailedDetails {
    pub command: String,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            format!("Invalid argument: {}", problem),
            details,
        )
    }

    pub fn validation_invalid_json(err: impl std::fmt::Display, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
        });

        Self::new(ErrorCode::ValidationInvalidJson, "Invalid JSON", details)
    }

    pub fn job_invalid_task(entry: impl Into<String>, problem: impl Into<String>) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::JobInvalidTask,
            format!("Invalid task entry: {}", problem),
            serde_json::json!({ "entry": entry.into(), "problem": problem }),
        )
    }

    pub fn resolution_unknown_command(details: ResolutionDetails) -> Self {
        let message = format!("Action mapping failed for {} command.", details.command);
        Self::new(ErrorCode::ResolutionUnknownCommand, message, to_details(details))
            .with_hint("Run 'transtats-jobs providers' to see registered commands")
    }

    pub fn resolution_no_match(details: ResolutionDetails) -> Self {
        let message = format!(
            "No operation of {} matches '{}'",
            details.command, details.description
        );
        Self::new(ErrorCode::ResolutionNoMatch, message, to_details(details))
    }

    pub fn resolution_ambiguous(details: ResolutionDetails) -> Self {
        let message = format!(
            "'{}' matches more than one {} operation: {}",
            details.description,
            details.command,
            details.candidates.join(", ")
        );
        Self::new(ErrorCode::ResolutionAmbiguous, message, to_details(details))
    }

    pub fn resolution_unresolved(positions: Vec<usize>, problems: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ResolutionUnresolved,
            format!("{} task(s) could not be resolved", positions.len()),
            serde_json::json!({ "positions": positions, "problems": problems }),
        )
        .with_hint("Run 'transtats-jobs plan <job>' to inspect the resolution")
    }

    pub fn provider_failed(
        command: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ProviderFailed,
            message,
            to_details(ProviderFailedDetails {
                command: command.into(),
                operation: operation.into(),
                cause: None,
            }),
        )
    }

    pub fn provider_missing_input(operation: impl Into<String>, key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ProviderMissingInput,
            format!("Required input '{}' is missing", key),
            serde_json::json!({ "operation": operation.into(), "key": key }),
        )
    }

    pub fn provider_not_configured(service: impl Into<String>) -> Self {
        let service = service.into();
        Self::new(
            ErrorCode::ProviderNotConfigured,
            format!("No {} client is configured", service),
            serde_json::json!({ "service": service }),
        )
    }

    pub fn command_not_allowed(command: impl Into<String>) -> Self {
        let command = command.into();
        Self::new(
            ErrorCode::CommandNotAllowed,
            format!("Invalid command: {}", command),
            serde_json::json!({ "command": command }),
        )
        .with_hint("Add the base command to allowed_commands in jobs.json")
    }

    pub fn command_failed(details: CommandFailedDetails) -> Self {
        let message = format!("Command failed: {}", details.command);
        Self::new(ErrorCode::CommandFailed, message, to_details(details))
    }

    pub fn git_command_failed(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::GitCommandFailed,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn http_request_failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        let mut err = Self::new(
            ErrorCode::HttpRequestFailed,
            format!("HTTP request failed: {}", error),
            serde_json::json!({ "url": url.into(), "error": error }),
        );
        err.retryable = Some(true);
        err
    }

    pub fn http_not_found(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::new(
            ErrorCode::HttpNotFound,
            format!("{} returns 404 NOT FOUND", url),
            serde_json::json!({ "url": url }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            serde_json::json!({ "path": path.into(), "error": err.to_string() }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::internal_unexpected(message)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Attach an extra key to the error details object.
    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        if !self.details.is_object() {
            self.details = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut self.details {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// Replace every occurrence of `secret` in the message and string details.
    pub fn redacted(mut self, secret: &str) -> Self {
        if secret.is_empty() {
            return self;
        }
        self.message = crate::utils::redact::redact(&self.message, secret);
        self.details = crate::utils::redact::redact_value(&self.details, secret);
        self
    }
}
