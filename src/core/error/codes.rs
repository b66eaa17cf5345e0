use super::ErrorCode;

pub fn all_codes() -> &'static [ErrorCode] {
    &[
        ErrorCode::ConfigInvalidJson,
        ErrorCode::ConfigInvalidValue,
        ErrorCode::ValidationMissingArgument,
        ErrorCode::ValidationInvalidArgument,
        ErrorCode::ValidationInvalidJson,
        ErrorCode::JobInvalidTask,
        ErrorCode::ResolutionUnknownCommand,
        ErrorCode::ResolutionNoMatch,
        ErrorCode::ResolutionAmbiguous,
        ErrorCode::ResolutionUnresolved,
        ErrorCode::ProviderFailed,
        ErrorCode::ProviderMissingInput,
        ErrorCode::ProviderNotConfigured,
        ErrorCode::CommandNotAllowed,
        ErrorCode::CommandFailed,
        ErrorCode::GitCommandFailed,
        ErrorCode::HttpRequestFailed,
        ErrorCode::HttpNotFound,
        ErrorCode::InternalIoError,
        ErrorCode::InternalJsonError,
        ErrorCode::InternalUnexpected,
    ]
}

pub fn parse_code(code: &str) -> Option<ErrorCode> {
    all_codes()
        .iter()
        .copied()
        .find(|candidate| candidate.as_str() == code)
}
