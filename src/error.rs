use axum::http::StatusCode;
use spike_types::{ErrorCode, ErrorResponse};
use thiserror::Error;

/// Process-level errors: configuration and startup.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file is corrupt: {0}")]
    CorruptCredential(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AppError {
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// An error as it is allowed to leave the process: a closed code, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError(pub ErrorCode);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        status_for(self.0)
    }
}

/// HTTP status for each wire error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::BadInput => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::ServerFault => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::AlreadyInitialized => StatusCode::CONFLICT,
        ErrorCode::KeyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<ErrorCode> for ApiError {
    fn from(code: ErrorCode) -> Self {
        Self(code)
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), axum::Json(ErrorResponse { err: self.0 })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_api_error_status_codes() {
        let cases = [
            (ErrorCode::BadInput, StatusCode::BAD_REQUEST),
            (ErrorCode::Unauthorized, StatusCode::UNAUTHORIZED),
            (ErrorCode::ServerFault, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorCode::AlreadyInitialized, StatusCode::CONFLICT),
            (ErrorCode::KeyUnavailable, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (code, status) in cases {
            assert_eq!(ApiError(code).into_response().status(), status);
        }
    }
}
