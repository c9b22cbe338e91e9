use std::fmt::Display;

use thiserror::Error;

use crate::config::LoadError;
use crate::infra::error::InfraError;

/// Failure of one request against the portfolio API.
///
/// Messages are kept as strings so the error can be cloned into
/// [`FetchState`](crate::application::fetch::FetchState) and notices.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid request URL: {0}")]
    Url(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("server rejected the request: {0}")]
    Rejected(String),
}

impl FetchError {
    pub fn transport(err: impl Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl Display) -> Self {
        Self::Decode(err.to_string())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Label used for the `result` dimension of report counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
            Self::Rejected(_) => "rejected",
        }
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        Self::Url(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize slot `{slot}`: {message}")]
    Serialize { slot: String, message: String },
}

impl StorageError {
    pub fn serialize(slot: impl Into<String>, err: impl Display) -> Self {
        Self::Serialize {
            slot: slot.into(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_carries_body() {
        let err = FetchError::Status {
            status: 503,
            body: "maintenance".into(),
        };
        assert_eq!(
            err.to_string(),
            "request failed with status 503: maintenance"
        );
        assert_eq!(err.kind(), "status");
    }

    #[test]
    fn fetch_errors_lift_into_app_error() {
        let app: AppError = FetchError::rejected("no such design").into();
        assert!(matches!(app, AppError::Fetch(FetchError::Rejected(_))));
        assert_eq!(
            app.to_string(),
            "server rejected the request: no such design"
        );
    }
}
