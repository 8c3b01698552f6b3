use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnknownMethod,
    UnknownAttribute,
    InvalidArguments,
    Configuration,
    NotFound,
    Internal,
}

/// An error raised while executing a request on the server side, carried back
/// to the client so it can be re-raised there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unknown_method(name: &str) -> Self {
        Self::new(
            ErrorCode::UnknownMethod,
            format!("'{name}' is not a remotely exposed operation"),
        )
    }

    pub fn unknown_attribute(name: &str) -> Self {
        Self::new(
            ErrorCode::UnknownAttribute,
            format!("'{name}' is not a remotely readable attribute"),
        )
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArguments, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}
