use salvo::http::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::constants::{
    ERROR_TYPE_API, ERROR_TYPE_AUTHENTICATION, ERROR_TYPE_INVALID_REQUEST, ERROR_TYPE_NOT_FOUND,
};

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub status: StatusCode,
    pub message: String,
    pub timed_out: bool,
}

impl UpstreamError {
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            message: message.into(),
            timed_out: true,
        }
    }
}

/// Request-scoped failures. None of them is fatal to the process.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request payload: {0}")]
    Validation(String),
    #[error("{0}")]
    ModelNotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::ModelNotFound(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Upstream(error) => error.status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => ERROR_TYPE_INVALID_REQUEST,
            Self::ModelNotFound(_) => ERROR_TYPE_NOT_FOUND,
            Self::Unauthorized(_) => ERROR_TYPE_AUTHENTICATION,
            Self::Upstream(_) | Self::Internal(_) => ERROR_TYPE_API,
        }
    }
}

pub fn extract_error_message_from_body(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        if let Some(message) = parsed
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
        if let Some(message) = parsed.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }

    if body.trim().is_empty() {
        "upstream API returned an empty error response".to_string()
    } else {
        body.to_string()
    }
}
