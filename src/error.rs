use std::collections::BTreeMap;
use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Payload shared by every [`ServiceError`] variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Stable string surfaced as the envelope's `error` field.
    pub category: &'static str,
    pub message: String,
    pub context: BTreeMap<String, String>,
}

impl ErrorDetail {
    pub fn new(category: &'static str, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(ErrorDetail),
    #[error("{0}")]
    Validation(ErrorDetail),
    #[error("{0}")]
    Duplicate(ErrorDetail),
    #[error("{0}")]
    UploadFailed(ErrorDetail),
    #[error("{0}")]
    Internal(ErrorDetail),
}

impl ServiceError {
    pub fn detail(&self) -> &ErrorDetail {
        match self {
            ServiceError::NotFound(d)
            | ServiceError::Validation(d)
            | ServiceError::Duplicate(d)
            | ServiceError::UploadFailed(d)
            | ServiceError::Internal(d) => d,
        }
    }

    pub fn category(&self) -> &'static str {
        self.detail().category
    }

    pub fn with(self, key: &str, value: impl fmt::Display) -> Self {
        match self {
            ServiceError::NotFound(d) => ServiceError::NotFound(d.with(key, value)),
            ServiceError::Validation(d) => ServiceError::Validation(d.with(key, value)),
            ServiceError::Duplicate(d) => ServiceError::Duplicate(d.with(key, value)),
            ServiceError::UploadFailed(d) => ServiceError::UploadFailed(d.with(key, value)),
            ServiceError::Internal(d) => ServiceError::Internal(d.with(key, value)),
        }
    }

    pub fn validation(category: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Validation(ErrorDetail::new(category, message))
    }

    pub fn not_found(category: &'static str, message: impl Into<String>) -> Self {
        ServiceError::NotFound(ErrorDetail::new(category, message))
    }

    pub fn internal(category: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Internal(ErrorDetail::new(category, message))
    }

    fn status(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Duplicate(_) => StatusCode::CONFLICT,
            ServiceError::UploadFailed(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure half of the response envelope.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
}

impl From<&ServiceError> for ErrorEnvelope {
    fn from(err: &ServiceError) -> Self {
        let detail = err.detail();
        let message = if detail.message.is_empty() {
            "Unable to process request".to_string()
        } else {
            detail.message.clone()
        };
        Self {
            success: false,
            error: detail.category,
            message,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorEnvelope::from(&self))).into_response()
    }
}

/// Success half of the response envelope; `payload` fields are inlined.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub payload: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            message: None,
            payload,
        }
    }

    pub fn with_message(payload: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            payload,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Errors reported by the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no rows returned")]
    NoRows,
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NoRows,
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
