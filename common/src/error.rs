use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

use crate::storage::types::knowledge::FileError;

/// Broad error kind used at HTTP/API boundaries to pick a status code and a
/// stable machine-readable `code` string, independent of the underlying
/// variant's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    QuotaExceeded,
    UpstreamUnavailable,
    Timeout,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden | ErrorKind::QuotaExceeded => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::UpstreamUnavailable => 503,
            ErrorKind::Timeout => 504,
            ErrorKind::Internal => 500,
        }
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("File error: {0}")]
    File(#[from] FileError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Operation timed out: {0}")]
    Timeout(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("Graph mapper error: {0}")]
    GraphMapper(String),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Ingestion Processing error: {0}")]
    Processing(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Maps a variant to the error taxonomy an API boundary renders to the
    /// client. Database/IO/anyhow-wrapped errors default to `Internal`
    /// rather than leaking backend detail through the kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::BadRequest,
            AppError::Auth(_) => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            AppError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            AppError::Timeout(_) => ErrorKind::Timeout,
            AppError::OpenAI(e) => match e {
                OpenAIError::ApiError(api_err) => match api_err.code.as_deref() {
                    Some("invalid_api_key") | Some("insufficient_quota") => {
                        ErrorKind::Unauthorized
                    }
                    Some("model_not_found") => ErrorKind::NotFound,
                    _ => ErrorKind::UpstreamUnavailable,
                },
                OpenAIError::Reqwest(_) | OpenAIError::StreamError(_) => {
                    ErrorKind::UpstreamUnavailable
                }
                _ => ErrorKind::Internal,
            },
            AppError::Reqwest(e) if e.is_timeout() => ErrorKind::Timeout,
            AppError::Reqwest(_) => ErrorKind::UpstreamUnavailable,
            AppError::Database(_)
            | AppError::File(_)
            | AppError::LLMParsing(_)
            | AppError::Join(_)
            | AppError::GraphMapper(_)
            | AppError::Io(_)
            | AppError::ObjectStore(_)
            | AppError::Anyhow(_)
            | AppError::Processing(_)
            | AppError::InternalError(_) => ErrorKind::Internal,
        }
    }
}
