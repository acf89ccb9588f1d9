use thiserror::Error;

use crate::embeddings::EmbeddingError;

/// Top-level error taxonomy. Flat on purpose: callers map each variant to one
/// of three wire-level `error_type` values (`validation_error`,
/// `aws_service_error`, `internal_error`).
#[derive(Error, Debug)]
pub enum KbError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("AWS service error ({code}): {message}")]
    AwsService { code: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl KbError {
    /// Wire-level error classification used in response envelopes.
    pub fn error_type(&self) -> &'static str {
        match self {
            KbError::Validation(_) => "validation_error",
            KbError::AwsService { .. } => "aws_service_error",
            KbError::Embedding(EmbeddingError::Api { .. }) => "aws_service_error",
            _ => "internal_error",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        KbError::Validation(msg.into())
    }
}
