//! Error types for the embedding bridge.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid embedding method: {0}")]
    InvalidMethod(String),

    #[error("Invalid or unsupported model '{model}' for method '{method}'")]
    InvalidModel { method: String, model: String },

    #[error("Failed to parse JSON array: {0}")]
    Parse(String),

    #[error("Embedding generation failed: {0}")]
    Backend(String),

    #[error("Output too large for batch: exceeds {ceiling} bytes")]
    OutputOverflow { ceiling: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Short label used as the `kind` field in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidMethod(_) => "invalid_method",
            Self::InvalidModel { .. } => "invalid_model",
            Self::Parse(_) => "parse",
            Self::Backend(_) => "backend",
            Self::OutputOverflow { .. } => "output_overflow",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Database(_) => "database",
            Self::Json(_) => "json",
            Self::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
