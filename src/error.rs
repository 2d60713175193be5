use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to load data: {0}")]
    Load(String),

    #[error("Query rejected: {0}")]
    ValidationRejected(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Unsupported chart type: {0}")]
    UnsupportedChartType(String),

    #[error("Insufficient columns: {0}")]
    InsufficientColumns(String),

    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter { param: String, reason: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl InsightError {
    pub fn invalid_param(param: impl Into<String>, reason: impl Into<String>) -> Self {
        InsightError::InvalidParameter {
            param: param.into(),
            reason: reason.into(),
        }
    }
}

impl From<polars::prelude::PolarsError> for InsightError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        InsightError::Polars(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InsightError>;
