use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
