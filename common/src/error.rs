use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("The provided CSV is empty")]
    EmptyInput,
    #[error("Malformed chunk identity: {0}")]
    MalformedIdentity(String),
    #[error("Stream IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Commit failure: {0}")]
    Commit(String),
    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),
    #[error("CSV parse error: {0}")]
    Parse(#[from] csv_async::Error),
    #[error("Publish failure: {0}")]
    Publish(String),
    #[error("Bad payload: {0}")]
    BadPayload(String),
    #[error("Ingestion processing error: {0}")]
    Processing(String),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}
