use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecError>;

#[derive(Debug, Error)]
pub enum RecError {
    #[error("interaction log is empty")]
    EmptyLog,

    #[error("k must be positive, got {0}")]
    InvalidK(i64),

    #[error("unknown user: {0}")]
    UnknownUser(i64),

    #[error("no eligible items left for user {0}")]
    CandidateExhausted(i64),

    #[error("schema mismatch: {0}")]
    Schema(String),

    #[error("model has not been fitted")]
    NotFitted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
