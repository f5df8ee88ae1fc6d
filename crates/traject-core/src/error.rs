use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrajectError {
    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("student not found: {0}")]
    StudentNotFound(i64),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, TrajectError>;
