use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Repository initialization failed: {message}")]
    Initialization { message: String },
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<RepositoryError> for crate::error::ChatError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Serialization(inner) => crate::error::ChatError::Format {
                message: inner.to_string(),
            },
            other => crate::error::ChatError::Unknown {
                message: other.to_string(),
            },
        }
    }
}
