use thiserror::Error;

/// Common error types for hiddenmesh
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("Hidden service error: {0}")]
    Service(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for hiddenmesh operations
pub type Result<T> = std::result::Result<T, MeshError>;

impl MeshError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn key_file(msg: impl Into<String>) -> Self {
        Self::KeyFile(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }
}
