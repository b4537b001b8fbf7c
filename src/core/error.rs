use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate system id: {0}")]
    DuplicateSystemId(String),

    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("store is not bootstrapped")]
    NotBootstrapped,

    #[error("cycle detected: {0}")]
    CycleDetected(String),

    #[error("listener failed: {0}")]
    ListenerFailed(String),

    #[error("store error: {0}")]
    StoreError(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
