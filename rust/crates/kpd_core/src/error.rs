use thiserror::Error;

/// Path/level disagreement reported by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Level mismatch: expected {expected} levels, got {actual}")]
    LevelMismatch { expected: usize, actual: usize },
}

/// Failure inside a store adapter.
///
/// Always fatal to the operation that hit it; never a "miss".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("search index error: {0}")]
    Index(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Boundary-facing error tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTier {
    NotFound,
    BadInput,
    Internal,
}

#[derive(Debug, Error)]
pub enum KpdError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl KpdError {
    pub fn tier(&self) -> ErrorTier {
        match self {
            Self::NotFound(_) => ErrorTier::NotFound,
            Self::InvalidInput(_) => ErrorTier::BadInput,
            Self::Store(_) | Self::Io(_) | Self::Internal(_) => ErrorTier::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self.tier() {
            ErrorTier::NotFound => 404,
            ErrorTier::BadInput => 400,
            ErrorTier::Internal => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, KpdError>;
