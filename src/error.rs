//! Error types shared by the catalog components.

use std::path::PathBuf;

/// Failures raised by an index engine implementation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("lmdb: {0}")]
    Lmdb(#[from] heed::Error),

    #[error("stored document codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("query parse error: {0}")]
    Query(String),

    #[error("corrupt index entry: {0}")]
    Corrupt(String),
}

/// Reasons an archive could not be introspected.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Errors surfaced to callers of the catalog API.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("index failure on {operation} against store '{store}': {source}")]
    IndexFailure {
        operation: &'static str,
        store: String,
        #[source]
        source: EngineError,
    },

    #[error("archive unreadable: {}: {source}", path.display())]
    ArchiveUnreadable {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    #[error("missing configuration key: {key}")]
    MissingConfiguration { key: &'static str },

    #[error("invalid configuration in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub fn index(operation: &'static str, store: &str, source: EngineError) -> Self {
        Self::IndexFailure {
            operation,
            store: store.to_string(),
            source,
        }
    }

    pub fn is_index_failure(&self) -> bool {
        matches!(self, Self::IndexFailure { .. })
    }
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;
