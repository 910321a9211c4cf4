use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`BatchStore`](crate::store::BatchStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("batch rejected: {0}")]
    Rejected(String),
}

/// Errors that can occur while importing records.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("expected {expected} fields, got {actual}")]
    MalformedRecord { expected: usize, actual: usize },
    #[error("input has no header line")]
    MissingHeader,
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error reading CSV record: {0}")]
    SourceRead(#[from] csv::Error),
    #[error("batch insert failed: {0}")]
    Write(#[from] StoreError),
    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

impl ImportError {
    /// Whether the importer skips this error and keeps going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ImportError::MalformedRecord { .. })
    }
}

/// An import that stopped early.
///
/// Rows written before the failure stay in the store, so `rows_written` is
/// meaningful even though the import did not finish.
#[derive(Debug, Error)]
#[error("import stopped after {rows_written} rows: {error}")]
pub struct ImportAborted {
    pub rows_written: usize,
    #[source]
    pub error: ImportError,
}

impl ImportAborted {
    pub fn new(rows_written: usize, error: ImportError) -> Self {
        Self {
            rows_written,
            error,
        }
    }
}

/// Errors from schema management.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to {action}: {source}")]
    Database {
        action: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl SchemaError {
    pub(crate) fn database(action: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| SchemaError::Database { action, source }
    }
}

/// Invalid import configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be at least 1")]
    Zero { name: &'static str },
    #[error("batch size {batch_size} exceeds the maximum of {max}")]
    BatchTooLarge { batch_size: usize, max: usize },
    #[error("{0} is not set")]
    Missing(&'static str),
}
