//! Error types surfaced by dataset builds and reads.

use crate::schema::FieldType;
use std::path::PathBuf;

/// Errors produced by enumeration, extraction, partition I/O, and reads.
///
/// Extractors and storage backends report [`anyhow::Error`]; those are carried
/// as the `source` of the typed variant so callers can still match on the
/// failure class.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A non-incremental build targeted an established destination.
    #[error("destination already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// A field observed mutually incompatible types.
    #[error("schema conflict on field `{field}`: {existing} is incompatible with {found}")]
    SchemaConflict {
        /// Dotted path of the conflicting field (`a.b`, `d[]`).
        field: String,
        existing: FieldType,
        found: FieldType,
    },

    /// The extraction capability failed for a source item.
    #[error("extraction failed for {item}")]
    ExtractionFailure {
        /// Identity of the failing source item.
        item: String,
        #[source]
        source: anyhow::Error,
    },

    /// Encoding, staging, or publishing a partition failed.
    #[error("failed to write partition {}", path.display())]
    PartitionWriteFailure {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A partition file could not be read or decoded.
    #[error("failed to read partition {}", path.display())]
    PartitionReadFailure {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// An existing manifest could not be loaded.
    #[error("manifest {} is corrupt: {reason}", path.display())]
    ManifestCorrupt { path: PathBuf, reason: String },

    /// The selection pattern is not a valid glob.
    #[error("invalid source pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// A worker panicked while processing its chunk.
    #[error("worker for chunk {chunk} panicked: {message}")]
    WorkerPanic { chunk: usize, message: String },

    /// The build was configured inconsistently with itself or the destination.
    #[error("invalid build configuration: {0}")]
    InvalidConfig(String),

    /// A column type that has no counterpart in [`FieldType`].
    #[error("unsupported column type: {0}")]
    UnsupportedType(String),

    /// A chunk stopped early because another chunk of the same run failed.
    #[error("chunk {0} cancelled after another chunk failed")]
    Cancelled(usize),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Construct a [`Error::SchemaConflict`] for the field at `path`.
    pub(crate) fn conflict(path: &str, existing: &FieldType, found: &FieldType) -> Self {
        Self::SchemaConflict {
            field: path.to_string(),
            existing: existing.clone(),
            found: found.clone(),
        }
    }
}
