//! Error types for Strand Core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using Strand Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Strand storage and query subsystem
#[derive(Error, Debug)]
pub enum Error {
    /// Lexical or grammar error in a query, positioned at the offending token
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// 1-based line of the offending character or token
        line: usize,
        /// 1-based column of the offending character or token
        column: usize,
        /// Human readable expectation message
        message: String,
    },

    /// Byte sequence does not match the fixed size of a record kind
    #[error("Malformed {kind} record: expected {expected} bytes, got {actual}")]
    MalformedRecord {
        /// Record kind being decoded
        kind: &'static str,
        /// Fixed record size
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },

    /// Payload does not fit in its fixed-size slot
    #[error("{what} too large: limit {limit}, got {actual}")]
    PayloadTooLarge {
        /// What overflowed (label payload, property list, ...)
        what: &'static str,
        /// Maximum accepted
        limit: usize,
        /// Size supplied
        actual: usize,
    },

    /// A scalar does not fit in its bit-packed field
    #[error("Value out of range: {0}")]
    ValueOutOfRange(String),

    /// Store header does not match what the reader expects
    #[error("Incompatible store format in {path}: {reason}")]
    IncompatibleStoreFormat {
        /// Store file
        path: PathBuf,
        /// Which check failed
        reason: String,
    },

    /// File-system failure on a store or catalog file
    #[error("Store I/O error on {path}: {source}")]
    StoreIo {
        /// File or directory being accessed
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// I/O errors not tied to a particular store file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog could not be loaded or created at startup
    #[error("Engine initialization failed: {0}")]
    EngineInitialization(String),

    /// Top-level database directory is missing
    #[error("Database directory does not exist: {0}")]
    DatabaseMissing(PathBuf),

    /// Collection is not listed in the catalog
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Collection is already listed in the catalog
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Collection name is empty, too long or contains forbidden characters
    #[error("Invalid collection name '{0}': use 1-64 ASCII letters, digits, '_' or '-'")]
    InvalidCollectionName(String),

    /// Record id does not exist or is not in use
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record references another record that does not exist
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a syntax error at a source position
    pub fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a malformed-record error
    pub fn malformed(kind: &'static str, expected: usize, actual: usize) -> Self {
        Self::MalformedRecord {
            kind,
            expected,
            actual,
        }
    }

    /// Create a payload-too-large error
    pub fn too_large(what: &'static str, limit: usize, actual: usize) -> Self {
        Self::PayloadTooLarge {
            what,
            limit,
            actual,
        }
    }

    /// Create an incompatible-format error
    pub fn incompatible(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IncompatibleStoreFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O failure with the path it happened on
    pub fn store_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StoreIo {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code, paired with the display message in responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "SYNTAX_ERROR",
            Self::MalformedRecord { .. } => "MALFORMED_RECORD",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::ValueOutOfRange(_) => "VALUE_OUT_OF_RANGE",
            Self::IncompatibleStoreFormat { .. } => "INCOMPATIBLE_STORE_FORMAT",
            Self::StoreIo { .. } | Self::Io(_) => "STORE_IO_ERROR",
            Self::EngineInitialization(_) => "ENGINE_INITIALIZATION",
            Self::DatabaseMissing(_) => "DATABASE_MISSING",
            Self::CollectionNotFound(_) => "COLLECTION_NOT_FOUND",
            Self::CollectionExists(_) => "COLLECTION_EXISTS",
            Self::InvalidCollectionName(_) => "INVALID_COLLECTION_NAME",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidReference(_) => "INVALID_REFERENCE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// OS error code of the underlying I/O failure, if any
    pub fn os_error(&self) -> Option<i32> {
        match self {
            Self::StoreIo { source, .. } | Self::Io(source) => source.raw_os_error(),
            _ => None,
        }
    }

    /// Source position for syntax errors
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            Self::Syntax { line, column, .. } => Some((*line, *column)),
            _ => None,
        }
    }

    /// True when the error means a store file is corrupt or from another format
    pub fn is_record_format(&self) -> bool {
        matches!(
            self,
            Self::MalformedRecord { .. }
                | Self::PayloadTooLarge { .. }
                | Self::ValueOutOfRange(_)
                | Self::IncompatibleStoreFormat { .. }
        )
    }
}

/// Extension for attaching a path to raw `std::io::Result`s
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &std::path::Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| Error::store_io(path, e))
    }
}
