//! Error types for STRATA operations

use thiserror::Error;

/// Cache tier errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache entry {key} is missing required field {field}")]
    MissingField { key: String, field: String },

    #[error("cache entry {key} has malformed field {field}: {value:?}")]
    MalformedField {
        key: String,
        field: String,
        value: String,
    },

    #[error("cache backend error: {reason}")]
    Backend { reason: String },
}

/// Blob tier errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("object {key} is missing user metadata field {field}")]
    MissingMetadata { key: String, field: String },

    #[error("object {key} has malformed user metadata field {field}: {value:?}")]
    MalformedMetadata {
        key: String,
        field: String,
        value: String,
    },

    #[error("blob I/O error: {reason}")]
    Io { reason: String },

    #[error("blob backend error: {reason}")]
    Backend { reason: String },
}

/// Body compression errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported content encoding: {encoding}")]
    UnknownEncoding { encoding: String },

    #[error("failed to compress body: {reason}")]
    Compress { reason: String },

    #[error("failed to decompress body: {reason}")]
    Decompress { reason: String },
}

/// Lock service errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("lock backend error: {reason}")]
    Backend { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all STRATA errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrataError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("resource body of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

/// Result type alias for STRATA operations.
pub type StrataResult<T> = Result<T, StrataError>;
