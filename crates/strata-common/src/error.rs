//! Error types for strata-common.

use thiserror::Error;

/// Common error type for Strata operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The stream ended before a read of the requested length could complete.
    #[error("truncated stream at offset {offset}: needed {needed} bytes but only {available} available")]
    TruncatedStream {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// A byte selecting a variant holds none of the known values.
    #[error("invalid {what} discriminant {value} at offset {offset}")]
    InvalidDiscriminant {
        what: &'static str,
        value: u8,
        offset: u64,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
