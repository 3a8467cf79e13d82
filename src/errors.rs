//! Centralized error handling for meteoslice
//!
//! Every fallible operation in the crate returns [`MeteoError`]. The variants
//! follow the failure classes a caller has to tell apart: unreadable or
//! truncated files, malformed headers, out-of-bounds slice requests and files
//! that no backend recognizes.

use thiserror::Error;

/// Main error type for meteoslice operations
#[derive(Error, Debug)]
pub enum MeteoError {
    /// File missing, unreadable or truncated
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Header or record failed structural validation
    #[error("Format error: {0}")]
    Format(String),

    /// Range or section violates ordering or bounds
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// No backend recognizes the file, or no file is open
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Variable not found in the dataset
    #[error("Variable '{var}' not found in dataset")]
    VariableNotFound { var: String },

    /// Errors raised by the delegated NetCDF reader
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// Array shape mismatch while assembling a result
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl MeteoError {
    /// Shorthand for a truncated-data I/O failure.
    pub fn truncated(detail: impl std::fmt::Display) -> Self {
        MeteoError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("truncated data: {detail}"),
        ))
    }

    pub fn format(msg: impl Into<String>) -> Self {
        MeteoError::Format(msg.into())
    }

    pub fn invalid_range(msg: impl Into<String>) -> Self {
        MeteoError::InvalidRange(msg.into())
    }
}

/// Result type alias for meteoslice operations
pub type Result<T> = std::result::Result<T, MeteoError>;
