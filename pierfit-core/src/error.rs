//! Error types for pierfit

use thiserror::Error;

/// Main error type for pierfit operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed distance parameters or algorithm parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Ill-conditioned geometry, e.g. a flat or collinear point set
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Registration could not produce a usable transform
    #[error("Registration did not converge after {iterations} iterations: {reason}")]
    RegistrationDidNotConverge { iterations: usize, reason: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl Error {
    /// Whether the caller could reasonably retry with different inputs
    /// (a larger correspondence distance, other parameters).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RegistrationDidNotConverge { .. } | Error::DegenerateGeometry(_)
        )
    }
}

/// Result type alias for pierfit operations
pub type Result<T> = std::result::Result<T, Error>;
