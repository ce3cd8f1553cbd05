//! Error types for the analysis engine

use thiserror::Error;

/// Errors that can occur during spectrogram analysis
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Invalid input parameters
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Analyses or feature sets that cannot be compared with each other
    #[error("incompatible analyses: {0}")]
    Incompatible(String),

    /// Persisted feature data that cannot be read back
    #[error("malformed feature data: {0}")]
    Malformed(String),

    /// Numerical error (non-convergence, overflow, etc.)
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Underlying I/O failure while reading or writing feature data
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
