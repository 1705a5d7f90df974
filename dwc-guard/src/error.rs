//! Error types for the dwc-guard validation library.
//!
//! All fallible operations in the crate return [`ValidatorError`]. Validation
//! *issues* found in the data are not errors: they are reported as
//! [`EvaluationDetail`](crate::model::EvaluationDetail) entries. Errors are
//! reserved for conditions that prevent a check or a job from running.

use thiserror::Error;

/// The main error type for the dwc-guard library.
#[derive(Error, Debug)]
pub enum ValidatorError {
    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error while reading a delimited file.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A caller supplied an argument that violates an API precondition.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The data file could not be prepared or read.
    #[error("Data file error for '{file}': {message}")]
    DataFile {
        /// Name of the file involved
        file: String,
        /// Detailed error message
        message: String,
    },

    /// A terminal status was already persisted for this job id.
    #[error("Job {0} already has a stored terminal status")]
    JobAlreadyStored(u64),

    /// Error from a job storage backend.
    #[error("Storage error ({backend}): {message}")]
    Storage {
        /// Storage backend (e.g., "file", "in_memory")
        backend: String,
        /// Detailed error message
        message: String,
    },

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, ValidatorError>`.
pub type Result<T> = std::result::Result<T, ValidatorError>;

impl ValidatorError {
    /// Creates a new data file error.
    pub fn data_file(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataFile {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Creates a new storage error.
    pub fn storage(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<ValidatorError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            match e.into() {
                ValidatorError::Internal(inner) => {
                    ValidatorError::Internal(format!("{msg}: {inner}"))
                }
                other => ValidatorError::Internal(format!("{msg}: {other}")),
            }
        })
    }
}
