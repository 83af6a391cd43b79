//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::DomainError;
use crate::infrastructure::traits::ProcessError;

/// Application errors wrap domain errors and add application-level context.
///
/// Everything here is fatal to a run. Per-document failures are recorded as
/// [`crate::domain::ExportOutcome`] values instead.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("config error: {message}")]
    Config { message: String },

    #[error("structure scan of {root} failed: {source}")]
    Scan {
        root: String,
        #[source]
        source: ProcessError,
    },

    #[error("cannot decode {context}: {message}")]
    Decode { context: String, message: String },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("interrupted")]
    Cancelled,
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
