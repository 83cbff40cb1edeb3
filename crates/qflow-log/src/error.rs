//! Errors raised while initializing the logger.

use thiserror::Error;

/// Failure building or installing the global subscriber.
#[derive(Debug, Error)]
pub enum LogError {
    /// The configured filter directive string could not be parsed.
    #[error("invalid log filter {directive:?}: {source}")]
    Filter {
        /// The offending directive string.
        directive: String,
        /// Underlying parse error.
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    /// The rolling file writer could not be created.
    #[error("failed to open log directory {directory:?}: {source}")]
    FileWriter {
        /// The directory that failed to open.
        directory: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A global subscriber was already installed.
    #[error("a global tracing subscriber is already set")]
    AlreadyInitialized,
}

impl From<LogError> for qflow_error::QflowError {
    fn from(err: LogError) -> Self {
        qflow_error::QflowError::new(qflow_error::ErrorKind::from(
            qflow_error::InfrastructureError::ResourceUnavailable {
                resource: err.to_string(),
            },
        ))
    }
}
