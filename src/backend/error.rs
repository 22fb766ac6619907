use std::error::Error;
use thiserror::Error;

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Error raised by data backends regardless of the underlying store.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The store could not be reached or the call failed in transit.
    #[error("backend unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failing operation.
        message: String,
        /// Underlying transport or store error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl BackendError {
    /// Construct an unavailable error from any store failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        BackendError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
