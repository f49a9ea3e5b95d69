use crate::transport::TransportError;

/// Represents all possible errors returned by the meter accessors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Timeout or I/O failure that persisted until the retry budget was used up.
    #[error("Transient read failure: {0}")]
    TransientRead(#[source] TransportError),

    /// Any other transport failure, reported on first occurrence.
    #[error("Non-transient read failure: {0}")]
    NonTransientRead(#[source] TransportError),

    /// The retry loop ended without a result.
    #[error("Elapsed maximum retries ({retries}) without a result")]
    Configuration { retries: u32 },
}

impl Error {
    /// Returns `true` for failures of the retryable class.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientRead(_))
    }

    /// The underlying transport failure, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Error::TransientRead(err) | Error::NonTransientRead(err) => Some(err),
            _ => None,
        }
    }
}

/// The result type for meter operations.
pub type Result<T> = std::result::Result<T, Error>;
