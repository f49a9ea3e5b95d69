//! The bus access contract used by `EM2M` in `tokio_sync_client`.
//!
//! A [`Transport`] performs exactly one MODBUS request per call and reports
//! failures as a [`TransportError`]. Whether a failure is worth retrying is
//! decided by [`TransportError::is_transient`].

use std::io;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single request on the bus.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The slave did not answer within the configured timeout.
    #[error("No response from slave: {0}")]
    NoResponse(#[source] io::Error),

    /// Low-level I/O failure, including failure to open the serial port.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// The slave answered with a MODBUS exception response.
    #[error("Modbus exception: {0}")]
    Exception(#[source] BoxError),

    /// The response could not be understood.
    #[error("Modbus protocol error: {0}")]
    Protocol(#[source] BoxError),

    #[error("Unexpected number of registers: expected {expected}, got {actual}")]
    InvalidResponse { expected: usize, actual: usize },

    #[error("Function code {0:#04x} is not supported for this read")]
    UnsupportedFunction(u8),
}

impl TransportError {
    /// Classifies an I/O error: a timeout means the slave stayed silent.
    pub fn from_io(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::TimedOut {
            TransportError::NoResponse(err)
        } else {
            TransportError::Io(err)
        }
    }

    /// Timeouts and I/O errors may clear on the next attempt, everything else will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::NoResponse(_) | TransportError::Io(_))
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::from_io(err)
    }
}

/// Register level access to one slave on the bus.
///
/// Implementations apply their serial settings and timeout before any request.
pub trait Transport {
    /// Reads an IEEE-754 float spanning two registers starting at `address`.
    fn read_float(&mut self, address: u16, function_code: u8) -> Result<f32, TransportError>;

    /// Reads a single register and returns its raw value.
    fn read_register(&mut self, address: u16, function_code: u8) -> Result<u16, TransportError>;
}
