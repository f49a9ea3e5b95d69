//! A library for reading the Selec EM2M power meter via MODBUS RTU.
//!
//! The meter exposes its measurements (voltage, current, power, energy,
//! frequency, power factor) as IEEE-754 floats in input registers and its serial
//! configuration in holding registers. This crate maps each quantity to its
//! register and reads it over an RS-485 line, retrying transient bus failures
//! within a configurable budget.
//!
//! ## Features
//!
//! - **Register Map**: Every documented quantity with its address and unit, see [`protocol`].
//! - **Bounded Retries**: Timeouts and I/O errors are retried, everything else is reported at once, see [`retry`].
//! - **Pluggable Transport**: The [`transport::Transport`] trait decouples the driver from the bus.
//! - **Strongly-Typed API**: Readings carry their [`protocol::Unit`], addresses are validated on creation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use em2m_lib::{protocol::Address, tokio_sync_client::EM2M};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut meter = EM2M::new(
//!         "/dev/ttyUSB0",
//!         "mains",
//!         Address::default(),
//!         9600,
//!         Duration::from_secs(1),
//!     );
//!     meter.set_retries(3);
//!
//!     println!("Voltage: {}", meter.voltage()?);
//!     println!("Active energy: {}", meter.active_energy()?);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod retry;
pub mod transport;

pub use error::{Error, Result};

#[cfg_attr(docsrs, doc(cfg(feature = "tokio-rtu-sync")))]
#[cfg(feature = "tokio-rtu-sync")]
pub mod tokio_common;

#[cfg_attr(docsrs, doc(cfg(feature = "tokio-rtu-sync")))]
#[cfg(feature = "tokio-rtu-sync")]
pub mod tokio_sync_client;
