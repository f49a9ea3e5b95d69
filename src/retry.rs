//! Bounded retry of register reads on a half-duplex RS-485 bus.
//!
//! Every attempt is preceded by a short settle delay so the bus has turned
//! around before the next request. A transient failure (see
//! [`TransportError::is_transient`]) is followed by a longer cooldown and
//! another attempt until the attempt counter reaches the configured number of
//! retries; at that point the last transient failure is returned. Any other
//! failure is returned immediately.
//!
//! The counter is compared with `retries` itself, so `retries = N` allows at
//! most `N` attempts in total and `retries = 0` allows exactly one.

use crate::{
    error::{Error, Result},
    transport::TransportError,
};
use log::*;
use std::time::Duration;

/// Default pause before each attempt.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);
/// Default pause after a transient failure.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub settle_delay: Duration,
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            settle_delay: DEFAULT_SETTLE_DELAY,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    /// Runs `operation` under this policy, blocking the thread for the delays.
    pub fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, TransportError>,
    {
        self.run_with_sleep(operation, std::thread::sleep)
    }

    pub(crate) fn run_with_sleep<T, F, S>(&self, mut operation: F, mut sleep: S) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, TransportError>,
        S: FnMut(Duration),
    {
        let mut attempt = 0;
        while attempt <= self.retries {
            sleep(self.settle_delay);
            trace!("Read attempt {} of {}", attempt + 1, self.retries.max(1));
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    attempt += 1;
                    if attempt >= self.retries {
                        debug!("Giving up after {attempt} attempt(s): {err}");
                        return Err(Error::TransientRead(err));
                    }
                    warn!(
                        "Transient read failure on attempt {attempt}, retrying in {:?}: {err}",
                        self.cooldown
                    );
                    sleep(self.cooldown);
                }
                Err(err) => return Err(Error::NonTransientRead(err)),
            }
        }
        Err(Error::Configuration {
            retries: self.retries,
        })
    }
}
