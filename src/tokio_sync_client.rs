//! Synchronous `tokio-modbus` client for the Selec EM2M power meter.
//!
//! This module provides [`EM2M`], the driver for one meter on the RS-485 bus, and
//! [`ModbusTransport`], the [`Transport`] it uses by default. Every accessor
//! resolves its register through [`crate::protocol`] and runs the request under
//! the meter's [`RetryPolicy`].
//!
//! All methods block the current thread for the serial round trip plus any
//! retry delays.
//!
//! # Shared buses
//!
//! Each [`EM2M`] owns its transport and does not coordinate with other
//! instances. When several meters hang on the same physical bus, the caller must
//! make sure only one request is on the wire at a time, for example by polling
//! them from a single thread or by guarding each port with a `Mutex`.
//!
//! # Example
//!
//! ```no_run
//! use em2m_lib::{protocol::Address, tokio_sync_client::EM2M};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let address = Address::try_from(1)?;
//!     let mut meter = EM2M::new("/dev/ttyUSB0", "mains", address, 9600, Duration::from_secs(1));
//!     meter.set_retries(3);
//!
//!     let voltage = meter.voltage()?;
//!     println!("{}: {}", meter.name(), voltage);
//!     Ok(())
//! }
//! ```

use crate::{
    error::Result,
    protocol::{self as proto, Quantity, Reading, RegisterSpec, SerialConfig},
    retry::RetryPolicy,
    tokio_common::{PortMode, SerialSettings},
    transport::{Transport, TransportError},
};
use log::*;
use std::{fmt, time::Duration};
use tokio_modbus::{client::sync::Context, prelude::SyncReader, Slave};

/// A [`Transport`] over a synchronous `tokio-modbus` RTU context.
///
/// Depending on [`PortMode`] the serial port is either opened for each request
/// or kept open. A persistent context is dropped after an I/O failure and
/// re-opened on the next request.
pub struct ModbusTransport {
    settings: SerialSettings,
    slave: Slave,
    ctx: Option<Context>,
}

impl fmt::Debug for ModbusTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModbusTransport")
            .field("settings", &self.settings)
            .field("slave", &self.slave)
            .field("connected", &self.ctx.is_some())
            .finish()
    }
}

/// Maps a `tokio-modbus` result to our result.
fn map_tokio_result<T>(result: tokio_modbus::Result<T>) -> std::result::Result<T, TransportError> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(exception)) => Err(TransportError::Exception(Box::new(exception))),
        Err(tokio_modbus::Error::Transport(err)) => Err(TransportError::from_io(err)),
        Err(err) => Err(TransportError::Protocol(Box::new(err))),
    }
}

/// Whether a context may be reused after a request that returned `result`.
fn keep_context<T>(port_mode: PortMode, result: &tokio_modbus::Result<T>) -> bool {
    port_mode == PortMode::Persistent && !matches!(result, Err(tokio_modbus::Error::Transport(_)))
}

fn check_quantity(words: Vec<u16>, quantity: u16) -> std::result::Result<Vec<u16>, TransportError> {
    if words.len() != quantity as usize {
        return Err(TransportError::InvalidResponse {
            expected: quantity as usize,
            actual: words.len(),
        });
    }
    Ok(words)
}

impl ModbusTransport {
    /// Creates a transport for the slave at `address`. The port is opened on the first request.
    pub fn new(settings: SerialSettings, address: proto::Address) -> Self {
        Self {
            settings,
            slave: Slave(*address),
            ctx: None,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Returns `true` while a persistent context is held open.
    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    fn connect(&self) -> std::result::Result<Context, TransportError> {
        debug!(
            "Opening {} at {} baud for slave {}",
            self.settings.device, self.settings.baud_rate, self.slave.0
        );
        let mut ctx = tokio_modbus::client::sync::rtu::connect_slave(
            &self.settings.serial_port_builder(),
            self.slave,
        )?;
        ctx.set_timeout(self.settings.timeout);
        Ok(ctx)
    }

    fn request<T, F>(&mut self, operation: F) -> std::result::Result<T, TransportError>
    where
        F: FnOnce(&mut Context) -> tokio_modbus::Result<T>,
    {
        let mut ctx = match self.ctx.take() {
            Some(ctx) => ctx,
            None => self.connect()?,
        };
        let result = operation(&mut ctx);

        if keep_context(self.settings.port_mode, &result) {
            self.ctx = Some(ctx);
        } else {
            debug!("Closing {}", self.settings.device);
        }
        map_tokio_result(result)
    }

    fn read_words(
        &mut self,
        address: u16,
        function_code: u8,
        quantity: u16,
    ) -> std::result::Result<Vec<u16>, TransportError> {
        let words = match function_code {
            proto::READ_HOLDING_REGISTERS => {
                self.request(|ctx| ctx.read_holding_registers(address, quantity))?
            }
            proto::READ_INPUT_REGISTERS => {
                self.request(|ctx| ctx.read_input_registers(address, quantity))?
            }
            code => return Err(TransportError::UnsupportedFunction(code)),
        };
        check_quantity(words, quantity)
    }
}

impl Transport for ModbusTransport {
    fn read_float(
        &mut self,
        address: u16,
        function_code: u8,
    ) -> std::result::Result<f32, TransportError> {
        let words = self.read_words(address, function_code, proto::FLOAT_QUANTITY)?;
        Ok(proto::decode_float([words[0], words[1]]))
    }

    fn read_register(
        &mut self,
        address: u16,
        function_code: u8,
    ) -> std::result::Result<u16, TransportError> {
        let words = self.read_words(address, function_code, 1)?;
        Ok(words[0])
    }
}

/// Driver for one Selec EM2M power meter.
///
/// The `name` is a free label for logs and output, the bus address is fixed at
/// construction. The retry budget defaults to zero, i.e. a single attempt per
/// register.
#[derive(Debug)]
pub struct EM2M<T = ModbusTransport> {
    name: String,
    slave_address: proto::Address,
    policy: RetryPolicy,
    transport: T,
}

impl EM2M<ModbusTransport> {
    /// Creates a meter on `device` that opens the port for each request.
    ///
    /// # Arguments
    ///
    /// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
    /// * `name` - A label for this meter.
    /// * `address` - The meter's MODBUS slave address.
    /// * `baud_rate` - The baud rate configured on the meter.
    /// * `timeout` - How long to wait for each response.
    pub fn new(
        device: &str,
        name: impl Into<String>,
        address: proto::Address,
        baud_rate: u32,
        timeout: Duration,
    ) -> Self {
        let settings = SerialSettings::new(device)
            .baud_rate(baud_rate)
            .timeout(timeout);
        Self::with_settings(name, address, settings)
    }

    /// Creates a meter from complete serial settings, e.g. to select the parity
    /// or keep the port open between requests.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use em2m_lib::{
    ///     protocol::Address,
    ///     tokio_common::{PortMode, SerialSettings},
    ///     tokio_sync_client::EM2M,
    /// };
    ///
    /// let settings = SerialSettings::new("/dev/ttyUSB0")
    ///     .baud_rate(19200)
    ///     .port_mode(PortMode::Persistent);
    /// let meter = EM2M::with_settings("mains", Address::default(), settings);
    /// assert_eq!(meter.name(), "mains");
    /// ```
    pub fn with_settings(
        name: impl Into<String>,
        address: proto::Address,
        settings: SerialSettings,
    ) -> Self {
        Self::with_transport(name, address, ModbusTransport::new(settings, address))
    }
}

impl<T: Transport> EM2M<T> {
    /// Creates a meter on top of any [`Transport`].
    ///
    /// # Arguments
    ///
    /// * `name` - A label for this meter.
    /// * `address` - The slave address `transport` talks to.
    /// * `transport` - The bus access used for every register read.
    pub fn with_transport(name: impl Into<String>, address: proto::Address, transport: T) -> Self {
        Self {
            name: name.into(),
            slave_address: address,
            policy: RetryPolicy::default(),
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The bus address this meter was constructed with.
    pub fn slave_address(&self) -> proto::Address {
        self.slave_address
    }

    pub fn retries(&self) -> u32 {
        self.policy.retries
    }

    pub fn set_retries(&mut self, retries: u32) {
        self.policy.retries = retries;
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn read_float_register(&mut self, spec: RegisterSpec) -> Result<f32> {
        let transport = &mut self.transport;
        self.policy
            .run(|| transport.read_float(spec.address, spec.function_code))
    }

    fn read_config_register(&mut self, address: u16) -> Result<u16> {
        let transport = &mut self.transport;
        self.policy
            .run(|| transport.read_register(address, proto::CONFIG_FUNCTION_CODE))
    }

    /// Reads one quantity and tags it with its unit.
    pub fn read(&mut self, quantity: Quantity) -> Result<Reading> {
        let spec = quantity.register();
        let value = self.read_float_register(spec).inspect_err(|err| {
            debug!("{}: reading {quantity} failed: {err}", self.name);
        })?;
        trace!("{}: {quantity} = {value} {}", self.name, spec.unit);
        Ok(Reading {
            value,
            unit: spec.unit,
        })
    }

    /// Reads every quantity in [`Quantity::ALL`] order, stopping at the first failure.
    pub fn read_all(&mut self) -> Result<Vec<(Quantity, Reading)>> {
        Quantity::ALL
            .into_iter()
            .map(|quantity| self.read(quantity).map(|reading| (quantity, reading)))
            .collect()
    }

    /// Current through the meter in A.
    pub fn current(&mut self) -> Result<Reading> {
        self.read(Quantity::Current)
    }

    /// Line voltage in V.
    pub fn voltage(&mut self) -> Result<Reading> {
        self.read(Quantity::Voltage)
    }

    /// Frequency of the voltage signal in Hz.
    pub fn frequency(&mut self) -> Result<Reading> {
        self.read(Quantity::Frequency)
    }

    /// Power factor, unit `pf`.
    pub fn power_factor(&mut self) -> Result<Reading> {
        self.read(Quantity::PowerFactor)
    }

    /// Active power in KW.
    pub fn active_power(&mut self) -> Result<Reading> {
        self.read(Quantity::ActivePower)
    }

    /// Reactive power in KVAr.
    pub fn reactive_power(&mut self) -> Result<Reading> {
        self.read(Quantity::ReactivePower)
    }

    /// Apparent power in KVA.
    pub fn apparent_power(&mut self) -> Result<Reading> {
        self.read(Quantity::ApparentPower)
    }

    /// Active energy counter in KWh.
    pub fn active_energy(&mut self) -> Result<Reading> {
        self.read(Quantity::ActiveEnergy)
    }

    /// Reactive energy counter in KVArh.
    pub fn reactive_energy(&mut self) -> Result<Reading> {
        self.read(Quantity::ReactiveEnergy)
    }

    /// Apparent energy counter in KVAh.
    pub fn apparent_energy(&mut self) -> Result<Reading> {
        self.read(Quantity::ApparentEnergy)
    }

    /// Active power demand in KW.
    pub fn active_power_demand(&mut self) -> Result<Reading> {
        self.read(Quantity::ActivePowerDemand)
    }

    /// Reactive power demand in KVAr.
    pub fn reactive_power_demand(&mut self) -> Result<Reading> {
        self.read(Quantity::ReactivePowerDemand)
    }

    /// Apparent power demand in KVA.
    pub fn apparent_power_demand(&mut self) -> Result<Reading> {
        self.read(Quantity::ApparentPowerDemand)
    }

    /// Reads the serial line configuration stored in the meter.
    ///
    /// Each register is read and retried on its own. An unknown baud rate code
    /// is reported as a baud rate of `0`.
    pub fn serial_config(&mut self) -> Result<SerialConfig> {
        let baud_code = self.read_config_register(proto::BAUD_RATE_REG_ADDR)?;
        let parity = self.read_config_register(proto::PARITY_REG_ADDR)?;
        let stop_bits = self.read_config_register(proto::STOP_BITS_REG_ADDR)?;
        Ok(SerialConfig {
            baud_rate: proto::baud_rate_decode(baud_code),
            parity,
            stop_bits,
        })
    }

    /// Reads the slave address the meter itself is configured with.
    ///
    /// Useful to verify that [`Self::slave_address`] reaches the intended device.
    pub fn address(&mut self) -> Result<u16> {
        self.read_config_register(proto::SLAVE_ADDRESS_REG_ADDR)
    }
}
