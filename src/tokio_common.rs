//! Serial line settings for the `tokio-modbus` RTU client.
use std::time::Duration;

/// The number of stop bits used for serial communication.
pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
/// The number of data bits used for serial communication.
pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long the serial port stays open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PortMode {
    /// Open the port for every request and close it afterwards.
    #[default]
    ReopenPerCall,
    /// Keep the port open between requests.
    Persistent,
}

/// Connection parameters of one meter.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    /// The path to the serial port device (e.g., `/dev/ttyUSB0`).
    pub device: String,
    pub baud_rate: u32,
    pub parity: tokio_serial::Parity,
    /// Response timeout applied to every request.
    pub timeout: Duration,
    pub port_mode: PortMode,
}

impl SerialSettings {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            parity: tokio_serial::Parity::None,
            timeout: DEFAULT_TIMEOUT,
            port_mode: PortMode::default(),
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn parity(mut self, parity: tokio_serial::Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn port_mode(mut self, port_mode: PortMode) -> Self {
        self.port_mode = port_mode;
        self
    }

    pub fn serial_port_builder(&self) -> tokio_serial::SerialPortBuilder {
        serial_port_builder(&self.device, self.baud_rate, self.parity)
    }
}

/// Creates a `tokio_serial::SerialPortBuilder` with the specified settings.
///
/// # Arguments
///
/// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
/// * `baud_rate` - The baud rate for the serial communication.
/// * `parity` - The parity configured on the meter.
pub fn serial_port_builder(
    device: &str,
    baud_rate: u32,
    parity: tokio_serial::Parity,
) -> tokio_serial::SerialPortBuilder {
    tokio_serial::new(device, baud_rate)
        .parity(parity)
        .stop_bits(*STOP_BITS)
        .data_bits(*DATA_BITS)
        .flow_control(tokio_serial::FlowControl::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = SerialSettings::new("/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.timeout, Duration::from_secs(1));
        assert_eq!(settings.parity, tokio_serial::Parity::None);
        assert_eq!(settings.port_mode, PortMode::ReopenPerCall);
    }

    #[test]
    fn builder_chain() {
        let settings = SerialSettings::new("COM3")
            .baud_rate(19200)
            .parity(tokio_serial::Parity::Even)
            .timeout(Duration::from_millis(300))
            .port_mode(PortMode::Persistent);
        assert_eq!(settings.device, "COM3");
        assert_eq!(settings.baud_rate, 19200);
        assert_eq!(settings.parity, tokio_serial::Parity::Even);
        assert_eq!(settings.timeout, Duration::from_millis(300));
        assert_eq!(settings.port_mode, PortMode::Persistent);
    }
}
