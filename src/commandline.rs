use crate::config::{Parity, PollConfig};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use em2m_lib::protocol as proto;
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

fn parse_address(s: &str) -> Result<proto::Address, String> {
    let address_val =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid address format: {e}"))?;
    proto::Address::try_from(address_val).map_err(|e| e.to_string())
}

fn parse_quantity(s: &str) -> Result<proto::Quantity, String> {
    s.parse::<proto::Quantity>().map_err(|e| {
        let known: Vec<&str> = proto::Quantity::ALL.iter().map(|q| q.name()).collect();
        format!("{e}, expected one of: {}", known.join(", "))
    })
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliConnection {
    /// Talk to a single meter via Modbus RTU (Serial).
    Rtu {
        /// Serial port device name.
        /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
        #[arg(short, long, default_value_t = default_device_name(), verbatim_doc_comment)]
        device: String,

        /// Baud rate for serial communication.
        /// Must match the meter's configured baud rate (9600 or 19200).
        #[arg(long, default_value_t = 9600, verbatim_doc_comment)]
        baud_rate: u32,

        /// Parity of the serial line: none, even or odd.
        #[arg(long, default_value_t = Parity::default())]
        parity: Parity,

        /// The Modbus RTU slave address of the meter, ranging from 1 to 247.
        /// Can be specified in decimal or hexadecimal (e.g., "0x01").
        #[arg(short, long, default_value_t = proto::Address::default(), value_parser = parse_address, verbatim_doc_comment)]
        address: proto::Address,

        /// Keep the serial port open between requests instead of reopening it for each one.
        #[arg(long)]
        persistent: bool,

        /// Label used for this meter in the output.
        #[arg(short, long, default_value = "em2m")]
        name: String,

        /// Meter commands.
        #[command(subcommand)]
        command: CliCommands,
    },
    /// Poll several meters on one RS485 bus as described by a YAML configuration file.
    /// The meters are read strictly one after another.
    #[clap(verbatim_doc_comment)]
    Poll {
        /// The configuration file listing the bus settings and meters.
        #[arg(long, default_value_t = PollConfig::DEFAULT_CONFIG_FILE.to_string())]
        config_file: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Run in daemon mode: continuously read all quantities at a specified interval
    /// and print them to the standard output.
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Interval for fetching readings (e.g., "10s", "1m")
        #[arg(value_parser = humantime::parse_duration, short, long, default_value = "10sec")]
        poll_interval: Duration,
    },

    /// Read and display one or more quantities, e.g. "voltage current active-energy".
    Read {
        #[arg(required = true, value_parser = parse_quantity)]
        quantities: Vec<proto::Quantity>,
    },

    /// Read and display every quantity the meter provides.
    ReadAll,

    /// Read and display the serial configuration stored in the meter.
    SerialConfig,

    /// Query the slave address the meter reports for itself.
    QueryAddress,
}

const fn about_text() -> &'static str {
    "Selec EM2M power meter CLI - Read electrical measurements via Modbus RTU."
}

#[derive(Parser, Debug)]
#[command(name = "em2m", author, version, about = about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warn.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// Specifies the connection method and meter commands.
    #[command(subcommand)]
    pub connection: CliConnection,

    /// Modbus response timeout for each request.
    /// Examples: "1s", "500ms".
    #[arg(global = true, long, default_value = "1s", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Duration,

    /// Pause before every request so the RS485 converter can switch
    /// between transmitting (TX) and receiving (RX).
    /// Examples: "50ms", "100ms".
    #[arg(global = true, long, default_value = "50ms", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub delay: Duration,

    /// Pause after a timeout or I/O error before the next attempt.
    #[arg(global = true, long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub cooldown: Duration,

    /// Number of attempts allowed for a failing register read.
    /// 0 and 1 both mean a single attempt.
    #[arg(global = true, long, default_value_t = 0, verbatim_doc_comment)]
    pub retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rtu_read() {
        let args = CliArgs::try_parse_from([
            "em2m",
            "--retries",
            "3",
            "rtu",
            "--address",
            "0x0a",
            "read",
            "voltage",
            "active-energy",
        ])
        .unwrap();
        assert_eq!(args.retries, 3);
        assert_eq!(args.delay, Duration::from_millis(50));
        match args.connection {
            CliConnection::Rtu {
                address,
                baud_rate,
                command,
                ..
            } => {
                assert_eq!(*address, 10);
                assert_eq!(baud_rate, 9600);
                assert_eq!(
                    command,
                    CliCommands::Read {
                        quantities: vec![proto::Quantity::Voltage, proto::Quantity::ActiveEnergy]
                    }
                );
            }
            other => panic!("unexpected connection {other:?}"),
        }
    }

    #[test]
    fn reject_invalid_arguments() {
        assert!(CliArgs::try_parse_from(["em2m", "rtu", "--address", "0", "read-all"]).is_err());
        assert!(CliArgs::try_parse_from(["em2m", "rtu", "read", "wattage"]).is_err());
        assert!(CliArgs::try_parse_from(["em2m", "rtu", "read"]).is_err());
    }
}
