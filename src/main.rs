//! Selec EM2M Power Meter CLI
//!
//! A command-line interface (CLI) application for reading Selec EM2M power
//! meters over Modbus RTU (serial).
//!
//! This tool allows users to:
//! - Read single quantities (voltage, current, power, energy, ...) or all of them.
//! - Read the serial configuration stored in the meter.
//! - Query the slave address the meter reports for itself.
//! - Run in a continuous daemon mode printing readings to the console.
//! - Poll several meters sharing one RS485 bus from a YAML configuration file.
//!
//! The CLI leverages the `em2m_lib` crate for the register map and client operations.

use anyhow::{Context, Result};
use clap::Parser;
use em2m_lib::{
    protocol as proto,
    retry::RetryPolicy,
    tokio_common::{PortMode, SerialSettings},
    tokio_sync_client::EM2M,
};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::path::Path;
use std::{panic, time::Duration};

mod commandline;
mod config;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

/// Calculates the minimum recommended delay for Modbus RTU based on baud rate.
/// This is 3.5 character times of 11 bits each.
fn minimum_rtu_delay(baud_rate: u32) -> Duration {
    const PRACTICAL_MIN_INTER_FRAME_DELAY_MICROS: u64 = 1_750;
    if baud_rate == 0 {
        return Duration::from_millis(16);
    }
    let bits_per_char = 11.0;
    let char_time_secs = bits_per_char / baud_rate as f64;
    let delay_micros = (3.5 * char_time_secs * 1_000_000.0) as u64;
    Duration::from_micros(delay_micros.max(PRACTICAL_MIN_INTER_FRAME_DELAY_MICROS))
}

/// Checks if the user-provided settle delay is sufficient; if not, uses the calculated minimum.
fn check_rtu_delay(user_delay: Duration, baud_rate: u32) -> Duration {
    let min_rtu_delay = minimum_rtu_delay(baud_rate);
    if user_delay < min_rtu_delay {
        warn!(
            "User-defined RTU delay of {user_delay:?} is below the recommended minimum of {min_rtu_delay:?} for {baud_rate} baud. Using minimum."
        );
        min_rtu_delay
    } else {
        user_delay
    }
}

fn port_mode(persistent: bool) -> PortMode {
    if persistent {
        PortMode::Persistent
    } else {
        PortMode::ReopenPerCall
    }
}

fn print_quantities(meter: &mut EM2M, quantities: &[proto::Quantity]) -> Result<()> {
    for quantity in quantities {
        let reading = meter
            .read(*quantity)
            .with_context(|| format!("Cannot read {quantity} of meter '{}'", meter.name()))?;
        println!("{} {quantity}: {reading}", meter.name());
    }
    Ok(())
}

fn print_serial_config(meter: &mut EM2M) -> Result<()> {
    let config = meter
        .serial_config()
        .with_context(|| "Cannot read serial configuration")?;
    if config.baud_rate == 0 {
        warn!("The meter reported an unknown baud rate code");
    }
    println!("Serial configuration: {config}");
    Ok(())
}

fn query_address(meter: &mut EM2M) -> Result<()> {
    let address = meter
        .address()
        .with_context(|| "Cannot read RS485 address")?;
    if address != u16::from(*meter.slave_address()) {
        warn!(
            "Meter answered on address {} but reports address {address}",
            meter.slave_address()
        );
    }
    println!("RS485 address: {address}");
    Ok(())
}

/// Reads every configured meter once per interval, one meter at a time.
fn run_poll(config_file: &str, args: &commandline::CliArgs) -> Result<()> {
    let config = config::PollConfig::load(Path::new(config_file))?;
    let settle_delay = check_rtu_delay(config.settle_delay.unwrap_or(args.delay), config.baud_rate);
    let policy = RetryPolicy {
        retries: config.retries.unwrap_or(args.retries),
        settle_delay,
        cooldown: config.cooldown.unwrap_or(args.cooldown),
    };
    let settings = SerialSettings::new(config.device.as_str())
        .baud_rate(config.baud_rate)
        .parity(config.parity.into())
        .timeout(config.timeout.unwrap_or(args.timeout))
        .port_mode(port_mode(config.persistent));

    let mut meters: Vec<(EM2M, Vec<proto::Quantity>)> = config
        .meters
        .iter()
        .map(|meter| {
            let mut client = EM2M::with_settings(&meter.name, meter.address, settings.clone());
            client.set_retry_policy(policy);
            (client, meter.quantities.clone())
        })
        .collect();

    info!(
        "Polling {} meter(s) on {} every {:?}",
        meters.len(),
        config.device,
        config.poll_interval
    );
    loop {
        for (meter, quantities) in meters.iter_mut() {
            if let Err(error) = print_quantities(meter, quantities) {
                error!("{error:#}");
            }
        }
        std::thread::sleep(config.poll_interval);
    }
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "EM2M CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    let (mut meter, command) = match &args.connection {
        commandline::CliConnection::Poll { config_file } => {
            return run_poll(config_file, &args);
        }
        commandline::CliConnection::Rtu {
            device,
            baud_rate,
            parity,
            address,
            persistent,
            name,
            command,
        } => {
            info!("Using RTU device {device} (Address: {address}, Baud: {baud_rate})");
            let settings = SerialSettings::new(device.as_str())
                .baud_rate(*baud_rate)
                .parity((*parity).into())
                .timeout(args.timeout)
                .port_mode(port_mode(*persistent));
            let mut meter = EM2M::with_settings(name, *address, settings);
            meter.set_retry_policy(RetryPolicy {
                retries: args.retries,
                settle_delay: check_rtu_delay(args.delay, *baud_rate),
                cooldown: args.cooldown,
            });
            (meter, command)
        }
    };

    match command {
        commandline::CliCommands::Daemon { poll_interval } => {
            info!("Starting daemon mode: interval={poll_interval:?}");
            loop {
                debug!("Daemon: Reading all quantities...");
                print_quantities(&mut meter, &proto::Quantity::ALL)?;
                std::thread::sleep(*poll_interval);
            }
        }
        commandline::CliCommands::Read { quantities } => {
            info!("Executing: Read {quantities:?}");
            print_quantities(&mut meter, quantities)?;
        }
        commandline::CliCommands::ReadAll => {
            info!("Executing: Read All Quantities");
            print_quantities(&mut meter, &proto::Quantity::ALL)?;
        }
        commandline::CliCommands::SerialConfig => {
            info!("Executing: Read Serial Configuration");
            print_serial_config(&mut meter)?;
        }
        commandline::CliCommands::QueryAddress => {
            info!("Executing: Query Device Address");
            query_address(&mut meter)?;
        }
    }

    Ok(())
}
