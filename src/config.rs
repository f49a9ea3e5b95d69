use anyhow::{bail, Context, Result};
use em2m_lib::protocol as proto;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Serial line parity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        }
    }
}

impl FromStr for Parity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "even" | "e" => Ok(Parity::Even),
            "odd" | "o" => Ok(Parity::Odd),
            _ => Err(format!("Invalid parity '{s}', expected none, even or odd")),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parity::None => "none",
            Parity::Even => "even",
            Parity::Odd => "odd",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    pub name: String,
    pub address: proto::Address,
    /// Quantities to read, all of them when omitted.
    #[serde(default = "default_quantities")]
    pub quantities: Vec<proto::Quantity>,
}

fn default_quantities() -> Vec<proto::Quantity> {
    proto::Quantity::ALL.to_vec()
}

/// Bus settings and meters for the `poll` command.
///
/// Optional timing values fall back to the command line arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    pub settle_delay: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub cooldown: Option<Duration>,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default)]
    pub persistent: bool,
    pub meters: Vec<MeterConfig>,
}

fn default_device() -> String {
    String::from("/dev/ttyUSB0")
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

impl PollConfig {
    pub const DEFAULT_CONFIG_FILE: &'static str = "em2m.yml";

    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("Loading config file from {path:?}");
        let file = File::open(path).with_context(|| format!("Cannot open config file {path:?}"))?;
        let config: PollConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("Cannot parse config file {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.meters.is_empty() {
            bail!("No meters configured");
        }
        let mut addresses = HashSet::new();
        for meter in &self.meters {
            if !addresses.insert(*meter.address) {
                bail!(
                    "Meter '{}' uses address {} which is already taken on this bus",
                    meter.name,
                    meter.address
                );
            }
            if meter.quantities.is_empty() {
                bail!("Meter '{}' has no quantities to read", meter.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
device: /dev/ttyAMA0
baud_rate: 19200
parity: even
timeout: 500ms
retries: 3
cooldown: 2s
poll_interval: 1m
persistent: true
meters:
  - name: mains
    address: 1
    quantities: [voltage, current, active_energy]
  - name: heat-pump
    address: 2
"#;

    #[test]
    fn parse_full_config() {
        let config: PollConfig = serde_yaml::from_str(FULL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.device, "/dev/ttyAMA0");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.timeout, Some(Duration::from_millis(500)));
        assert_eq!(config.retries, Some(3));
        assert_eq!(config.settle_delay, None);
        assert_eq!(config.cooldown, Some(Duration::from_secs(2)));
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert!(config.persistent);
        assert_eq!(config.meters.len(), 2);
        assert_eq!(
            config.meters[0].quantities,
            vec![
                proto::Quantity::Voltage,
                proto::Quantity::Current,
                proto::Quantity::ActiveEnergy
            ]
        );
        assert_eq!(config.meters[1].quantities.len(), proto::Quantity::ALL.len());
    }

    #[test]
    fn defaults() {
        let config: PollConfig =
            serde_yaml::from_str("meters:\n  - name: a\n    address: 5\n").unwrap();
        assert_eq!(config.device, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.timeout, None);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert!(!config.persistent);
    }

    #[test]
    fn invalid_configs() {
        assert!(serde_yaml::from_str::<PollConfig>("meters:\n  - name: a\n    address: 0\n").is_err());
        assert!(
            serde_yaml::from_str::<PollConfig>("meters:\n  - name: a\n    address: 1\n    quantities: [wattage]\n")
                .is_err()
        );

        let duplicate: PollConfig = serde_yaml::from_str(
            "meters:\n  - name: a\n    address: 1\n  - name: b\n    address: 1\n",
        )
        .unwrap();
        assert!(duplicate.validate().is_err());

        let empty: PollConfig = serde_yaml::from_str("meters: []\n").unwrap();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn parity_names() {
        assert_eq!("Even".parse::<Parity>(), Ok(Parity::Even));
        assert_eq!("n".parse::<Parity>(), Ok(Parity::None));
        assert!("mark".parse::<Parity>().is_err());
        assert_eq!(Parity::Odd.to_string(), "odd");
        assert_eq!(tokio_serial::Parity::from(Parity::Odd), tokio_serial::Parity::Odd);
    }
}
