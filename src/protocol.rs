//! Register map and data types of the Selec EM2M power meter.
//!
//! Everything in this module is pure: it describes where a quantity lives on the
//! device and how the raw register words are turned into values. The actual bus
//! access happens in [`crate::transport`] implementations.
//!
//! All register addresses are zero-based, i.e. one less than the register number
//! printed in the device manual.

use std::fmt;
use std::str::FromStr;

/// Errors raised while validating or decoding protocol values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The slave address is outside of `ADDRESS_MIN..=ADDRESS_MAX`.
    #[error("The address value {0} is outside the valid range of {min} to {max}", min = Address::MIN, max = Address::MAX)]
    AddressOutOfRange(u8),

    /// The name does not match any known quantity.
    #[error("Unknown quantity '{0}'")]
    UnknownQuantity(String),
}

/// MODBUS function code "read holding registers".
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
/// MODBUS function code "read input registers".
pub const READ_INPUT_REGISTERS: u8 = 0x04;

/// Number of 16-bit registers occupied by one IEEE-754 single precision value.
pub const FLOAT_QUANTITY: u16 = 2;

pub const SLAVE_ADDRESS_REG_ADDR: u16 = 1;
pub const BAUD_RATE_REG_ADDR: u16 = 10;
pub const PARITY_REG_ADDR: u16 = 11;
pub const STOP_BITS_REG_ADDR: u16 = 12;
/// The configuration block is read one holding register at a time.
pub const CONFIG_FUNCTION_CODE: u8 = READ_HOLDING_REGISTERS;

/// Assembles a float from two registers, high word first.
pub fn decode_float(words: [u16; 2]) -> f32 {
    f32::from_bits((u32::from(words[0]) << 16) | u32::from(words[1]))
}

/// Maps the device's baud rate code to a rate in Hz. Unknown codes yield `0`.
pub fn baud_rate_decode(code: u16) -> u32 {
    match code {
        0 => 9600,
        1 => 19200,
        _ => 0,
    }
}

/// A MODBUS RTU slave address in the range 1 to 247.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct Address(u8);

impl Address {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 247;
}

impl std::ops::Deref for Address {
    type Target = u8;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for Address {
    fn default() -> Self {
        Self(0x01)
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::AddressOutOfRange(value))
        }
    }
}

impl From<Address> for u8 {
    fn from(address: Address) -> u8 {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Engineering unit attached to a [`Reading`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Unit {
    Ampere,
    Volt,
    Hertz,
    PowerFactor,
    Kilowatt,
    KiloVar,
    KiloVoltAmpere,
    KilowattHour,
    KiloVarHour,
    KiloVoltAmpereHour,
}

impl Unit {
    /// The unit symbol as reported by the meter's documentation.
    pub const fn symbol(&self) -> &'static str {
        match self {
            Unit::Ampere => "A",
            Unit::Volt => "V",
            Unit::Hertz => "Hz",
            Unit::PowerFactor => "pf",
            Unit::Kilowatt => "KW",
            Unit::KiloVar => "KVAr",
            Unit::KiloVoltAmpere => "KVA",
            Unit::KilowattHour => "KWh",
            Unit::KiloVarHour => "KVArh",
            Unit::KiloVoltAmpereHour => "KVAh",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Location and decoding of one measured quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    /// Zero-based register address.
    pub address: u16,
    /// Function code used to fetch the value.
    pub function_code: u8,
    pub unit: Unit,
}

/// The measured quantities exposed by the meter. Every one of them is a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Quantity {
    Current,
    Voltage,
    Frequency,
    PowerFactor,
    ActivePower,
    ReactivePower,
    ApparentPower,
    ActiveEnergy,
    ReactiveEnergy,
    ApparentEnergy,
    ActivePowerDemand,
    ReactivePowerDemand,
    ApparentPowerDemand,
}

impl Quantity {
    pub const ALL: [Quantity; 13] = [
        Quantity::Current,
        Quantity::Voltage,
        Quantity::Frequency,
        Quantity::PowerFactor,
        Quantity::ActivePower,
        Quantity::ReactivePower,
        Quantity::ApparentPower,
        Quantity::ActiveEnergy,
        Quantity::ReactiveEnergy,
        Quantity::ApparentEnergy,
        Quantity::ActivePowerDemand,
        Quantity::ReactivePowerDemand,
        Quantity::ApparentPowerDemand,
    ];

    pub const fn register(&self) -> RegisterSpec {
        let (address, unit) = match self {
            Quantity::Current => (23, Unit::Ampere),
            Quantity::Voltage => (21, Unit::Volt),
            Quantity::Frequency => (27, Unit::Hertz),
            Quantity::PowerFactor => (25, Unit::PowerFactor),
            Quantity::ActivePower => (15, Unit::Kilowatt),
            Quantity::ReactivePower => (17, Unit::KiloVar),
            Quantity::ApparentPower => (19, Unit::KiloVoltAmpere),
            Quantity::ActiveEnergy => (1, Unit::KilowattHour),
            Quantity::ReactiveEnergy => (7, Unit::KiloVarHour),
            Quantity::ApparentEnergy => (13, Unit::KiloVoltAmpereHour),
            Quantity::ActivePowerDemand => (29, Unit::Kilowatt),
            Quantity::ReactivePowerDemand => (31, Unit::KiloVar),
            Quantity::ApparentPowerDemand => (33, Unit::KiloVoltAmpere),
        };
        RegisterSpec {
            address,
            function_code: READ_INPUT_REGISTERS,
            unit,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Quantity::Current => "current",
            Quantity::Voltage => "voltage",
            Quantity::Frequency => "frequency",
            Quantity::PowerFactor => "power_factor",
            Quantity::ActivePower => "active_power",
            Quantity::ReactivePower => "reactive_power",
            Quantity::ApparentPower => "apparent_power",
            Quantity::ActiveEnergy => "active_energy",
            Quantity::ReactiveEnergy => "reactive_energy",
            Quantity::ApparentEnergy => "apparent_energy",
            Quantity::ActivePowerDemand => "active_power_demand",
            Quantity::ReactivePowerDemand => "reactive_power_demand",
            Quantity::ApparentPowerDemand => "apparent_power_demand",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Quantity {
    type Err = Error;

    /// Accepts the snake_case name, dashes are treated as underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Quantity::ALL
            .into_iter()
            .find(|quantity| quantity.name() == normalized)
            .ok_or_else(|| Error::UnknownQuantity(s.to_string()))
    }
}

/// A decoded value together with its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Reading {
    pub value: f32,
    pub unit: Unit,
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Serial line configuration stored in the meter.
///
/// Parity and stop bits are the raw device codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SerialConfig {
    /// Baud rate in Hz, `0` if the device reported an unknown code.
    pub baud_rate: u32,
    pub parity: u16,
    pub stop_bits: u16,
}

impl SerialConfig {
    pub fn as_tuple(&self) -> (u32, u16, u16) {
        (self.baud_rate, self.parity, self.stop_bits)
    }
}

impl fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "baud rate {}, parity code {}, stop bits code {}",
            self.baud_rate, self.parity, self.stop_bits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashSet;

    #[test]
    fn register_table() {
        let expected = [
            (Quantity::Current, 23, "A"),
            (Quantity::Voltage, 21, "V"),
            (Quantity::Frequency, 27, "Hz"),
            (Quantity::PowerFactor, 25, "pf"),
            (Quantity::ActivePower, 15, "KW"),
            (Quantity::ReactivePower, 17, "KVAr"),
            (Quantity::ApparentPower, 19, "KVA"),
            (Quantity::ActiveEnergy, 1, "KWh"),
            (Quantity::ReactiveEnergy, 7, "KVArh"),
            (Quantity::ApparentEnergy, 13, "KVAh"),
            (Quantity::ActivePowerDemand, 29, "KW"),
            (Quantity::ReactivePowerDemand, 31, "KVAr"),
            (Quantity::ApparentPowerDemand, 33, "KVA"),
        ];
        for (quantity, address, unit) in expected {
            let spec = quantity.register();
            assert_eq!(spec.address, address, "{quantity}");
            assert_eq!(spec.function_code, 4, "{quantity}");
            assert_eq!(spec.unit.symbol(), unit, "{quantity}");
        }
    }

    #[test]
    fn register_addresses_are_unique() {
        let addresses: HashSet<u16> = Quantity::ALL
            .iter()
            .map(|quantity| quantity.register().address)
            .collect();
        assert_eq!(addresses.len(), Quantity::ALL.len());
    }

    #[test]
    fn quantity_names() {
        for quantity in Quantity::ALL {
            assert_eq!(quantity.name().parse::<Quantity>(), Ok(quantity));
        }
        assert_eq!("Active-Power".parse::<Quantity>(), Ok(Quantity::ActivePower));
        assert_matches!("wattage".parse::<Quantity>(), Err(Error::UnknownQuantity(..)));
    }

    #[test]
    fn baud_rate_codes() {
        assert_eq!(baud_rate_decode(0), 9600);
        assert_eq!(baud_rate_decode(1), 19200);
        assert_eq!(baud_rate_decode(2), 0);
        assert_eq!(baud_rate_decode(5), 0);
        assert_eq!(baud_rate_decode(u16::MAX), 0);
    }

    #[test]
    fn float_words() {
        assert_eq!(decode_float([0x4366, 0x8000]), 230.5);
        assert_eq!(decode_float([0x4248, 0x0000]), 50.0);
        assert_eq!(decode_float([0xBF80, 0x0000]), -1.0);
        assert_eq!(decode_float([0, 0]), 0.0);
    }

    #[test]
    fn address_range() {
        assert_matches!(Address::try_from(0), Err(Error::AddressOutOfRange(0)));
        assert_matches!(Address::try_from(1), Ok(a) if *a == 1);
        assert_matches!(Address::try_from(247), Ok(a) if *a == 247);
        assert_matches!(Address::try_from(248), Err(Error::AddressOutOfRange(248)));
        assert_eq!(*Address::default(), 1);
    }

    #[test]
    fn display() {
        let reading = Reading {
            value: 230.5,
            unit: Unit::Volt,
        };
        assert_eq!(reading.to_string(), "230.5 V");
        assert_eq!(Address::try_from(10).unwrap().to_string(), "0x0a");
    }
}
