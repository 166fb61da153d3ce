//! Hardware independent encoding of the values stored in the board registers.
//!
//! Everything here is pure: values are validated and turned into the exact byte images written to
//! the registers described in [`crate::register`], and back.

use modular_bitfield::prelude::*;

use crate::error::ArgumentError;

pub const DUTY_MIN: f32 = 0.0;
pub const DUTY_MAX: f32 = 100.0;
pub const FREQUENCY_MIN_HZ: u16 = 16;
pub const FREQUENCY_MAX_HZ: u16 = 1000;
pub const BAUD_MIN: u32 = 1200;
pub const BAUD_MAX: u32 = 921_600;

/// PWM fill factor of one channel, in percent.
///
/// Stored as u16 in tenths of a percent. E.g. 45.5% => `455`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmDuty(f32);

impl PwmDuty {
    /// Any value is accepted, it is clamped into 0.0 - 100.0.
    pub fn clamped(percent: f32) -> Self {
        if percent.is_nan() {
            return Self(DUTY_MIN);
        }
        Self(percent.clamp(DUTY_MIN, DUTY_MAX))
    }

    /// Rejects values outside 0.0 - 100.0 instead of clamping them.
    pub fn new(percent: f32) -> Result<Self, ArgumentError> {
        if (DUTY_MIN..=DUTY_MAX).contains(&percent) {
            Ok(Self(percent))
        } else {
            Err(ArgumentError::Duty(percent))
        }
    }

    pub fn percent(&self) -> f32 {
        self.0
    }

    pub fn to_raw(&self) -> u16 {
        (self.0 * 10.0).round() as u16
    }

    pub fn from_raw(raw: u16) -> Self {
        Self(raw as f32 / 10.0)
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        self.to_raw().to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self::from_raw(u16::from_le_bytes(bytes))
    }
}

/// PWM frequency of the whole board in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmFrequency(u16);

impl PwmFrequency {
    /// Out of range values are rejected, never clamped.
    pub fn new(hz: u16) -> Result<Self, ArgumentError> {
        if (FREQUENCY_MIN_HZ..=FREQUENCY_MAX_HZ).contains(&hz) {
            Ok(Self(hz))
        } else {
            Err(ArgumentError::Frequency(hz))
        }
    }

    pub fn hz(&self) -> u16 {
        self.0
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

/// Frequency register contents. Not validated, the board reports whatever it holds.
pub fn decode_frequency(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// How a Modbus slave address of `0` is treated when writing the RS485 settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlaveAddressPolicy {
    /// Log a warning and write it anyway.
    #[default]
    Lenient,
    /// Reject the settings.
    Strict,
}

/// Bit image of the RS485 settings registers.
#[bitfield(bytes = 5)]
struct SerialLinkRecord {
    baud: B24,
    mode: B4,
    parity: B2,
    stop_bits: B2,
    address: B8,
}

/// RS485 settings of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialLinkConfig {
    /// * `0` - RS485 port disabled.
    /// * `1` - Modbus RTU slave.
    pub mode: u8,
    pub baud: u32,
    /// `1` or `2`.
    pub stop_bits: u8,
    /// * `0` - None.
    /// * `1` - Even.
    /// * `2` - Odd.
    pub parity: u8,
    /// Modbus slave address.
    pub address: u8,
}

impl SerialLinkConfig {
    /// Check every field against the ranges the board accepts.
    pub fn validate(&self, policy: SlaveAddressPolicy) -> Result<(), ArgumentError> {
        if !(BAUD_MIN..=BAUD_MAX).contains(&self.baud) {
            return Err(ArgumentError::Baud(self.baud));
        }
        if self.mode > 1 {
            return Err(ArgumentError::Mode(self.mode));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(ArgumentError::StopBits(self.stop_bits));
        }
        if self.parity > 2 {
            return Err(ArgumentError::Parity(self.parity));
        }
        if self.address < 1 {
            match policy {
                SlaveAddressPolicy::Strict => {
                    return Err(ArgumentError::SlaveAddress(self.address));
                }
                SlaveAddressPolicy::Lenient => {
                    tracing::warn!(
                        "Invalid MODBUS device address {} [1, 255], writing it anyway",
                        self.address
                    );
                }
            }
        }
        Ok(())
    }

    /// Pack into the register image. Call [`Self::validate`] first, fields wider than their slot
    /// would not fit.
    pub fn to_bytes(&self) -> [u8; 5] {
        SerialLinkRecord::new()
            .with_baud(self.baud)
            .with_mode(self.mode)
            .with_parity(self.parity)
            .with_stop_bits(self.stop_bits)
            .with_address(self.address)
            .into_bytes()
    }

    pub fn from_bytes(bytes: [u8; 5]) -> Self {
        let record = SerialLinkRecord::from_bytes(bytes);
        Self {
            mode: record.mode(),
            baud: record.baud(),
            stop_bits: record.stop_bits(),
            parity: record.parity(),
            address: record.address(),
        }
    }
}

impl core::fmt::Display for SerialLinkConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "<mode> <baudrate> <stopbits> <parity> <add> {} {} {} {} {}",
            self.mode, self.baud, self.stop_bits, self.parity, self.address
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_round_trip() {
        for tenths in 0..=1000u16 {
            let percent = tenths as f32 / 10.0;
            let decoded = PwmDuty::from_bytes(PwmDuty::clamped(percent).to_bytes());
            assert!((decoded.percent() - percent).abs() < 0.05, "{percent}");
        }
    }

    #[test]
    fn duty_clamps() {
        assert_eq!(PwmDuty::clamped(-3.0).to_raw(), 0);
        assert_eq!(PwmDuty::clamped(140.0).to_raw(), 1000);
        assert_eq!(PwmDuty::clamped(f32::NAN).to_raw(), 0);
        assert_eq!(PwmDuty::clamped(45.0).to_bytes(), [0xC2, 0x01]);
        // Rounded, not truncated.
        assert_eq!(PwmDuty::clamped(12.36).to_raw(), 124);
    }

    #[test]
    fn strict_duty_rejects() {
        assert!(PwmDuty::new(100.0).is_ok());
        assert_eq!(PwmDuty::new(100.5), Err(ArgumentError::Duty(100.5)));
        assert!(PwmDuty::new(f32::NAN).is_err());
    }

    #[test]
    fn frequency_limits() {
        assert_eq!(PwmFrequency::new(16).map(|f| f.to_bytes()), Ok([16, 0]));
        assert_eq!(decode_frequency(PwmFrequency::new(1000).unwrap().to_bytes()), 1000);
        assert_eq!(PwmFrequency::new(15), Err(ArgumentError::Frequency(15)));
        assert_eq!(PwmFrequency::new(1001), Err(ArgumentError::Frequency(1001)));
    }

    #[test]
    fn serial_record_layout() {
        let config = SerialLinkConfig {
            mode: 1,
            baud: 9600,
            stop_bits: 1,
            parity: 2,
            address: 7,
        };
        // Baud little endian in 24 bits, then mode, parity and stop bits sharing byte 3.
        let bytes = config.to_bytes();
        assert_eq!(bytes, [0x80, 0x25, 0x00, 0x01 | (2 << 4) | (1 << 6), 0x07]);
        assert_eq!(SerialLinkConfig::from_bytes(bytes), config);
    }

    #[test]
    fn serial_validation() {
        let good = SerialLinkConfig {
            mode: 1,
            baud: 921_600,
            stop_bits: 2,
            parity: 0,
            address: 255,
        };
        assert!(good.validate(SlaveAddressPolicy::Strict).is_ok());

        let cases = [
            (SerialLinkConfig { baud: 1199, ..good }, ArgumentError::Baud(1199)),
            (SerialLinkConfig { mode: 2, ..good }, ArgumentError::Mode(2)),
            (SerialLinkConfig { stop_bits: 0, ..good }, ArgumentError::StopBits(0)),
            (SerialLinkConfig { parity: 3, ..good }, ArgumentError::Parity(3)),
        ];
        for (config, expected) in cases {
            assert_eq!(config.validate(SlaveAddressPolicy::Lenient), Err(expected));
        }
    }

    #[test]
    fn slave_address_zero_follows_policy() {
        let config = SerialLinkConfig {
            mode: 1,
            baud: 115_200,
            stop_bits: 1,
            parity: 0,
            address: 0,
        };
        assert!(config.validate(SlaveAddressPolicy::Lenient).is_ok());
        assert_eq!(
            config.validate(SlaveAddressPolicy::Strict),
            Err(ArgumentError::SlaveAddress(0))
        );
    }

    #[test]
    fn serial_display() {
        let config = SerialLinkConfig {
            mode: 1,
            baud: 9600,
            stop_bits: 1,
            parity: 0,
            address: 1,
        };
        assert_eq!(
            config.to_string(),
            "<mode> <baudrate> <stopbits> <parity> <add> 1 9600 1 0 1"
        );
    }
}
