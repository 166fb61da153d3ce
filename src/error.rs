//! Our error types for the 8-MOSFET board.

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for 8-MOSFET board communications.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Bus communication error: {0:?}")]
    Bus(I),
    #[error("8-MOSFETS card id {stack} not detected")]
    BoardNotFound { stack: u8 },
    #[error("Write not confirmed by read-back after {attempts} attempts")]
    VerifyFailed { attempts: usize },
    #[error(transparent)]
    Argument(#[from] ArgumentError),
}

/// A value rejected before any bus access took place.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ArgumentError {
    #[error("Invalid stack level {0} [0..7]")]
    StackLevel(u8),
    #[error("Mosfet number {0} out of range [1..8]")]
    Channel(u16),
    #[error("Invalid mosfet value {0} [0..255]")]
    OutputValue(u16),
    #[error("PWM fill factor {0} out of range [0..100]")]
    Duty(f32),
    #[error("Frequency {0} out of range [16..1000]")]
    Frequency(u16),
    #[error("Invalid RS485 baudrate {0} [1200, 921600]")]
    Baud(u32),
    #[error("Invalid RS485 mode {0}: 0 = disable, 1 = Modbus RTU (Slave)")]
    Mode(u8),
    #[error("Invalid RS485 stop bits {0} [1, 2]")]
    StopBits(u8),
    #[error("Invalid RS485 parity {0}: 0 = none; 1 = even; 2 = odd")]
    Parity(u8),
    #[error("Invalid MODBUS device address {0} [1, 255]")]
    SlaveAddress(u8),
}

impl<I: embedded_io::Error> Error<I> {
    /// True for errors raised while validating caller input, before the bus was touched.
    pub fn is_argument_error(&self) -> bool {
        matches!(self, Error::Argument(_))
    }
}
