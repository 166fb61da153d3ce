//! This crate provides an interface for communicating with and controlling the Sequent Microsystems
//! 8-MOSFET expansion board over I2C.
//!
//! Up to 8 boards can be stacked on one bus. Each board is selected by its stack level (0 - 7),
//! which is mapped onto one of two I2C address ranges depending on the board revision.
//!
//! Supported operations:
//! * Switching single channels, or all eight at once, with read-back verification.
//! * PWM fill factor per channel (0.0 - 100.0 %, 0.1 % resolution).
//! * PWM frequency for the whole board (16 - 1000 Hz).
//! * RS485 / Modbus RTU settings of the board.
//!
//! The bus itself is abstracted by [`bus::RegisterBus`], so the device logic can be driven by any
//! transport. On Linux, [`linux::LinuxI2c`] talks to `/dev/i2c-N` directly.
//!
//! Several tools may share the same physical bus. Every command should be run while holding a
//! [`mutex::BusGuard`], which serializes bus access between processes.

pub mod app;
pub mod board;
pub mod bus;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod locator;
pub mod mutex;
pub mod register;
pub mod remap;
pub mod selftest;
pub mod verify;

#[cfg(test)]
mod mock_bus;
