//! Command line of the `mosfet8` tool.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Control the Sequent Microsystems 8-MOSFET expansion board.
#[derive(Parser, Debug)]
#[command(name = "mosfet8", version, about)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// I2C adapter to use, e.g. /dev/i2c-1 (overrides the config file)
    #[arg(long, global = true)]
    pub bus: Option<PathBuf>,

    /// Reject a Modbus slave address of 0
    #[arg(long, global = true)]
    pub strict_address: bool,

    /// More logging on stderr, repeat for more detail
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Stack level of the board, 0 - 7
    pub stack: Option<u8>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List the stack levels of the boards present
    #[command(visible_alias = "list")]
    Discovery,

    /// Switch one mosfet, or write all eight at once as a 0 - 255 value
    ///
    /// Examples: `mosfet8 0 write 2 on`, `mosfet8 0 write 15`
    Write {
        /// Mosfet number 1 - 8, or the value of all mosfets when no state follows
        target: u16,
        /// on/off (also up/down, 1/0)
        state: Option<String>,
    },

    /// Read one mosfet, or all eight as a 0 - 255 value
    Read {
        /// Mosfet number 1 - 8
        channel: Option<u16>,
    },

    /// Set the PWM fill factor of one mosfet, 0 - 100 %
    #[command(name = "pwm-write", visible_alias = "pwmwr")]
    PwmWrite { channel: u16, value: f32 },

    /// Read the PWM fill factor of one mosfet
    #[command(name = "pwm-read", visible_alias = "pwmrd")]
    PwmRead { channel: u16 },

    /// Set the PWM frequency of the board, 16 - 1000 Hz
    #[command(name = "freq-write", visible_alias = "fwr")]
    FreqWrite { frequency: u16 },

    /// Read the PWM frequency of the board
    #[command(name = "freq-read", visible_alias = "frd")]
    FreqRead,

    /// Set the RS485 port: <mode> <baud> <stopBits> <parity> <slaveAddr>
    ///
    /// mode: 0 = disable, 1 = Modbus RTU (Slave); baud 1200 - 921600; stop bits 1 or 2;
    /// parity: 0 = none, 1 = even, 2 = odd; slave address 1 - 255
    #[command(name = "serial-config-write", visible_alias = "cfg485wr")]
    SerialConfigWrite {
        mode: u8,
        baud: u32,
        stop_bits: u8,
        parity: u8,
        address: u8,
    },

    /// Read the RS485 port settings
    #[command(name = "serial-config-read", visible_alias = "cfg485rd")]
    SerialConfigRead,

    /// Production self test, cycling every mosfet until a key is pressed
    #[command(name = "self-test", visible_alias = "test")]
    SelfTest {
        /// Write the result line to this file instead of stdout
        output: Option<PathBuf>,
    },

    /// Display the warranty
    Warranty,
}
