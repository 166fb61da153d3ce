//! This module is used to define the registers on the 8-MOSFET board.
//!
//! The low four registers belong to the I/O expander which drives the mosfets. The remaining ones
//! are served by the on board processor of the PWM capable revisions.

use strum_macros::EnumIter;

/// Number of output channels on one board.
pub const CHANNEL_COUNT: u8 = 8;

/// Width of one PWM fill factor register.
pub const PWM_SIZE_B: u8 = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum MosfetRegister {
    /// __R__ - Input port of the expander.
    InPort = 0x00,
    /// __R/W__ - Output port. One bit per channel, a cleared bit switches the channel on.
    OutPort = 0x01,
    /// __R/W__ - Polarity inversion of the input port.
    PolInv = 0x02,
    /// __R/W__ - Line direction. `0` bits are outputs.
    ///
    /// Any other value than `0x00` means the board has not been initialized since power up.
    Config = 0x03,
    /// __R/W__ - Fill factor of channel 1, u16 in tenths of a percent.
    ///
    /// Channels 2 - 8 follow, [`PWM_SIZE_B`] bytes apart.
    Pwm1 = 0x07,
    /// __R/W__ - Packed RS485 settings, see [`SerialLinkConfig`](crate::codec::SerialLinkConfig).
    ModbusSettings = 0x17,
    /// __R/W__ - PWM frequency in Hz, shared by all channels.
    PwmFrequency = 0x1C,
}

impl From<MosfetRegister> for u8 {
    fn from(value: MosfetRegister) -> Self {
        value as u8
    }
}

/// Describes where a value lives in the register map and how many bytes it spans.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegisterLayout {
    pub name: &'static str,
    pub offset: u8,
    pub width: u8,
}

impl RegisterLayout {
    pub const fn new(name: &'static str, register: MosfetRegister, width: u8) -> Self {
        Self {
            name,
            offset: register as u8,
            width,
        }
    }

    /// Byte range covered by this value, relative to register 0.
    pub fn span(&self) -> core::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.width as usize
    }
}

pub const OUTPUT_LAYOUT: RegisterLayout = RegisterLayout::new("output", MosfetRegister::OutPort, 1);
pub const CONFIG_LAYOUT: RegisterLayout = RegisterLayout::new("config", MosfetRegister::Config, 1);
pub const FREQUENCY_LAYOUT: RegisterLayout =
    RegisterLayout::new("pwm frequency", MosfetRegister::PwmFrequency, 2);
pub const SERIAL_LAYOUT: RegisterLayout =
    RegisterLayout::new("rs485 settings", MosfetRegister::ModbusSettings, 5);

/// The PWM fill factor register of one channel.
pub fn pwm_layout(channel: Channel) -> RegisterLayout {
    RegisterLayout {
        name: "pwm fill factor",
        offset: MosfetRegister::Pwm1 as u8 + PWM_SIZE_B * (channel.number() - 1),
        width: PWM_SIZE_B,
    }
}

/// Used to be less ambiguous about whether a mosfet is on or off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumIter)]
pub enum OutputState {
    /// Mosfet open.
    #[default]
    Off,
    /// Mosfet conducting.
    On,
}

impl From<OutputState> for bool {
    fn from(value: OutputState) -> Self {
        match value {
            OutputState::Off => false,
            OutputState::On => true,
        }
    }
}

impl From<bool> for OutputState {
    fn from(value: bool) -> Self {
        match value {
            true => OutputState::On,
            false => OutputState::Off,
        }
    }
}

impl core::str::FromStr for OutputState {
    type Err = ();

    /// Accepts `on`/`up`/`1` and `off`/`down`/`0`, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" | "up" | "1" => Ok(OutputState::On),
            "off" | "down" | "0" => Ok(OutputState::Off),
            _ => Err(()),
        }
    }
}

/// A logical channel number, always within 1 - 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    /// Returns `None` when `number` is not a channel of the board.
    pub const fn new(number: u8) -> Option<Self> {
        if number >= 1 && number <= CHANNEL_COUNT {
            Some(Self(number))
        } else {
            None
        }
    }

    pub const fn number(&self) -> u8 {
        self.0
    }

    /// Bit of this channel in a logical channel byte, bit 0 being channel 1.
    ///
    /// Not the output port bit, see [`crate::remap::channel_mask`] for that one.
    pub const fn logical_mask(&self) -> u8 {
        1 << (self.0 - 1)
    }

    /// All channels in ascending order.
    pub fn all() -> impl Iterator<Item = Channel> {
        (1..=CHANNEL_COUNT).map(Channel)
    }
}

impl TryFrom<u8> for Channel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Channel::new(value).ok_or(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn channel_bounds() {
        assert!(Channel::new(0).is_none());
        assert!(Channel::new(9).is_none());
        assert_eq!(Channel::all().count(), CHANNEL_COUNT as usize);
        assert_eq!(Channel::try_from(5).map(|c| c.number()), Ok(5));
    }

    #[test]
    fn pwm_registers_do_not_overlap_settings() {
        let last = pwm_layout(Channel::new(8).unwrap());
        assert_eq!(last.offset, 0x15);
        assert_eq!(last.span().end, SERIAL_LAYOUT.offset as usize);
        assert!(SERIAL_LAYOUT.span().end <= FREQUENCY_LAYOUT.offset as usize);
    }

    #[test]
    fn register_addresses_are_unique() {
        // Every register should have its own address.
        for a in MosfetRegister::iter() {
            let same = MosfetRegister::iter().filter(|b| u8::from(*b) == u8::from(a)).count();
            assert_eq!(same, 1);
        }
    }

    #[test]
    fn output_state_parsing() {
        for state in OutputState::iter() {
            let as_bool: bool = state.into();
            assert_eq!(OutputState::from(as_bool), state);
        }
        assert_eq!("ON".parse(), Ok(OutputState::On));
        assert_eq!("down".parse(), Ok(OutputState::Off));
        assert_eq!("1".parse(), Ok(OutputState::On));
        assert_eq!("maybe".parse::<OutputState>(), Err(()));
    }
}
