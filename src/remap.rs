//! Mapping between logical channels and the bits of the output port.
//!
//! The output port is active low: a set bit switches the mosfet off.

use crate::register::{CHANNEL_COUNT, Channel, OutputState};

/// Hardware bit driving each logical channel, indexed by `channel - 1`.
const CHANNEL_REMAP: [u8; CHANNEL_COUNT as usize] = [0, 1, 2, 3, 4, 5, 6, 7];

/// Output port bit mask of `channel`.
pub fn channel_mask(channel: Channel) -> u8 {
    1 << CHANNEL_REMAP[(channel.number() - 1) as usize]
}

/// Convert a logical channel byte (bit 0 = channel 1, set = on) to the output port value.
pub fn logical_to_wire(logical: u8) -> u8 {
    let remapped = Channel::all()
        .filter(|channel| logical & channel.logical_mask() != 0)
        .fold(0u8, |acc, channel| acc | channel_mask(channel));
    0xFF ^ remapped
}

/// Convert an output port value back to the logical channel byte.
pub fn wire_to_logical(wire: u8) -> u8 {
    let active = wire ^ 0xFF;
    Channel::all()
        .filter(|channel| active & channel_mask(*channel) != 0)
        .fold(0u8, |acc, channel| acc | channel.logical_mask())
}

/// State of `channel` within an output port value.
pub fn decode_state(wire: u8, channel: Channel) -> OutputState {
    OutputState::from(wire & channel_mask(channel) == 0)
}

/// Output port value with only the bit of `channel` changed to `state`.
pub fn encode_state(wire: u8, channel: Channel, state: OutputState) -> u8 {
    match state {
        OutputState::On => wire & !channel_mask(channel),
        OutputState::Off => wire | channel_mask(channel),
    }
}
