use crate::{
    bus::RegisterBus,
    codec::{PwmDuty, PwmFrequency, SerialLinkConfig, SlaveAddressPolicy, decode_frequency},
    error::{ArgumentError, Error, Result},
    locator::{self, LocatedBoard},
    register::{
        Channel, FREQUENCY_LAYOUT, OUTPUT_LAYOUT, OutputState, RegisterLayout, SERIAL_LAYOUT,
        pwm_layout,
    },
    remap,
    verify::{RETRY_TIMES, write_verify},
};

/// You can create a Mosfet8 using any bus which implements [`RegisterBus`].
///
/// For its methods, we use the nomenclature that "set" writes a value once and "get" reads it
/// back. The `write_*` methods repeat a set until a get confirms it.
pub struct Mosfet8<B: RegisterBus> {
    bus: B,
    board: LocatedBoard,
    retry_attempts: usize,
}

impl<B: RegisterBus> Mosfet8<B> {
    /// Locate the board at `stack` level on `bus`, initializing it when needed.
    pub fn open(mut bus: B, stack: u8) -> Result<Self, B::Error> {
        let board = locator::locate(&mut bus, stack)?;
        Ok(Self {
            bus,
            board,
            retry_attempts: RETRY_TIMES,
        })
    }

    /// Number of attempts used by the `write_*` methods.
    pub fn with_retry_attempts(mut self, attempts: usize) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    pub fn retry_attempts(&self) -> usize {
        self.retry_attempts
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Give the bus back.
    pub fn release(self) -> B {
        self.bus
    }

    /// Get the state of one channel.
    pub fn get_channel(&mut self, channel: Channel) -> Result<OutputState, B::Error> {
        let [wire] = self.read_layout::<1>(OUTPUT_LAYOUT)?;
        Ok(remap::decode_state(wire, channel))
    }

    /// Switch one channel, leaving the others as they are.
    pub fn set_channel(&mut self, channel: Channel, state: OutputState) -> Result<(), B::Error> {
        let [wire] = self.read_layout::<1>(OUTPUT_LAYOUT)?;
        let wire = remap::encode_state(wire, channel, state);
        self.write_layout(OUTPUT_LAYOUT, &[wire])
    }

    /// Switch one channel and confirm it by reading it back.
    pub fn write_channel(&mut self, channel: Channel, state: OutputState) -> Result<usize, B::Error> {
        let attempts = self.retry_attempts;
        write_verify(
            self,
            attempts,
            |board| board.set_channel(channel, state),
            |board| board.get_channel(channel),
            |read| *read == state,
        )
        .into_result()
    }

    /// Get the state of all channels, bit 0 being channel 1. A set bit is an active channel.
    pub fn get_outputs(&mut self) -> Result<u8, B::Error> {
        let [wire] = self.read_layout::<1>(OUTPUT_LAYOUT)?;
        Ok(remap::wire_to_logical(wire))
    }

    /// Set all channels at once, bit 0 being channel 1.
    pub fn set_outputs(&mut self, value: u8) -> Result<(), B::Error> {
        self.write_layout(OUTPUT_LAYOUT, &[remap::logical_to_wire(value)])
    }

    /// Set all channels at once and confirm by reading them back.
    pub fn write_outputs(&mut self, value: u8) -> Result<usize, B::Error> {
        let attempts = self.retry_attempts;
        write_verify(
            self,
            attempts,
            |board| board.set_outputs(value),
            |board| board.get_outputs(),
            |read| *read == value,
        )
        .into_result()
    }

    /// Get the PWM fill factor of one channel.
    pub fn get_pwm(&mut self, channel: Channel) -> Result<PwmDuty, B::Error> {
        let bytes = self.read_layout::<2>(pwm_layout(channel))?;
        Ok(PwmDuty::from_bytes(bytes))
    }

    /// Set the PWM fill factor of one channel.
    pub fn set_pwm(&mut self, channel: Channel, duty: PwmDuty) -> Result<(), B::Error> {
        self.write_layout(pwm_layout(channel), &duty.to_bytes())
    }

    /// Set the PWM fill factor of one channel and confirm by reading it back.
    ///
    /// Compared on the raw register value, so a read-back of `45.0` confirms a write of `45.04`.
    pub fn write_pwm(&mut self, channel: Channel, duty: PwmDuty) -> Result<usize, B::Error> {
        let attempts = self.retry_attempts;
        let expected = duty.to_raw();
        write_verify(
            self,
            attempts,
            |board| board.set_pwm(channel, duty),
            |board| board.get_pwm(channel),
            |read| read.to_raw() == expected,
        )
        .into_result()
    }

    /// Get the PWM frequency of the board in Hz.
    pub fn get_frequency(&mut self) -> Result<u16, B::Error> {
        let bytes = self.read_layout::<2>(FREQUENCY_LAYOUT)?;
        Ok(decode_frequency(bytes))
    }

    /// Set the PWM frequency shared by all channels.
    pub fn set_frequency(&mut self, frequency: PwmFrequency) -> Result<(), B::Error> {
        self.write_layout(FREQUENCY_LAYOUT, &frequency.to_bytes())
    }

    /// Read the RS485 settings.
    pub fn get_serial_config(&mut self) -> Result<SerialLinkConfig, B::Error> {
        let bytes = self.read_layout::<5>(SERIAL_LAYOUT)?;
        Ok(SerialLinkConfig::from_bytes(bytes))
    }

    /// Validate and write the RS485 settings in a single transaction.
    ///
    /// Appears to only be applied by the board after a power cycle.
    pub fn set_serial_config(
        &mut self,
        config: SerialLinkConfig,
        policy: SlaveAddressPolicy,
    ) -> Result<(), B::Error> {
        config.validate(policy)?;
        self.write_layout(SERIAL_LAYOUT, &config.to_bytes())
    }

    fn read_layout<const N: usize>(&mut self, layout: RegisterLayout) -> Result<[u8; N], B::Error> {
        debug_assert_eq!(layout.width as usize, N);
        let mut buf = [0u8; N];
        self.bus
            .read_registers(self.board.address, layout.offset, &mut buf)
            .map_err(Error::Bus)?;
        tracing::trace!(address = self.board.address, register = layout.name, "read {:02x?}", buf);
        Ok(buf)
    }

    fn write_layout(&mut self, layout: RegisterLayout, data: &[u8]) -> Result<(), B::Error> {
        debug_assert_eq!(layout.width as usize, data.len());
        tracing::trace!(address = self.board.address, register = layout.name, "write {:02x?}", data);
        self.bus
            .write_registers(self.board.address, layout.offset, data)
            .map_err(Error::Bus)
    }
}

/// Turn a user supplied channel number into a [`Channel`].
pub fn channel<I: embedded_io::Error>(number: u16) -> Result<Channel, I> {
    u8::try_from(number)
        .ok()
        .and_then(Channel::new)
        .ok_or(Error::Argument(ArgumentError::Channel(number)))
}
