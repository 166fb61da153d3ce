//! We use this mocking module in unit tests to emulate the I2C bus and the boards on it.

use std::collections::BTreeMap;

use crate::bus::RegisterBus;

/// One write transaction seen by the mock bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub address: u8,
    pub register: u8,
    pub data: heapless::Vec<u8, 8>,
}

/// Our mock type used to emulate a bus with any number of boards attached.
pub struct MockBus {
    /// Register memory of every device which acknowledges its address.
    devices: BTreeMap<u8, [u8; 256]>,
    /// Every write issued, whether or not the device latched it.
    writes: Vec<Transaction>,
    /// Number of upcoming writes the devices will silently ignore.
    dropped_writes: usize,
    /// Flag to simulate a device which never latches anything
    never_latch: bool,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBusError {
    /// No device acknowledged the address.
    Nack,
    /// Generic simulated error for testing
    SimulatedError,
}

impl core::fmt::Display for MockBusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl core::error::Error for MockBusError {}

impl embedded_io::Error for MockBusError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockBusError::Nack => embedded_io::ErrorKind::NotConnected,
            MockBusError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockBus {
    type Error = MockBusError;
}

impl RegisterBus for MockBus {
    fn read_registers(
        &mut self,
        address: u8,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), Self::Error> {
        if self.should_error_on_read {
            return Err(MockBusError::SimulatedError);
        }
        let memory = self.devices.get(&address).ok_or(MockBusError::Nack)?;
        let start = register as usize;
        buf.copy_from_slice(&memory[start..start + buf.len()]);
        Ok(())
    }

    fn write_registers(
        &mut self,
        address: u8,
        register: u8,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockBusError::SimulatedError);
        }
        let memory = self.devices.get_mut(&address).ok_or(MockBusError::Nack)?;
        self.writes.push(Transaction {
            address,
            register,
            data: heapless::Vec::from_slice(data).map_err(|_| MockBusError::SimulatedError)?,
        });

        if self.never_latch {
            return Ok(());
        }
        if self.dropped_writes > 0 {
            self.dropped_writes -= 1;
            return Ok(());
        }
        let start = register as usize;
        memory[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl MockBus {
    /// Create a new MockBus with nothing attached.
    pub fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
            writes: Vec::new(),
            dropped_writes: 0,
            never_latch: false,
            should_error_on_write: false,
            should_error_on_read: false,
        }
    }

    /// Attach a board at `address`.
    ///
    /// A board fresh from power up reports a non-zero configuration register. All channels start
    /// off.
    pub fn with_board(mut self, address: u8, initialized: bool) -> Self {
        let mut memory = [0u8; 256];
        memory[0x03] = if initialized { 0x00 } else { 0xFF };
        memory[0x01] = 0xFF;
        self.devices.insert(address, memory);
        self
    }

    pub fn register(&self, address: u8, register: u8) -> u8 {
        self.devices[&address][register as usize]
    }

    pub fn set_register(&mut self, address: u8, register: u8, value: u8) {
        if let Some(memory) = self.devices.get_mut(&address) {
            memory[register as usize] = value;
        }
    }

    /// Get every write transaction issued so far.
    pub fn written(&self) -> &[Transaction] {
        &self.writes
    }

    /// Ignore the next `count` writes while still acknowledging them.
    pub fn drop_next_writes(&mut self, count: usize) {
        self.dropped_writes = count;
    }

    /// Acknowledge every write but never store anything.
    pub fn set_never_latch(&mut self, never_latch: bool) {
        self.never_latch = never_latch;
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_device_nacks() {
        let mut bus = MockBus::new().with_board(0x3F, true);
        let mut buf = [0u8; 1];
        assert_eq!(bus.read_registers(0x3E, 0x03, &mut buf), Err(MockBusError::Nack));
        assert_eq!(bus.write_registers(0x3E, 0x01, &[0]), Err(MockBusError::Nack));
        assert!(bus.written().is_empty());
    }

    #[test]
    fn write_then_read() {
        let mut bus = MockBus::new().with_board(0x3F, true);
        bus.write_registers(0x3F, 0x07, &[0xC2, 0x01]).unwrap();
        let mut buf = [0u8; 2];
        bus.read_registers(0x3F, 0x07, &mut buf).unwrap();
        assert_eq!(buf, [0xC2, 0x01]);
        assert_eq!(bus.written().len(), 1);
        assert_eq!(bus.written()[0].data.as_slice(), &[0xC2, 0x01]);
    }

    #[test]
    fn dropped_writes_are_acknowledged() {
        let mut bus = MockBus::new().with_board(0x3F, true);
        bus.drop_next_writes(1);
        bus.write_registers(0x3F, 0x01, &[0x00]).unwrap();
        assert_eq!(bus.register(0x3F, 0x01), 0xFF);
        bus.write_registers(0x3F, 0x01, &[0x00]).unwrap();
        assert_eq!(bus.register(0x3F, 0x01), 0x00);
    }

    #[test]
    fn error_flags() {
        let mut bus = MockBus::new().with_board(0x3F, true);
        bus.set_read_error(true);
        let mut buf = [0u8; 1];
        assert_eq!(
            bus.read_registers(0x3F, 0x01, &mut buf),
            Err(MockBusError::SimulatedError)
        );
        bus.set_write_error(true);
        assert_eq!(
            bus.write_registers(0x3F, 0x01, &[0]),
            Err(MockBusError::SimulatedError)
        );
    }
}
