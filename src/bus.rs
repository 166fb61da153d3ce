//! The raw register bus the board hangs off.

/// A two-wire bus able to read and write consecutive device registers.
///
/// Implementations perform exactly one bus transaction per call and do not retry. A device which
/// does not acknowledge its address must surface as an error, this is how absent boards are told apart.
pub trait RegisterBus: embedded_io::ErrorType {
    /// Read `buf.len()` bytes starting at `register` of the device at `address`.
    fn read_registers(
        &mut self,
        address: u8,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), Self::Error>;

    /// Write `data` starting at `register` of the device at `address`.
    fn write_registers(&mut self, address: u8, register: u8, data: &[u8])
    -> Result<(), Self::Error>;
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    fn read_registers(
        &mut self,
        address: u8,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), Self::Error> {
        T::read_registers(self, address, register, buf)
    }

    fn write_registers(
        &mut self,
        address: u8,
        register: u8,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        T::write_registers(self, address, register, data)
    }
}
