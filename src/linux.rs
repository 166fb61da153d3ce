//! [`RegisterBus`] on top of the Linux `i2c-dev` interface.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::Path;

use crate::bus::RegisterBus;

/// `ioctl` selecting the slave address used by subsequent reads and writes.
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// Longest register block written in one transaction, plus the register byte.
const MAX_WRITE: usize = 16;

#[derive(Debug)]
pub struct IoError(pub std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

/// An open `/dev/i2c-N` adapter.
pub struct LinuxI2c {
    file: File,
    /// Slave address currently selected on the file descriptor.
    selected: Option<u8>,
}

impl LinuxI2c {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(IoError)?;
        tracing::debug!("Opened I2C adapter {}", path.display());
        Ok(Self {
            file,
            selected: None,
        })
    }

    fn select(&mut self, address: u8) -> Result<(), IoError> {
        if self.selected == Some(address) {
            return Ok(());
        }
        // SAFETY: the descriptor is owned by `self.file`, I2C_SLAVE takes the address by value.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_SLAVE as _,
                address as libc::c_ulong,
            )
        };
        if rc < 0 {
            self.selected = None;
            return Err(IoError(std::io::Error::last_os_error()));
        }
        self.selected = Some(address);
        Ok(())
    }
}

impl embedded_io::ErrorType for LinuxI2c {
    type Error = IoError;
}

impl RegisterBus for LinuxI2c {
    fn read_registers(
        &mut self,
        address: u8,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.select(address)?;
        self.file.write_all(&[register]).map_err(IoError)?;
        self.file.read_exact(buf).map_err(IoError)
    }

    fn write_registers(
        &mut self,
        address: u8,
        register: u8,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        let mut frame: heapless::Vec<u8, MAX_WRITE> = heapless::Vec::new();
        frame.push(register).map_err(|_| too_long())?;
        frame.extend_from_slice(data).map_err(|_| too_long())?;

        self.select(address)?;
        self.file.write_all(&frame).map_err(IoError)
    }
}

fn too_long() -> IoError {
    IoError(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        "register block too long",
    ))
}
