//! The byte pipe a bus talks through
//!
//! Anything that can read and write bytes with a timeout can carry a bus. The
//! usual transport is a serial port, for which [`open_serial`] does the setup.

use super::{config::BusConfig, BusError, BusResult};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};

/// Byte transport of a bus
///
/// Reads are expected to block until at least one byte arrived or the
/// timeout the transport was set up with elapsed, in which case they fail with
/// [`io::ErrorKind::TimedOut`]. That is how serial ports behave.
///
/// The bus bounds a whole reply by its timeout on top of that, so a reply that
/// trickles in ends at most one read timeout after the bus timeout.
pub trait Transport: Read + Write + Send {
    /// Returns the number of bytes waiting to be read
    fn bytes_to_read(&self) -> io::Result<u32>;

    /// Discards bytes that arrived but weren't read yet, e.g. a late reply to a
    /// request that already timed out
    fn clear_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for Box<dyn SerialPort> {
    fn bytes_to_read(&self) -> io::Result<u32> {
        Ok(SerialPort::bytes_to_read(&**self)?)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        Ok(self.clear(ClearBuffer::Input)?)
    }
}

/// Opens the serial port `name` with the baud rate and timeout of `config`
///
/// # Errors
/// [`BusError::NoDevice`] if there is no port with that name,
/// [`BusError::SerialPortError`] if it exists but can't be claimed, e.g.
/// because another process holds it
pub fn open_serial(name: &str, config: &BusConfig) -> BusResult<Box<dyn SerialPort>> {
    serialport::new(name, config.baudrate())
        .timeout(config.timeout())
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice
            | serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
                BusError::NoDevice(name.to_owned())
            }
            _ => BusError::SerialPortError(e),
        })
}

/// Returns the names of the serial ports present on this machine
pub fn available_ports() -> BusResult<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}
