//! Transport abstraction
//!
//! The session only needs an ordered duplex byte channel; this trait is
//! that boundary. [`SerialTransport`] is the production implementation;
//! tests substitute an in-memory transport.

use serialport::SerialPort;
use std::io::{self, Read, Write};

/// A byte-oriented, ordered duplex channel to a device
pub trait Transport: Send {
    /// Write all bytes to the channel
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Read available bytes into `buf`, returning the number read.
    ///
    /// A timeout with no data reads as `Ok(0)` or an error of kind
    /// `TimedOut`/`WouldBlock`; the caller polls.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Number of bytes available to read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Discard any buffered input and output
    fn clear(&mut self) -> io::Result<()>;
}

/// Serial port transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Wrap an open serial port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf)?;
        self.port.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
