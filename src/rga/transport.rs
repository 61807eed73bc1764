use log::debug;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::RgaError;

/// Byte-level link to the instrument.
///
/// The protocol engine only needs three primitives: how many bytes are
/// waiting, a blocking write of one frame, and a non-blocking read of bytes
/// that have already arrived.
pub trait Transport: Send {
    /// Number of received bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Write a whole command frame, returning how many bytes were accepted.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes that are already available.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Fixed RS-232 line settings of the RGA head.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 28_800,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::Hardware,
            timeout: Duration::from_secs(5),
        }
    }
}

/// [`Transport`] over a real serial port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `port_name` (e.g. `/dev/ttyUSB0` or `COM4`) with the given line settings.
    pub fn open(port_name: &str, settings: &SerialSettings) -> Result<Self, RgaError> {
        debug!("Opening serial port {port_name} with {settings:?}");
        let port = serialport::new(port_name, settings.baud_rate)
            .data_bits(settings.data_bits)
            .stop_bits(settings.stop_bits)
            .parity(settings.parity)
            .flow_control(settings.flow_control)
            .timeout(settings.timeout)
            .open()?;
        debug!("Serial port {port_name} is open");
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        let written = self.port.write(frame)?;
        self.port.flush()?;
        Ok(written)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}
