use log::debug;
use std::thread;
use std::time::Duration;

use super::protocol::{LINE_TERMINATOR, MAX_LINE_LENGTH, Protocol};
use super::transport::Transport;
use crate::error::{ProtocolError, RgaError};

pub const DEFAULT_CHUNK_SIZE: usize = 64;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Assembles replies that arrive over several polls of the transport.
///
/// The instrument streams its replies in bursts whose size depends on the
/// USB/serial adapter. The reader waits until either a full chunk or the rest
/// of the reply is buffered, then moves it out, never reading past the
/// requested length.
#[derive(Debug, Clone)]
pub struct ChunkedReader {
    poll_interval: Duration,
    chunk_size: usize,
}

impl Default for ChunkedReader {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkedReader {
    pub fn new(poll_interval: Duration, chunk_size: usize) -> Self {
        Self {
            poll_interval,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Read exactly `length` bytes.
    ///
    /// Every poll that finds less than a chunk (and less than what is still
    /// missing) costs one attempt and one poll interval of sleep. The call
    /// fails with [`ProtocolError::Timeout`] once more than `attempts` polls
    /// came up short.
    pub fn read_exact(
        &self,
        transport: &mut dyn Transport,
        length: usize,
        attempts: usize,
    ) -> Result<Vec<u8>, RgaError> {
        debug!("Waiting for {length} bytes ({attempts} attempts)");
        let mut attempt = 0;
        self.read_counted(transport, length, attempts, &mut attempt)
    }

    /// [`read_exact`](Self::read_exact) charging short polls to a counter
    /// owned by the caller.
    fn read_counted(
        &self,
        transport: &mut dyn Transport,
        length: usize,
        attempts: usize,
        attempt: &mut usize,
    ) -> Result<Vec<u8>, RgaError> {
        let chunk = self.chunk_size.min(length);
        let mut data = Vec::with_capacity(length);

        while data.len() < length {
            let remaining = length - data.len();
            let available = transport
                .bytes_available()
                .map_err(|e| RgaError::transport(e, "Querying bytes available"))?;

            if available < chunk && available < remaining {
                *attempt += 1;
                if *attempt > attempts {
                    debug!(
                        "Gave up after {attempts} attempts: {} of {length} bytes received",
                        data.len()
                    );
                    return Err(ProtocolError::Timeout {
                        expected: length,
                        received: data.len(),
                    }
                    .into());
                }
                debug!(
                    "{available} bytes buffered, {} bytes received, out of {length}",
                    data.len()
                );
                thread::sleep(self.poll_interval);
                continue;
            }

            let start = data.len();
            data.resize(start + available.min(remaining), 0);
            let read = transport
                .read_available(&mut data[start..])
                .map_err(|e| RgaError::transport(e, format!("Reading {length} byte reply")))?;
            data.truncate(start + read);

            if read == 0 {
                // Reported bytes that were not there; count it as a short poll.
                *attempt += 1;
                if *attempt > attempts {
                    return Err(ProtocolError::Timeout {
                        expected: length,
                        received: data.len(),
                    }
                    .into());
                }
            }
        }

        debug!(
            "Received {length} bytes: {:02x?}",
            if length <= 20 { &data[..] } else { &data[..20] }
        );
        Ok(data)
    }

    /// Read one reply line and return it without terminators.
    ///
    /// The instrument ends lines with `\n\r`. After the `\n` one extra byte is
    /// consumed so the `\r` does not leak into the next reply. `attempts`
    /// covers the whole line, not each byte.
    pub fn read_line(
        &self,
        transport: &mut dyn Transport,
        attempts: usize,
    ) -> Result<String, RgaError> {
        let mut line = Vec::new();
        let mut attempt = 0;
        loop {
            let byte = self.read_counted(transport, 1, attempts, &mut attempt)?[0];
            if byte == LINE_TERMINATOR {
                break;
            }
            line.push(byte);
            if line.len() > MAX_LINE_LENGTH {
                return Err(ProtocolError::Malformed(format!(
                    "Reply line exceeds {MAX_LINE_LENGTH} bytes without terminator"
                ))
                .into());
            }
        }
        self.read_counted(transport, 1, attempts, &mut attempt)?;

        let text = Protocol::decode_line(&line)?;
        debug!("Received line: '{text}'");
        Ok(text)
    }

    /// Discard every byte currently buffered, returning how many were dropped.
    pub fn drain(&self, transport: &mut dyn Transport) -> Result<usize, RgaError> {
        let mut dropped = 0;
        loop {
            let available = transport
                .bytes_available()
                .map_err(|e| RgaError::transport(e, "Querying bytes available"))?;
            if available == 0 {
                break;
            }
            let mut buf = vec![0u8; available];
            let read = transport
                .read_available(&mut buf)
                .map_err(|e| RgaError::transport(e, "Draining input buffer"))?;
            if read == 0 {
                break;
            }
            dropped += read;
        }
        Ok(dropped)
    }
}
