use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

use crate::error::ProtocolError;

// Protocol constants
pub const COMMAND_TERMINATOR: u8 = b'\r';
pub const LINE_TERMINATOR: u8 = b'\n';
pub const SAMPLE_SIZE: usize = 4;
pub const STATUS_ECHO_SIZE: usize = 3;
pub const MAX_LINE_LENGTH: usize = 256;
pub const STATUS_REPORTING_COMMANDS: [&str; 6] = ["EE", "FL", "IE", "VF", "CA", "HV"];

/// Argument part of a command frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandArg {
    /// Bare command, e.g. `CA`.
    None,
    /// `?`, read back the current value.
    Query,
    /// `*`, restore the instrument default.
    Reset,
    Int(i64),
    /// Float with a fixed number of decimals.
    Float(f64, usize),
}

impl CommandArg {
    pub fn is_query(&self) -> bool {
        matches!(self, CommandArg::Query)
    }
}

impl fmt::Display for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandArg::None => Ok(()),
            CommandArg::Query => f.write_str("?"),
            CommandArg::Reset => f.write_str("*"),
            CommandArg::Int(v) => write!(f, "{v}"),
            CommandArg::Float(v, decimals) => write!(f, "{:.*}", *decimals, v),
        }
    }
}

/// Frame codec for the RGA ASCII command set.
pub struct Protocol;

impl Protocol {
    /// Build `<code><arg>\r`.
    pub fn encode_command(code: &str, arg: &CommandArg) -> Vec<u8> {
        let mut frame = format!("{code}{arg}").into_bytes();
        frame.push(COMMAND_TERMINATOR);
        frame
    }

    /// Whether the instrument answers `code` with a status echo.
    pub fn is_status_reporting(code: &str, arg: &CommandArg) -> bool {
        !arg.is_query() && STATUS_REPORTING_COMMANDS.iter().any(|c| *c == code)
    }

    /// Decode a reply line as ASCII, trimmed of whitespace and terminators.
    pub fn decode_line(bytes: &[u8]) -> Result<String, ProtocolError> {
        if !bytes.is_ascii() {
            return Err(ProtocolError::Malformed(format!(
                "Non-ASCII bytes in reply line: {bytes:02x?}"
            )));
        }
        // is_ascii() guarantees valid UTF-8
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ProtocolError::Malformed(format!("Invalid reply line: {e}")))?;
        Ok(text.trim().to_string())
    }

    pub fn parse_int(line: &str) -> Result<i64, ProtocolError> {
        line.trim()
            .parse::<i64>()
            .map_err(|_| ProtocolError::Malformed(format!("Expected integer reply, got '{line}'")))
    }

    pub fn parse_float(line: &str) -> Result<f64, ProtocolError> {
        line.trim()
            .parse::<f64>()
            .map_err(|_| ProtocolError::Malformed(format!("Expected numeric reply, got '{line}'")))
    }

    /// Decode one raw current sample, a little-endian `i32` mantissa.
    pub fn decode_sample(bytes: &[u8]) -> Result<i32, ProtocolError> {
        if bytes.len() != SAMPLE_SIZE {
            return Err(ProtocolError::Malformed(format!(
                "Current sample must be {SAMPLE_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Cursor::new(bytes)
            .read_i32::<LittleEndian>()
            .map_err(|e| ProtocolError::Malformed(format!("Cannot decode current sample: {e}")))
    }
}
