use thiserror::Error;

#[derive(Error, Debug)]
pub enum RgaError {
    #[error("Transport error: {context}: {source}")]
    Transport {
        source: std::io::Error,
        context: String,
    },
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Invalid setting: {0}")]
    Validation(String),
    #[error("{parameter} readback ({actual}) differs from setpoint ({expected})")]
    ReadbackMismatch {
        parameter: &'static str,
        expected: String,
        actual: String,
    },
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Timed out waiting for {expected} bytes, {received} received")]
    Timeout { expected: usize, received: usize },
    #[error("Malformed reply: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Error {0} reported in status echo")]
    Status(&'static str),
    #[error("Filament is off, turn on filament first")]
    FilamentOff,
    #[error("Filament still emitting {0} mA after turn-off, turn off RGA before venting")]
    FilamentStillOn(f64),
    #[error("Cannot determine RGA model from id '{0}'")]
    UnknownModel(String),
}

impl RgaError {
    pub(crate) fn transport(source: std::io::Error, context: impl Into<String>) -> Self {
        RgaError::Transport {
            source,
            context: context.into(),
        }
    }

    /// True if the error came from a read that ran out of attempts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RgaError::Protocol(ProtocolError::Timeout { .. }))
    }
}
