use super::params;
use super::protocol::{CommandArg, Protocol, STATUS_ECHO_SIZE};
use super::reader::ChunkedReader;
use super::status::StatusByte;
use super::transport::{SerialSettings, SerialTransport, Transport};
use crate::config::InstrumentSettings;
use crate::error::{ProtocolError, RgaError};
use crate::types::{RgaModel, ScanWindow, Setting};
use log::{debug, error, info, warn};
use std::fmt::Display;
use std::io;
use std::time::Duration;

pub mod detector;
pub mod filament;
pub mod identity;
pub mod ionizer;
pub mod scan;
pub mod sensitivity;

/// Poll attempts for a 3-byte status echo.
pub const STATUS_ATTEMPTS: usize = 10;
/// Poll attempts for a single 4-byte current sample.
pub const SAMPLE_ATTEMPTS: usize = 10;
/// Poll attempts for a full analog scan.
pub const SCAN_ATTEMPTS: usize = 1000;

const DEFAULT_LINE_ATTEMPTS: usize = 10;

/// Timing of the poll loop that waits for replies.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rusty_rga::ConnectionConfig;
///
/// let config = ConnectionConfig {
///     poll_interval: Duration::from_millis(100),
///     ..Default::default()
/// };
/// assert_eq!(config.line_attempts(), 50);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Sleep between two availability polls
    pub poll_interval: Duration,
    /// Budget for one reply line
    pub read_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            read_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionConfig {
    /// Poll attempts that fit into the read timeout.
    pub fn line_attempts(&self) -> usize {
        if self.poll_interval.is_zero() {
            return DEFAULT_LINE_ATTEMPTS;
        }
        ((self.read_timeout.as_millis() / self.poll_interval.as_millis().max(1)) as usize).max(1)
    }
}

/// Builder for [`RgaClient`].
///
/// # Examples
///
/// ```no_run
/// use rusty_rga::{RgaClient, Setting};
///
/// let mut rga = RgaClient::builder()
///     .port("/dev/ttyUSB0")
///     .electron_energy(Setting::Value(70))
///     .emission_current(Setting::Value(1.0))
///     .build()?;
///
/// rga.turn_on_filament()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct RgaClientBuilder {
    port: Option<String>,
    transport: Option<Box<dyn Transport>>,
    serial: SerialSettings,
    config: ConnectionConfig,
    settings: InstrumentSettings,
}

impl RgaClientBuilder {
    /// Serial port to open, e.g. `/dev/ttyUSB0` or `COM4`
    pub fn port(mut self, port: &str) -> Self {
        self.port = Some(port.to_string());
        self
    }

    /// Use an already open transport instead of a serial port
    pub fn transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn serial_settings(mut self, serial: SerialSettings) -> Self {
        self.serial = serial;
        self
    }

    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Replace all instrument settings at once
    pub fn settings(mut self, settings: InstrumentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn electron_energy(mut self, setting: Setting<u16>) -> Self {
        self.settings.electron_energy_ev = setting;
        self
    }

    pub fn ion_energy(mut self, setting: Setting<u8>) -> Self {
        self.settings.ion_energy_ev = setting;
        self
    }

    pub fn plate_voltage(mut self, setting: Setting<u16>) -> Self {
        self.settings.plate_voltage_v = setting;
        self
    }

    pub fn emission_current(mut self, setting: Setting<f64>) -> Self {
        self.settings.emission_current_ma = setting;
        self
    }

    pub fn cdem_voltage(mut self, setting: Setting<u16>) -> Self {
        self.settings.cdem_voltage_v = setting;
        self
    }

    pub fn noise_floor(mut self, setting: Setting<u8>) -> Self {
        self.settings.noise_floor = setting;
        self
    }

    pub fn partial_sensitivity(mut self, setting: Setting<f64>) -> Self {
        self.settings.partial_sens_ma_per_torr = setting;
        self
    }

    pub fn total_sensitivity(mut self, setting: Setting<f64>) -> Self {
        self.settings.total_sens_ma_per_torr = setting;
        self
    }

    /// Open the link, identify the head and apply every setting.
    ///
    /// If any step fails the link is closed before the error is returned.
    pub fn build(self) -> Result<RgaClient, RgaError> {
        let transport = match (self.transport, self.port) {
            (Some(transport), _) => transport,
            (None, Some(port)) => {
                info!("Opening serial interface {port}...");
                let transport = SerialTransport::open(&port, &self.serial).map_err(|e| {
                    warn!("Failed to open {port}: {e}");
                    e
                })?;
                Box::new(transport)
            }
            (None, None) => {
                return Err(RgaError::Validation(
                    "Serial port must be specified".to_string(),
                ));
            }
        };

        let mut client = RgaClient::new(transport, self.config);
        match client.initialize(&self.settings) {
            Ok(()) => Ok(client),
            Err(e) => {
                error!("RGA initialization failed, closing link: {e}");
                drop(client);
                Err(e)
            }
        }
    }
}

/// Session with one SRS residual gas analyzer.
///
/// The client owns its transport for its whole lifetime. Every operation is
/// a blocking request/response exchange, so calls must not be interleaved;
/// wrap the client in a mutex if several threads need it.
///
/// # Examples
///
/// ```no_run
/// use rusty_rga::{RgaClient, ScanWindow};
///
/// let mut rga = RgaClient::new_serial("/dev/ttyUSB0")?;
/// println!("Connected to {}", rga.model());
///
/// rga.turn_on_filament()?;
/// let spectrum = rga.read_spectrum(ScanWindow::new(1, 50, 10))?;
/// println!("Total pressure: {:.3e} Torr", spectrum.total_pressure);
/// rga.turn_off_filament()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RgaClient {
    transport: Box<dyn Transport>,
    reader: ChunkedReader,
    config: ConnectionConfig,
    device_id: String,
    model: RgaModel,
    cdem_present: bool,
    filament_on: bool,
    electron_energy_ev: u16,
    ion_energy_ev: u8,
    plate_voltage_v: u16,
    cdem_voltage_v: u16,
    noise_floor: u8,
    emission_current_ma: f64,
    partial_sens: f64,
    total_sens: f64,
    scan_window: Option<ScanWindow>,
    desynced: bool,
}

impl RgaClient {
    /// Connect over `port` with default settings.
    pub fn new_serial(port: &str) -> Result<Self, RgaError> {
        Self::builder().port(port).build()
    }

    pub fn builder() -> RgaClientBuilder {
        RgaClientBuilder::default()
    }

    fn new(transport: Box<dyn Transport>, config: ConnectionConfig) -> Self {
        Self {
            transport,
            reader: ChunkedReader::new(config.poll_interval, super::reader::DEFAULT_CHUNK_SIZE),
            config,
            device_id: String::new(),
            model: RgaModel::Rga100,
            cdem_present: false,
            filament_on: false,
            electron_energy_ev: params::ELECTRON_ENERGY_DEFAULT_EV,
            ion_energy_ev: params::ION_ENERGY_DEFAULT_EV,
            plate_voltage_v: params::PLATE_VOLTAGE_DEFAULT_V,
            cdem_voltage_v: 0,
            noise_floor: params::NOISE_FLOOR_DEFAULT,
            emission_current_ma: params::EMISSION_CURRENT_DEFAULT_MA,
            partial_sens: 1.0,
            total_sens: 1.0,
            scan_window: None,
            desynced: false,
        }
    }

    fn initialize(&mut self, settings: &InstrumentSettings) -> Result<(), RgaError> {
        self.identify()?;
        info!("Connected to RGA model {}, id {}", self.model, self.device_id);
        self.cdem_present = self.get_cdem_presence()?;
        self.filament_on = self.get_filament_status()?;

        self.set_cdem_voltage(settings.cdem_voltage_v)?;
        self.set_electron_energy(settings.electron_energy_ev)?;
        self.set_ion_energy(settings.ion_energy_ev)?;
        self.set_plate_voltage(settings.plate_voltage_v)?;
        self.set_emission_current(settings.emission_current_ma)?;
        self.set_noise_floor(settings.noise_floor)?;
        self.set_partial_sensitivity(settings.partial_sens_ma_per_torr)?;
        self.set_total_sensitivity(settings.total_sens_ma_per_torr)?;
        self.calibrate_all()?;
        Ok(())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Send one command frame.
    ///
    /// Status-reporting commands also consume and check the status echo.
    pub(crate) fn send_command(&mut self, code: &str, arg: CommandArg) -> Result<(), RgaError> {
        if self.desynced {
            let dropped = self.reader.drain(self.transport.as_mut())?;
            if dropped > 0 {
                warn!("Discarded {dropped} stale bytes left by an aborted read");
            }
            self.desynced = false;
        }

        let frame = Protocol::encode_command(code, &arg);
        debug!("Sending command '{code}{arg}'");
        let written = self
            .transport
            .write_frame(&frame)
            .map_err(|e| RgaError::transport(e, format!("Writing command {code}")))?;
        if written != frame.len() {
            return Err(RgaError::transport(
                io::Error::new(io::ErrorKind::WriteZero, "short write"),
                format!("Command {code}: {written} of {} bytes accepted", frame.len()),
            ));
        }

        if Protocol::is_status_reporting(code, &arg) {
            self.check_status_byte()?;
        }
        Ok(())
    }

    fn check_status_byte(&mut self) -> Result<(), RgaError> {
        debug!("Checking status byte...");
        let echo = self.read_bytes(STATUS_ECHO_SIZE, STATUS_ATTEMPTS)?;
        let status = StatusByte::new(echo[0], self.cdem_present);
        debug!("Status byte: {:08b}", status.raw());
        status.check()?;
        Ok(())
    }

    pub(crate) fn read_bytes(&mut self, length: usize, attempts: usize) -> Result<Vec<u8>, RgaError> {
        let result = self
            .reader
            .read_exact(self.transport.as_mut(), length, attempts);
        self.note_desync(result)
    }

    pub(crate) fn read_line(&mut self) -> Result<String, RgaError> {
        let attempts = self.config.line_attempts();
        let result = self.reader.read_line(self.transport.as_mut(), attempts);
        self.note_desync(result)
    }

    /// Mark the link desynced when a read ends part way through a reply.
    fn note_desync<T>(&mut self, result: Result<T, RgaError>) -> Result<T, RgaError> {
        if let Err(RgaError::Protocol(e)) = &result {
            debug!("Read aborted ({e}), input will be drained before the next command");
            self.desynced = true;
        }
        result
    }

    pub(crate) fn query_int(&mut self, code: &str) -> Result<i64, RgaError> {
        self.send_command(code, CommandArg::Query)?;
        let line = self.read_line()?;
        Ok(Protocol::parse_int(&line)?)
    }

    pub(crate) fn query_float(&mut self, code: &str) -> Result<f64, RgaError> {
        self.send_command(code, CommandArg::Query)?;
        let line = self.read_line()?;
        Ok(Protocol::parse_float(&line)?)
    }

    /// Discard any bytes waiting in the input buffer.
    pub fn flush_input(&mut self) -> Result<usize, RgaError> {
        let dropped = self.reader.drain(self.transport.as_mut())?;
        debug!("Flushing buffer, {dropped} bytes read");
        Ok(dropped)
    }
}

/// Narrow an integer readback to the parameter's type.
pub(crate) fn narrow<T: TryFrom<i64>>(value: i64, parameter: &str) -> Result<T, ProtocolError> {
    T::try_from(value)
        .map_err(|_| ProtocolError::Malformed(format!("{parameter} readback {value} out of range")))
}

/// Fail with [`RgaError::ReadbackMismatch`] unless `matches` holds.
pub(crate) fn ensure_readback<T: Display>(
    parameter: &'static str,
    expected: T,
    actual: T,
    matches: bool,
) -> Result<(), RgaError> {
    if matches {
        debug!("{parameter} readback {actual} verified");
        Ok(())
    } else {
        Err(RgaError::ReadbackMismatch {
            parameter,
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
