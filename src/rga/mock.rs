//! In-memory transports for exercising the protocol engine without hardware.

use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use super::client::{ConnectionConfig, RgaClient};
use super::protocol::STATUS_REPORTING_COMMANDS;
use super::transport::Transport;
use crate::config::InstrumentSettings;

/// Byte stream that releases its pending bytes in scripted bursts, one burst
/// per availability poll.
pub(crate) struct BurstTransport {
    pending: VecDeque<u8>,
    arrived: VecDeque<u8>,
    bursts: Vec<usize>,
    next_burst: usize,
}

impl BurstTransport {
    pub(crate) fn new(payload: Vec<u8>, bursts: Vec<usize>) -> Self {
        Self {
            pending: payload.into(),
            arrived: VecDeque::new(),
            bursts,
            next_burst: 0,
        }
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    fn release_burst(&mut self) {
        if self.bursts.is_empty() {
            self.arrived.extend(self.pending.drain(..));
            return;
        }
        let size = self.bursts[self.next_burst % self.bursts.len()].min(self.pending.len());
        self.next_burst += 1;
        self.arrived.extend(self.pending.drain(..size));
    }
}

impl Transport for BurstTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.release_burst();
        Ok(self.arrived.len())
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        Ok(frame.len())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.arrived.len());
        for (slot, byte) in buf.iter_mut().zip(self.arrived.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// Simulated RGA head answering the subset of the command set the driver uses.
pub(crate) struct FakeRga {
    pub id: String,
    pub cdem_present: bool,
    pub electron_energy: i64,
    pub ion_energy_code: i64,
    pub plate_voltage: i64,
    pub cdem_voltage: i64,
    /// Scales the reported CDEM voltage to emulate a drifting supply.
    pub cdem_readback_scale: f64,
    pub noise_floor: i64,
    pub emission: f64,
    /// Emission reported after an off command, if the filament refuses to turn off.
    pub lingering_emission: Option<f64>,
    pub partial_sens: f64,
    pub total_sens: f64,
    pub scan_min: i64,
    pub scan_max: i64,
    pub scan_res: i64,
    pub status: u8,
    /// Codes whose set commands are silently dropped.
    pub ignore_sets: Vec<&'static str>,
    /// Codes whose queries get no reply at all.
    pub mute_queries: Vec<&'static str>,
    /// Bytes left in the buffer after a calibration.
    pub calibration_residue: Vec<u8>,
    /// Samples in a scan are dropped from the end by this many frames.
    pub truncate_scan: usize,
    pub short_write: bool,
    /// Every frame received, without the terminator.
    pub written: Vec<String>,
    pub link: BurstTransport,
}

impl Default for FakeRga {
    fn default() -> Self {
        Self {
            id: "SRSRGA200VER0.24SN19254".to_string(),
            cdem_present: true,
            electron_energy: 70,
            ion_energy_code: 1,
            plate_voltage: 90,
            cdem_voltage: 0,
            cdem_readback_scale: 1.0,
            noise_floor: 4,
            emission: 0.0,
            lingering_emission: None,
            partial_sens: 0.25,
            total_sens: 2.5,
            scan_min: 1,
            scan_max: 100,
            scan_res: 10,
            status: 0,
            ignore_sets: Vec::new(),
            mute_queries: Vec::new(),
            calibration_residue: Vec::new(),
            truncate_scan: 0,
            short_write: false,
            written: Vec::new(),
            link: BurstTransport::new(Vec::new(), vec![48, 7, 1, 30]),
        }
    }
}

impl FakeRga {
    /// Mantissa the head reports for mass sample `index` of a scan.
    pub fn scan_sample(index: usize) -> i32 {
        (index as i32 + 1) * 10
    }

    pub const TOTAL_SAMPLE: i32 = 12_345;

    pub fn mass_sample(amu: i64) -> i32 {
        amu as i32 * 100
    }

    fn reply_line(&mut self, text: String) {
        self.link.push(text.as_bytes());
        self.link.push(b"\n\r");
    }

    fn handle(&mut self, frame: &str) {
        let (code, arg) = frame.split_at(frame.len().min(2));
        if arg == "?" {
            if !self.mute_queries.iter().any(|c| *c == code) {
                self.answer_query(code);
            }
            return;
        }

        if !self.ignore_sets.iter().any(|c| *c == code) {
            self.apply(code, arg);
        }

        if STATUS_REPORTING_COMMANDS.iter().any(|c| *c == code) {
            let status = self.status;
            self.link.push(&[status, b'\n', b'\r']);
        }

        match code {
            "CA" => {
                let residue = self.calibration_residue.clone();
                self.link.push(&residue);
            }
            "MR" => {
                let amu = arg.parse().unwrap_or(0);
                self.link.push(&Self::mass_sample(amu).to_le_bytes());
            }
            "SC" => {
                let points = ((self.scan_max - self.scan_min) * self.scan_res + 1) as usize;
                for i in 0..points.saturating_sub(self.truncate_scan) {
                    self.link.push(&Self::scan_sample(i).to_le_bytes());
                }
                self.link.push(&Self::TOTAL_SAMPLE.to_le_bytes());
            }
            _ => {}
        }
    }

    fn apply(&mut self, code: &str, arg: &str) {
        let reset = arg == "*";
        let int = || arg.parse::<i64>().unwrap_or(-1);
        let float = || arg.parse::<f64>().unwrap_or(-1.0);
        match code {
            "EE" => self.electron_energy = if reset { 70 } else { int() },
            "IE" => self.ion_energy_code = if reset { 1 } else { int() },
            "VF" => self.plate_voltage = if reset { 90 } else { int().abs() },
            "HV" => self.cdem_voltage = if reset { 1400 } else { int() },
            "NF" => self.noise_floor = if reset { 4 } else { int() },
            "FL" => {
                let value = float();
                self.emission = match (value, self.lingering_emission) {
                    (v, Some(linger)) if v == 0.0 => linger,
                    (v, _) => v,
                };
            }
            "SP" => self.partial_sens = float(),
            "ST" => self.total_sens = float(),
            "MI" => self.scan_min = int(),
            "MF" => self.scan_max = int(),
            "SA" => self.scan_res = int(),
            _ => {}
        }
    }

    fn answer_query(&mut self, code: &str) {
        match code {
            "ID" => self.reply_line(self.id.clone()),
            "EM" => {
                let flag = if self.cdem_present { b'0' } else { b'1' };
                self.link.push(&[flag, b'\n', b'\r']);
            }
            "EE" => self.reply_line(self.electron_energy.to_string()),
            "IE" => self.reply_line(self.ion_energy_code.to_string()),
            "VF" => self.reply_line(self.plate_voltage.to_string()),
            "HV" => {
                let reported = (self.cdem_voltage as f64 * self.cdem_readback_scale).round();
                self.reply_line(format!("{reported}"));
            }
            "NF" => self.reply_line(self.noise_floor.to_string()),
            "FL" => self.reply_line(format!("{:.2}", self.emission)),
            "SP" => self.reply_line(format!("{}", self.partial_sens)),
            "ST" => self.reply_line(format!("{}", self.total_sens)),
            "MI" => self.reply_line(self.scan_min.to_string()),
            "MF" => self.reply_line(self.scan_max.to_string()),
            "SA" => self.reply_line(self.scan_res.to_string()),
            _ => {}
        }
    }

    /// Queue bytes that were not requested, e.g. a late reply.
    pub fn link_push(&mut self, bytes: &[u8]) {
        self.link.push(bytes);
    }

    /// Frames received since the last call.
    pub fn take_written(&mut self) -> Vec<String> {
        std::mem::take(&mut self.written)
    }
}

/// Shared handle to a [`FakeRga`], usable as the client's transport while the
/// test keeps a clone for inspection.
#[derive(Clone)]
pub(crate) struct MockTransport {
    inner: Arc<Mutex<FakeRga>>,
}

impl MockTransport {
    pub(crate) fn new(fake: FakeRga) -> Self {
        Self {
            inner: Arc::new(Mutex::new(fake)),
        }
    }

    pub(crate) fn device(&self) -> MutexGuard<'_, FakeRga> {
        self.inner.lock()
    }

    /// Live handles on the fake head, this one included.
    pub(crate) fn handles(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl Transport for MockTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.inner.lock().link.bytes_available()
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        let mut device = self.inner.lock();
        if device.short_write {
            return Ok(frame.len().saturating_sub(1));
        }
        let text = String::from_utf8_lossy(frame)
            .trim_end_matches('\r')
            .to_string();
        device.written.push(text.clone());
        device.handle(&text);
        Ok(frame.len())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.lock().link.read_available(buf)
    }
}

pub(crate) fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        poll_interval: Duration::ZERO,
        ..ConnectionConfig::default()
    }
}

/// Connect a client to `fake` with default settings and clear the frame log.
pub(crate) fn connect(fake: FakeRga) -> (RgaClient, MockTransport) {
    connect_with(fake, InstrumentSettings::default())
}

pub(crate) fn connect_with(
    fake: FakeRga,
    settings: InstrumentSettings,
) -> (RgaClient, MockTransport) {
    let mock = MockTransport::new(fake);
    let client = RgaClient::builder()
        .transport(Box::new(mock.clone()))
        .config(test_config())
        .settings(settings)
        .build()
        .unwrap();
    mock.device().take_written();
    (client, mock)
}
