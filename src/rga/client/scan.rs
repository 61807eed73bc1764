use super::{RgaClient, SAMPLE_ATTEMPTS, SCAN_ATTEMPTS, ensure_readback, narrow};
use crate::error::{DeviceError, RgaError};
use crate::rga::params;
use crate::rga::protocol::{CommandArg, SAMPLE_SIZE};
use crate::rga::spectrum;
use crate::types::{ScanWindow, Spectrum};
use log::{debug, info};

impl RgaClient {
    /// Scan window currently programmed in the head.
    pub fn get_scan_window(&mut self) -> Result<ScanWindow, RgaError> {
        let min = self.query_int("MI")?;
        let max = self.query_int("MF")?;
        let resolution = self.query_int("SA")?;
        Ok(ScanWindow::new(
            narrow(min, "Scan start mass")?,
            narrow(max, "Scan end mass")?,
            narrow(resolution, "Scan resolution")?,
        ))
    }

    /// Program the analog scan window and verify all three values.
    pub fn set_scan_window(&mut self, window: ScanWindow) -> Result<ScanWindow, RgaError> {
        params::check_scan_window(&window, self.model)?;
        info!("Setting scan window to {window}");
        // Unknown until the head has been read back.
        self.scan_window = None;
        self.send_command("MI", CommandArg::Int(window.min.into()))?;
        self.send_command("MF", CommandArg::Int(window.max.into()))?;
        self.send_command("SA", CommandArg::Int(window.resolution.into()))?;

        let actual = self.get_scan_window()?;
        self.scan_window = Some(actual);
        ensure_readback("Scan window", window, actual, actual == window)?;
        Ok(actual)
    }

    /// Run one analog scan over `window`.
    ///
    /// The window is only sent when it differs from the last one applied.
    /// The whole payload is collected before decoding.
    ///
    /// # Errors
    /// - [`DeviceError::FilamentOff`] if the filament is not on
    /// - [`RgaError::Validation`] for a window the head cannot scan
    /// - [`crate::ProtocolError::Timeout`] if the scan data stops arriving
    ///
    /// # Examples
    /// ```no_run
    /// use rusty_rga::{RgaClient, ScanWindow};
    ///
    /// let mut rga = RgaClient::new_serial("/dev/ttyUSB0")?;
    /// rga.turn_on_filament()?;
    /// let spectrum = rga.read_spectrum(ScanWindow::new(1, 50, 10))?;
    /// for (mass, pressure) in spectrum.masses.iter().zip(&spectrum.pressures) {
    ///     println!("{mass:6.2} AMU  {pressure:.3e} Torr");
    /// }
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn read_spectrum(&mut self, window: ScanWindow) -> Result<Spectrum, RgaError> {
        if !self.filament_on {
            return Err(DeviceError::FilamentOff.into());
        }
        if self.scan_window != Some(window) {
            self.set_scan_window(window)?;
        } else {
            debug!("Scan window {window} already applied");
        }

        let length = spectrum::expected_payload_len(&window);
        info!("Reading spectrum {window}, {} points", window.points());
        self.send_command("SC", CommandArg::Int(1))?;
        let payload = self.read_bytes(length, SCAN_ATTEMPTS)?;

        spectrum::decode_spectrum(&payload, &window, self.partial_sens, self.total_sens)
    }

    /// Partial pressure at a single mass, in Torr.
    pub fn read_mass(&mut self, amu: u16) -> Result<f64, RgaError> {
        let ceiling = self.model.max_mass();
        if !(params::SCAN_MASS_MIN..=ceiling).contains(&amu) {
            return Err(RgaError::Validation(format!(
                "Mass {amu} AMU is outside of allowed bounds [{}, {ceiling}]",
                params::SCAN_MASS_MIN
            )));
        }
        if !self.filament_on {
            return Err(DeviceError::FilamentOff.into());
        }

        info!("Reading partial pressure at {amu} AMU");
        self.send_command("MR", CommandArg::Int(amu.into()))?;
        let sample = self.read_bytes(SAMPLE_SIZE, SAMPLE_ATTEMPTS)?;
        let current = spectrum::decode_current(&sample)?;
        Ok(spectrum::current_to_pressure(current, self.partial_sens))
    }

    /// Scan window last read back from the head, `None` while a change is
    /// unconfirmed.
    pub fn scan_window(&self) -> Option<ScanWindow> {
        self.scan_window
    }
}
