use super::{RgaClient, ensure_readback, narrow};
use crate::error::RgaError;
use crate::rga::params;
use crate::rga::protocol::CommandArg;
use crate::types::{Detector, Setting};
use log::info;

impl RgaClient {
    /// Set the electron multiplier high voltage.
    ///
    /// `Setting::Value(0)` switches to the Faraday cup; it is always accepted
    /// and has no readback check. Any other voltage must lie in 10..=2490 V
    /// and reads back within ±10 %.
    ///
    /// Returns `Ok(None)` without touching the link when no multiplier is
    /// installed.
    ///
    /// # Examples
    /// ```no_run
    /// use rusty_rga::{RgaClient, Setting};
    ///
    /// let mut rga = RgaClient::new_serial("/dev/ttyUSB0")?;
    /// if rga.set_cdem_voltage(Setting::Value(1400))?.is_none() {
    ///     println!("No electron multiplier, staying on the Faraday cup");
    /// }
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn set_cdem_voltage(&mut self, setting: Setting<u16>) -> Result<Option<u16>, RgaError> {
        if !self.cdem_present {
            info!("No electron multiplier installed, CDEM voltage not set");
            return Ok(None);
        }

        if setting == Setting::Value(0) {
            info!("Selecting Faraday cup detector");
            self.send_command("HV", CommandArg::Int(0))?;
            self.cdem_voltage_v = 0;
            return Ok(Some(0));
        }

        let (arg, expected) = match setting {
            Setting::Default => (CommandArg::Reset, params::CDEM_VOLTAGE_DEFAULT_V),
            Setting::Value(v) => {
                let v = params::CDEM_VOLTAGE_V.check(v)?;
                (CommandArg::Int(v.into()), v)
            }
        };
        info!("Setting CDEM voltage to {expected} V");
        self.send_command("HV", arg)?;

        let Some(actual) = self.get_cdem_voltage()? else {
            return Ok(None);
        };
        self.cdem_voltage_v = actual;
        ensure_readback(
            "CDEM voltage",
            expected,
            actual,
            params::within_fraction(
                expected.into(),
                actual.into(),
                params::CDEM_VOLTAGE_TOLERANCE,
            ),
        )?;
        Ok(Some(actual))
    }

    /// Multiplier voltage in volts, `None` if no multiplier is installed.
    pub fn get_cdem_voltage(&mut self) -> Result<Option<u16>, RgaError> {
        if !self.cdem_present {
            return Ok(None);
        }
        let value = self.query_int("HV")?;
        Ok(Some(narrow(value, "CDEM voltage")?))
    }

    pub fn set_noise_floor(&mut self, setting: Setting<u8>) -> Result<u8, RgaError> {
        let (arg, expected) = match setting {
            Setting::Default => (CommandArg::Reset, params::NOISE_FLOOR_DEFAULT),
            Setting::Value(nf) => {
                let nf = params::NOISE_FLOOR.check(nf)?;
                (CommandArg::Int(nf.into()), nf)
            }
        };
        info!("Setting noise floor to {expected}");
        self.send_command("NF", arg)?;

        let actual = self.get_noise_floor()?;
        self.noise_floor = actual;
        ensure_readback("Noise floor", expected, actual, actual == expected)?;
        Ok(actual)
    }

    pub fn get_noise_floor(&mut self) -> Result<u8, RgaError> {
        let value = self.query_int("NF")?;
        Ok(narrow(value, "Noise floor")?)
    }

    /// Detector selected by the CDEM voltage last read back from the head.
    pub fn detector(&self) -> Detector {
        Detector::from_voltage(self.cdem_voltage_v)
    }

    pub fn noise_floor(&self) -> u8 {
        self.noise_floor
    }
}
