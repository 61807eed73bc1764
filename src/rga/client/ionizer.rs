use super::{RgaClient, ensure_readback, narrow};
use crate::error::RgaError;
use crate::rga::params;
use crate::rga::protocol::CommandArg;
use crate::types::Setting;
use log::info;

impl RgaClient {
    /// Set the electron impact energy of the ionizer.
    ///
    /// `Setting::Default` restores the factory value of 70 eV.
    ///
    /// # Errors
    /// - [`RgaError::Validation`] outside 25..=105 eV, before anything is sent
    /// - [`RgaError::ReadbackMismatch`] if the head reports another value
    ///
    /// # Examples
    /// ```no_run
    /// use rusty_rga::{RgaClient, Setting};
    ///
    /// let mut rga = RgaClient::new_serial("/dev/ttyUSB0")?;
    /// rga.set_electron_energy(Setting::Value(50))?;
    /// rga.set_electron_energy(Setting::Default)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn set_electron_energy(&mut self, setting: Setting<u16>) -> Result<u16, RgaError> {
        let (arg, expected) = match setting {
            Setting::Default => (CommandArg::Reset, params::ELECTRON_ENERGY_DEFAULT_EV),
            Setting::Value(ev) => {
                let ev = params::ELECTRON_ENERGY_EV.check(ev)?;
                (CommandArg::Int(ev.into()), ev)
            }
        };
        info!("Setting electron energy to {expected} eV");
        self.send_command("EE", arg)?;

        let actual = self.get_electron_energy()?;
        self.electron_energy_ev = actual;
        ensure_readback("Electron energy", expected, actual, actual == expected)?;
        Ok(actual)
    }

    pub fn get_electron_energy(&mut self) -> Result<u16, RgaError> {
        let value = self.query_int("EE")?;
        Ok(narrow(value, "Electron energy")?)
    }

    /// Set the ion energy, either 8 or 12 eV.
    pub fn set_ion_energy(&mut self, setting: Setting<u8>) -> Result<u8, RgaError> {
        let (arg, expected) = match setting {
            Setting::Default => (CommandArg::Reset, params::ION_ENERGY_DEFAULT_EV),
            Setting::Value(ev) => (CommandArg::Int(params::ion_energy_to_code(ev)?), ev),
        };
        info!("Setting ion energy to {expected} eV");
        self.send_command("IE", arg)?;

        let actual = self.get_ion_energy()?;
        self.ion_energy_ev = actual;
        ensure_readback("Ion energy", expected, actual, actual == expected)?;
        Ok(actual)
    }

    /// Ion energy in eV, mapped back from the device code.
    pub fn get_ion_energy(&mut self) -> Result<u8, RgaError> {
        let code = self.query_int("IE")?;
        Ok(params::ion_energy_from_code(code)?)
    }

    /// Set the focus plate voltage magnitude in volts. The plate is biased
    /// negatively, so 90 puts it at -90 V.
    pub fn set_plate_voltage(&mut self, setting: Setting<u16>) -> Result<u16, RgaError> {
        let (arg, expected) = match setting {
            Setting::Default => (CommandArg::Reset, params::PLATE_VOLTAGE_DEFAULT_V),
            Setting::Value(v) => {
                let v = params::PLATE_VOLTAGE_V.check(v)?;
                (CommandArg::Int(params::plate_voltage_to_wire(v)), v)
            }
        };
        info!("Setting focus plate voltage to -{expected} V");
        self.send_command("VF", arg)?;

        let actual = self.get_plate_voltage()?;
        self.plate_voltage_v = actual;
        ensure_readback("Focus plate voltage", expected, actual, actual == expected)?;
        Ok(actual)
    }

    pub fn get_plate_voltage(&mut self) -> Result<u16, RgaError> {
        let value = self.query_int("VF")?;
        Ok(params::plate_voltage_from_wire(value)?)
    }

    /// Electron energy last read back from the head (eV).
    pub fn electron_energy(&self) -> u16 {
        self.electron_energy_ev
    }

    /// Ion energy last read back from the head (eV).
    pub fn ion_energy(&self) -> u8 {
        self.ion_energy_ev
    }

    pub fn plate_voltage(&self) -> u16 {
        self.plate_voltage_v
    }
}
