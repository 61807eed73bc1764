//! Parameter domains, defaults and the wire transforms of the RGA command set.
//!
//! Every transform comes with its inverse so a readback can be compared with
//! the value the caller asked for.

use std::fmt::Display;

use crate::error::{ProtocolError, RgaError};
use crate::types::{RgaModel, ScanWindow};

/// Inclusive bounds of a numeric parameter.
#[derive(Debug, Clone, Copy)]
pub struct Bounds<T> {
    pub name: &'static str,
    pub min: T,
    pub max: T,
    pub unit: &'static str,
}

impl<T: PartialOrd + Display + Copy> Bounds<T> {
    /// Return `value` if it lies in `[min, max]`.
    pub fn check(&self, value: T) -> Result<T, RgaError> {
        // Written so that NaN fails as well.
        if value >= self.min && value <= self.max {
            Ok(value)
        } else {
            Err(RgaError::Validation(format!(
                "{} {}{} is outside of allowed bounds [{}, {}]",
                self.name, value, self.unit, self.min, self.max
            )))
        }
    }
}

pub const ELECTRON_ENERGY_EV: Bounds<u16> = Bounds {
    name: "Electron energy",
    min: 25,
    max: 105,
    unit: " eV",
};
pub const ELECTRON_ENERGY_DEFAULT_EV: u16 = 70;

/// Allowed ion energies (eV) and their device codes.
pub const ION_ENERGIES: [(u8, i64); 2] = [(8, 0), (12, 1)];
pub const ION_ENERGY_DEFAULT_EV: u8 = 12;

pub const PLATE_VOLTAGE_V: Bounds<u16> = Bounds {
    name: "Focus plate voltage",
    min: 0,
    max: 150,
    unit: " V",
};
pub const PLATE_VOLTAGE_DEFAULT_V: u16 = 90;

pub const CDEM_VOLTAGE_V: Bounds<u16> = Bounds {
    name: "CDEM voltage",
    min: 10,
    max: 2490,
    unit: " V",
};
pub const CDEM_VOLTAGE_DEFAULT_V: u16 = 1400;
pub const CDEM_VOLTAGE_TOLERANCE: f64 = 0.1;

pub const NOISE_FLOOR: Bounds<u8> = Bounds {
    name: "Noise floor",
    min: 0,
    max: 7,
    unit: "",
};
pub const NOISE_FLOOR_DEFAULT: u8 = 4;

pub const EMISSION_CURRENT_MA: Bounds<f64> = Bounds {
    name: "Emission current",
    min: 0.0,
    max: 3.5,
    unit: " mA",
};
pub const EMISSION_CURRENT_STEP_MA: f64 = 0.02;
pub const EMISSION_CURRENT_DEFAULT_MA: f64 = 1.0;

pub const PARTIAL_SENS_MA_PER_TORR: Bounds<f64> = Bounds {
    name: "Partial pressure sensitivity",
    min: 0.0,
    max: 10.0,
    unit: " mA/Torr",
};
pub const TOTAL_SENS_MA_PER_TORR: Bounds<f64> = Bounds {
    name: "Total pressure sensitivity",
    min: 0.0,
    max: 100.0,
    unit: " mA/Torr",
};

/// Validate a sensitivity factor. It divides every ion current, so zero is
/// rejected along with anything outside `bounds`.
pub fn check_sensitivity(bounds: &Bounds<f64>, value: f64) -> Result<f64, RgaError> {
    let value = bounds.check(value)?;
    if value <= 0.0 {
        return Err(RgaError::Validation(format!(
            "{} must be greater than zero, specified: {value}{}",
            bounds.name, bounds.unit
        )));
    }
    Ok(value)
}

pub const SCAN_MASS_MIN: u16 = 1;
pub const SCAN_RESOLUTION: Bounds<u16> = Bounds {
    name: "Scan resolution",
    min: 10,
    max: 25,
    unit: " steps/AMU",
};

/// Relative tolerance for comparing float readbacks, which go through a
/// decimal text representation on the wire.
const FLOAT_READBACK_EPSILON: f64 = 1e-6;

pub fn ion_energy_to_code(energy_ev: u8) -> Result<i64, RgaError> {
    ION_ENERGIES
        .iter()
        .find(|(ev, _)| *ev == energy_ev)
        .map(|(_, code)| *code)
        .ok_or_else(|| {
            RgaError::Validation(format!(
                "Ion energy must be 8 or 12 eV, specified: {energy_ev} eV"
            ))
        })
}

pub fn ion_energy_from_code(code: i64) -> Result<u8, ProtocolError> {
    ION_ENERGIES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(ev, _)| *ev)
        .ok_or_else(|| ProtocolError::Malformed(format!("Unknown ion energy code {code}")))
}

/// The focus plate is biased negatively; the command takes the signed value.
pub fn plate_voltage_to_wire(voltage_v: u16) -> i64 {
    -(voltage_v as i64)
}

/// The plate readback is reported as a magnitude.
pub fn plate_voltage_from_wire(value: i64) -> Result<u16, ProtocolError> {
    u16::try_from(value.unsigned_abs())
        .map_err(|_| ProtocolError::Malformed(format!("Plate voltage {value} out of range")))
}

/// Check bounds and the 0.02 mA granularity of an emission current.
pub fn check_emission_current(current_ma: f64) -> Result<f64, RgaError> {
    EMISSION_CURRENT_MA.check(current_ma)?;
    let steps = current_ma / EMISSION_CURRENT_STEP_MA;
    if (steps - steps.round()).abs() > 1e-6 {
        return Err(RgaError::Validation(format!(
            "Emission current must be a multiple of {EMISSION_CURRENT_STEP_MA} mA, specified: {current_ma} mA"
        )));
    }
    Ok(current_ma)
}

/// Validate a scan window against the fitted head.
pub fn check_scan_window(window: &ScanWindow, model: RgaModel) -> Result<(), RgaError> {
    if window.min < SCAN_MASS_MIN || window.max > model.max_mass() {
        return Err(RgaError::Validation(format!(
            "AMU values are outside of allowed bounds [{SCAN_MASS_MIN}, {}], specified: min {}, max {}",
            model.max_mass(),
            window.min,
            window.max
        )));
    }
    if window.min >= window.max {
        return Err(RgaError::Validation(format!(
            "AMU min value must be lower than AMU max value, specified: min {}, max {}",
            window.min, window.max
        )));
    }
    SCAN_RESOLUTION.check(window.resolution)?;
    Ok(())
}

/// `actual` within `fraction` of `expected`, e.g. 0.1 for ±10 %.
pub fn within_fraction(expected: f64, actual: f64, fraction: f64) -> bool {
    let low = expected * (1.0 - fraction);
    let high = expected * (1.0 + fraction);
    low.min(high) <= actual && actual <= low.max(high)
}

/// `actual` within `band` of `expected`, both sides inclusive.
pub fn within_band(expected: f64, actual: f64, band: f64) -> bool {
    // Tiny slack so a readback exactly one step away is not lost to rounding.
    (actual - expected).abs() <= band + 1e-9
}

pub fn floats_match(expected: f64, actual: f64) -> bool {
    (actual - expected).abs() <= expected.abs().max(1.0) * FLOAT_READBACK_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert_eq!(ELECTRON_ENERGY_EV.check(25).unwrap(), 25);
        assert_eq!(ELECTRON_ENERGY_EV.check(105).unwrap(), 105);
        assert!(matches!(
            ELECTRON_ENERGY_EV.check(24),
            Err(RgaError::Validation(_))
        ));
        assert!(PARTIAL_SENS_MA_PER_TORR.check(f64::NAN).is_err());
        assert!(NOISE_FLOOR.check(8).is_err());
    }

    #[test]
    fn test_ion_energy_mapping() {
        assert_eq!(ion_energy_to_code(8).unwrap(), 0);
        assert_eq!(ion_energy_to_code(12).unwrap(), 1);
        assert!(ion_energy_to_code(10).is_err());
        for (ev, _) in ION_ENERGIES {
            assert_eq!(ion_energy_from_code(ion_energy_to_code(ev).unwrap()).unwrap(), ev);
        }
        assert!(ion_energy_from_code(2).is_err());
    }

    #[test]
    fn test_plate_voltage_transform() {
        assert_eq!(plate_voltage_to_wire(90), -90);
        assert_eq!(plate_voltage_from_wire(-90).unwrap(), 90);
        assert_eq!(plate_voltage_from_wire(90).unwrap(), 90);
        assert_eq!(plate_voltage_from_wire(plate_voltage_to_wire(0)).unwrap(), 0);
    }

    #[test]
    fn test_emission_granularity() {
        assert!(check_emission_current(0.0).is_ok());
        assert!(check_emission_current(0.02).is_ok());
        assert!(check_emission_current(1.0).is_ok());
        assert!(check_emission_current(3.5).is_ok());
        assert!(check_emission_current(0.03).is_err());
        assert!(check_emission_current(3.52).is_err());
        assert!(check_emission_current(-0.02).is_err());
    }

    #[test]
    fn test_scan_window_checks() {
        let model = RgaModel::Rga100;
        assert!(check_scan_window(&ScanWindow::new(1, 100, 10), model).is_ok());
        assert!(check_scan_window(&ScanWindow::new(0, 50, 10), model).is_err());
        assert!(check_scan_window(&ScanWindow::new(1, 101, 10), model).is_err());
        assert!(check_scan_window(&ScanWindow::new(20, 20, 10), model).is_err());
        assert!(check_scan_window(&ScanWindow::new(20, 10, 10), model).is_err());
        assert!(check_scan_window(&ScanWindow::new(1, 50, 9), model).is_err());
        assert!(check_scan_window(&ScanWindow::new(1, 50, 26), model).is_err());
        assert!(check_scan_window(&ScanWindow::new(1, 300, 25), RgaModel::Rga300).is_ok());
    }

    #[test]
    fn test_sensitivity_must_be_positive() {
        assert!(matches!(
            check_sensitivity(&PARTIAL_SENS_MA_PER_TORR, 0.0),
            Err(RgaError::Validation(_))
        ));
        assert!(check_sensitivity(&TOTAL_SENS_MA_PER_TORR, -0.0).is_err());
        assert!(check_sensitivity(&TOTAL_SENS_MA_PER_TORR, f64::NAN).is_err());
        assert_eq!(check_sensitivity(&PARTIAL_SENS_MA_PER_TORR, 1e-4).unwrap(), 1e-4);
        assert_eq!(check_sensitivity(&TOTAL_SENS_MA_PER_TORR, 100.0).unwrap(), 100.0);
    }

    #[test]
    fn test_tolerances() {
        assert!(within_fraction(1400.0, 1261.0, 0.1));
        assert!(within_fraction(1400.0, 1539.0, 0.1));
        assert!(!within_fraction(1400.0, 1541.0, 0.1));
        assert!(within_band(1.0, 0.98, 0.02));
        assert!(within_band(1.0, 1.02, 0.02));
        assert!(!within_band(1.0, 1.04, 0.02));
        assert!(floats_match(0.25, 0.25));
        assert!(!floats_match(0.25, 0.2501));
    }
}
