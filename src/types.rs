use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{DeviceError, RgaError};

/// A parameter value supplied by the caller, or a request to use the
/// instrument's own default.
///
/// In configuration files the default is written as the string `"default"`:
///
/// ```
/// use rusty_rga::Setting;
///
/// let s: Setting<u16> = serde_json::from_str("\"default\"").unwrap();
/// assert_eq!(s, Setting::Default);
/// let s: Setting<u16> = serde_json::from_str("70").unwrap();
/// assert_eq!(s, Setting::Value(70));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Setting<T> {
    #[default]
    Default,
    Value(T),
}

impl<T> From<T> for Setting<T> {
    fn from(value: T) -> Self {
        Setting::Value(value)
    }
}

impl<T: fmt::Display> fmt::Display for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Default => write!(f, "default"),
            Setting::Value(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SettingRepr<T> {
    Value(T),
    Keyword(String),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Setting<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match SettingRepr::<T>::deserialize(deserializer)? {
            SettingRepr::Value(v) => Ok(Setting::Value(v)),
            SettingRepr::Keyword(k) if k.eq_ignore_ascii_case("default") => Ok(Setting::Default),
            SettingRepr::Keyword(k) => Err(D::Error::custom(format!(
                "expected a number or \"default\", got \"{k}\""
            ))),
        }
    }
}

impl<T: Serialize> Serialize for Setting<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Setting::Default => serializer.serialize_str("default"),
            Setting::Value(v) => v.serialize(serializer),
        }
    }
}

/// Known SRS RGA heads. The number in the model tag is the highest
/// scannable mass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RgaModel {
    Rga100,
    Rga200,
    Rga300,
}

impl RgaModel {
    const ALL: [RgaModel; 3] = [RgaModel::Rga100, RgaModel::Rga200, RgaModel::Rga300];

    pub fn tag(&self) -> &'static str {
        match self {
            RgaModel::Rga100 => "SRSRGA100",
            RgaModel::Rga200 => "SRSRGA200",
            RgaModel::Rga300 => "SRSRGA300",
        }
    }

    /// Highest mass number (AMU) this head can scan.
    pub fn max_mass(&self) -> u16 {
        match self {
            RgaModel::Rga100 => 100,
            RgaModel::Rga200 => 200,
            RgaModel::Rga300 => 300,
        }
    }

    /// Detect the model from the `ID?` reply, e.g. `SRSRGA200VER0.24SN12345`.
    pub fn from_device_id(id: &str) -> Result<Self, RgaError> {
        Self::ALL
            .into_iter()
            .find(|model| id.contains(model.tag()))
            .ok_or_else(|| DeviceError::UnknownModel(id.to_string()).into())
    }
}

impl fmt::Display for RgaModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Analog scan window: first and last mass (AMU) and steps per AMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub min: u16,
    pub max: u16,
    pub resolution: u16,
}

impl ScanWindow {
    pub fn new(min: u16, max: u16, resolution: u16) -> Self {
        Self {
            min,
            max,
            resolution,
        }
    }

    /// Number of mass samples in one scan pass.
    pub fn points(&self) -> usize {
        (self.max.saturating_sub(self.min)) as usize * self.resolution as usize + 1
    }
}

impl Default for ScanWindow {
    fn default() -> Self {
        Self::new(1, 100, 10)
    }
}

impl fmt::Display for ScanWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{} AMU @ {} steps/AMU",
            self.min, self.max, self.resolution
        )
    }
}

/// One analog scan pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub window: ScanWindow,
    /// Mass axis in AMU, generated from the window.
    pub masses: Vec<f64>,
    /// Partial pressures in Torr, one per mass.
    pub pressures: Vec<f64>,
    /// Total pressure in Torr.
    pub total_pressure: f64,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// Mass and pressure of the highest peak.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.masses
            .iter()
            .copied()
            .zip(self.pressures.iter().copied())
            .fold(None, |best, (m, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((m, p)),
            })
    }
}

/// Outcome of a filament turn-off.
#[derive(Debug, Clone, PartialEq)]
pub enum FilamentOff {
    /// Readback confirmed the emission current (mA) is below one step.
    Confirmed(f64),
    /// The off command was accepted but the readback could not be obtained.
    Unconfirmed(String),
}

impl FilamentOff {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, FilamentOff::Confirmed(_))
    }
}

/// Ion detector in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Detector {
    FaradayCup,
    /// Electron multiplier at the given high voltage (V).
    Multiplier(u16),
}

impl Detector {
    pub fn from_voltage(voltage: u16) -> Self {
        if voltage == 0 {
            Detector::FaradayCup
        } else {
            Detector::Multiplier(voltage)
        }
    }
}
