use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::rga::ConnectionConfig;
use crate::types::{ScanWindow, Setting};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub instrument: InstrumentSettings,
    pub scan: ScanConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub poll_interval_ms: u64,
    pub read_timeout_ms: u64,
}

/// Values applied to the instrument when a session is opened.
///
/// Every field accepts either a number or `"default"`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct InstrumentSettings {
    pub electron_energy_ev: Setting<u16>,
    pub ion_energy_ev: Setting<u8>,
    pub plate_voltage_v: Setting<u16>,
    /// Setpoint used by the next filament turn-on.
    pub emission_current_ma: Setting<f64>,
    /// 0 selects the Faraday cup.
    pub cdem_voltage_v: Setting<u16>,
    pub noise_floor: Setting<u8>,
    /// `"default"` adopts the factor stored in the head.
    pub partial_sens_ma_per_torr: Setting<f64>,
    pub total_sens_ma_per_torr: Setting<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    pub amu_min: u16,
    pub amu_max: u16,
    pub resolution: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
    pub scan_logging: bool,
    pub output_path: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            poll_interval_ms: 500,
            read_timeout_ms: 5000,
        }
    }
}

impl SerialConfig {
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            electron_energy_ev: Setting::Default,
            ion_energy_ev: Setting::Default,
            plate_voltage_v: Setting::Default,
            emission_current_ma: Setting::Default,
            cdem_voltage_v: Setting::Value(0),
            noise_floor: Setting::Default,
            partial_sens_ma_per_torr: Setting::Default,
            total_sens_ma_per_torr: Setting::Default,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        let window = ScanWindow::default();
        Self {
            amu_min: window.min,
            amu_max: window.max,
            resolution: window.resolution,
        }
    }
}

impl ScanConfig {
    pub fn window(&self) -> ScanWindow {
        ScanWindow::new(self.amu_min, self.amu_max, self.resolution)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            scan_logging: false,
            output_path: "./scans".to_string(),
        }
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else {
        for path in ["rga.toml", "config.toml"] {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
                break;
            }
        }
    }

    // Add environment variable overrides with prefix "RUSTY_RGA_"
    builder = builder.add_source(
        Environment::with_prefix("RUSTY_RGA")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize::<AppConfig>()
}

/// Load configuration, falling back to defaults on any error
pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[serial]
port = "/dev/ttyUSB3"

[instrument]
electron_energy_ev = 80
ion_energy_ev = "default"
emission_current_ma = 0.5
partial_sens_ma_per_torr = 0.12

[scan]
amu_max = 50
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB3");
        assert_eq!(config.serial.poll_interval_ms, 500);
        assert_eq!(config.instrument.electron_energy_ev, Setting::Value(80));
        assert_eq!(config.instrument.ion_energy_ev, Setting::Default);
        assert_eq!(config.instrument.emission_current_ma, Setting::Value(0.5));
        assert_eq!(config.instrument.partial_sens_ma_per_torr, Setting::Value(0.12));
        assert_eq!(config.instrument.cdem_voltage_v, Setting::Value(0));
        assert_eq!(config.scan.window(), ScanWindow::new(1, 50, 10));
    }

    #[test]
    fn test_missing_file() {
        let missing = Path::new("/nonexistent/rga.toml");
        assert!(load_config(Some(missing)).is_err());
        let config = load_config_or_default(Some(missing));
        assert_eq!(config.instrument, InstrumentSettings::default());
    }

    #[test]
    fn test_connection_config() {
        let connection = SerialConfig::default().connection();
        assert_eq!(connection.poll_interval, Duration::from_millis(500));
        assert_eq!(connection.read_timeout, Duration::from_secs(5));
        assert_eq!(connection.line_attempts(), 10);
    }
}
