pub mod config;
pub mod error;
pub mod logger;
pub mod plotting;
pub mod rga;
pub mod types;

pub use crate::config::{AppConfig, InstrumentSettings, load_config, load_config_or_default};
pub use error::{DeviceError, ProtocolError, RgaError};
pub use logger::{Logger, ScanLogger, ScanRecord};
pub use plotting::{format_pressure, plot_spectrum, plot_trend};
pub use rga::{
    ChunkedReader, CommandArg, ConnectionConfig, Protocol, RgaClient, RgaClientBuilder,
    SerialSettings, SerialTransport, StatusByte, Transport,
};
pub use types::{Detector, FilamentOff, RgaModel, ScanWindow, Setting, Spectrum};
