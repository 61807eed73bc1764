pub mod client;
pub mod params;
pub mod protocol;
pub mod reader;
pub mod spectrum;
pub mod status;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{ConnectionConfig, RgaClient, RgaClientBuilder};
pub use protocol::{CommandArg, Protocol};
pub use reader::ChunkedReader;
pub use status::StatusByte;
pub use transport::{SerialSettings, SerialTransport, Transport};
