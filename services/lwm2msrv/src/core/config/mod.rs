//! Declarative Modbus mapping

pub mod loader;
pub mod types;

pub use loader::{DEMO_CONFIG, ENV_PREFIX};
pub use types::{
    AsciiSettings, ConnectionKind, MappingConfig, ModbusConfigFile, Parity, RegisterType,
    ResourceMap, ResourceSpec, RtuSettings, TcpSettings, TransportSettings,
};
