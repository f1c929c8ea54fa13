//! Mapping configuration types
//!
//! Two layers live here: the raw serde tree that mirrors the JSON file
//! (`ModbusConfigFile` and friends, camelCase keys) and the validated model
//! the rest of the service works with (`MappingConfig`). Conversion and
//! validation are in [`super::loader`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Lwm2mSrvError, Result};

// ============================================================================
// Raw file schema
// ============================================================================

/// JSON mapping file as written by users
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModbusConfigFile {
    pub connection: Option<String>,
    pub slave: Option<i64>,
    pub tcp_settings: Option<RawTcpSettings>,
    pub serial_settings: Option<RawSerialSettings>,
    pub ascii_settings: Option<RawAsciiSettings>,
    /// objectId -> one resource map per instance
    #[serde(default)]
    pub objects: BTreeMap<String, Vec<BTreeMap<String, RawResourceSpec>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTcpSettings {
    pub node: String,
    pub port: i64,
    #[serde(default)]
    pub keepalive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSerialSettings {
    pub device_name: String,
    pub baud_rate: i64,
    #[serde(default = "default_data_bits")]
    pub data_bits: i64,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: i64,
    #[serde(default)]
    pub parity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAsciiSettings {
    pub device_name: String,
    pub baud_rate: i64,
    #[serde(default)]
    pub parity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResourceSpec {
    #[serde(rename = "type")]
    pub register_type: String,
    #[serde(default)]
    pub start_address: i64,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub poll_millis: i64,
}

fn default_data_bits() -> i64 {
    8
}

fn default_stop_bits() -> i64 {
    1
}

// ============================================================================
// Validated model
// ============================================================================

/// Modbus link variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Tcp,
    Rtu,
    Ascii,
}

impl FromStr for ConnectionKind {
    type Err = Lwm2mSrvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(ConnectionKind::Tcp),
            "rtu" => Ok(ConnectionKind::Rtu),
            "ascii" => Ok(ConnectionKind::Ascii),
            other => Err(Lwm2mSrvError::config(format!(
                "Unknown connection kind '{}' (expected tcp, rtu or ascii)",
                other
            ))),
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKind::Tcp => write!(f, "tcp"),
            ConnectionKind::Rtu => write!(f, "rtu"),
            ConnectionKind::Ascii => write!(f, "ascii"),
        }
    }
}

/// Serial parity
///
/// File encoding: 0 = none, 1 = odd, 2 = even. Codes 3 (mark) and 4 (space)
/// exist in the file format but cannot be driven by the serial backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl TryFrom<i64> for Parity {
    type Error = Lwm2mSrvError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Odd),
            2 => Ok(Parity::Even),
            3 => Err(Lwm2mSrvError::config("Parity MARK (3) is not supported")),
            4 => Err(Lwm2mSrvError::config("Parity SPACE (4) is not supported")),
            other => Err(Lwm2mSrvError::config(format!(
                "Invalid parity code {} (expected 0=none, 1=odd, 2=even)",
                other
            ))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parity::None => write!(f, "N"),
            Parity::Odd => write!(f, "O"),
            Parity::Even => write!(f, "E"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
    pub keep_alive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RtuSettings {
    pub device_path: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

/// ASCII links always run with 8 data bits and 1 stop bit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsciiSettings {
    pub device_path: String,
    pub baud_rate: u32,
    pub parity: Parity,
}

impl AsciiSettings {
    pub const DATA_BITS: u8 = 8;
    pub const STOP_BITS: u8 = 1;
}

/// Settings of the one transport selected by `connection`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportSettings {
    Tcp(TcpSettings),
    Rtu(RtuSettings),
    Ascii(AsciiSettings),
}

impl TransportSettings {
    pub fn kind(&self) -> ConnectionKind {
        match self {
            TransportSettings::Tcp(_) => ConnectionKind::Tcp,
            TransportSettings::Rtu(_) => ConnectionKind::Rtu,
            TransportSettings::Ascii(_) => ConnectionKind::Ascii,
        }
    }
}

impl fmt::Display for TransportSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSettings::Tcp(s) => {
                write!(f, "tcp {}:{} keepalive={}", s.host, s.port, s.keep_alive)
            },
            TransportSettings::Rtu(s) => write!(
                f,
                "rtu {} {} {}{}{}",
                s.device_path, s.baud_rate, s.data_bits, s.parity, s.stop_bits
            ),
            TransportSettings::Ascii(s) => write!(
                f,
                "ascii {} {} {}{}{}",
                s.device_path,
                s.baud_rate,
                AsciiSettings::DATA_BITS,
                s.parity,
                AsciiSettings::STOP_BITS
            ),
        }
    }
}

/// Modbus data table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegisterType {
    HoldingRegister,
    InputRegister,
    Coil,
    DiscreteInput,
}

impl RegisterType {
    /// Largest quantity a single read request may carry
    pub fn max_read_quantity(self) -> u16 {
        if self.is_bit() {
            2000
        } else {
            125
        }
    }

    /// Largest quantity a single multiple-write request may carry
    pub fn max_write_quantity(self) -> u16 {
        match self {
            RegisterType::HoldingRegister => 123,
            RegisterType::Coil => 1968,
            RegisterType::InputRegister | RegisterType::DiscreteInput => 0,
        }
    }

    pub fn is_bit(self) -> bool {
        matches!(self, RegisterType::Coil | RegisterType::DiscreteInput)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, RegisterType::HoldingRegister | RegisterType::Coil)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegisterType::HoldingRegister => "holding-register",
            RegisterType::InputRegister => "input-register",
            RegisterType::Coil => "coil",
            RegisterType::DiscreteInput => "discrete-input",
        }
    }
}

impl FromStr for RegisterType {
    type Err = Lwm2mSrvError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "holding-register" => Ok(RegisterType::HoldingRegister),
            "input-register" => Ok(RegisterType::InputRegister),
            "coil" => Ok(RegisterType::Coil),
            "discrete-input" => Ok(RegisterType::DiscreteInput),
            other => Err(Lwm2mSrvError::config(format!(
                "Unknown register type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one LwM2M resource lives on the slave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceSpec {
    pub register_type: RegisterType,
    pub start_address: u16,
    /// 0 = single scalar, n > 0 = n-instance resource
    pub quantity: u16,
    /// Parsed and kept; nothing polls on it
    pub poll_interval_ms: i64,
}

impl ResourceSpec {
    pub fn effective_quantity(&self) -> u16 {
        if self.quantity == 0 {
            1
        } else {
            self.quantity
        }
    }

    pub fn is_multiple(&self) -> bool {
        self.quantity > 0
    }
}

/// Resource id -> spec, one map per object instance
pub type ResourceMap = BTreeMap<u16, ResourceSpec>;

/// Validated mapping, immutable after load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingConfig {
    pub slave_id: u8,
    pub transport: TransportSettings,
    /// Object id -> instances in file order (instance id = position)
    pub objects: BTreeMap<u16, Vec<ResourceMap>>,
}

impl MappingConfig {
    pub fn connection_kind(&self) -> ConnectionKind {
        self.transport.kind()
    }

    pub fn instance_count(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }

    pub fn resource_count(&self) -> usize {
        self.objects
            .values()
            .flat_map(|instances| instances.iter())
            .map(BTreeMap::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_kind_parsing() {
        assert_eq!("tcp".parse::<ConnectionKind>().unwrap(), ConnectionKind::Tcp);
        assert_eq!("RTU".parse::<ConnectionKind>().unwrap(), ConnectionKind::Rtu);
        assert_eq!(
            " ascii ".parse::<ConnectionKind>().unwrap(),
            ConnectionKind::Ascii
        );

        let err = "bogus".parse::<ConnectionKind>().unwrap_err();
        assert!(matches!(err, Lwm2mSrvError::ConfigError(_)));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_parity_codes() {
        assert_eq!(Parity::try_from(0).unwrap(), Parity::None);
        assert_eq!(Parity::try_from(1).unwrap(), Parity::Odd);
        assert_eq!(Parity::try_from(2).unwrap(), Parity::Even);
        assert!(Parity::try_from(3).is_err());
        assert!(Parity::try_from(4).is_err());
        assert!(Parity::try_from(-1).is_err());
    }

    #[test]
    fn test_register_type_capabilities() {
        assert!(RegisterType::HoldingRegister.is_writable());
        assert!(RegisterType::Coil.is_writable());
        assert!(!RegisterType::InputRegister.is_writable());
        assert!(!RegisterType::DiscreteInput.is_writable());

        assert_eq!(RegisterType::InputRegister.max_read_quantity(), 125);
        assert_eq!(RegisterType::DiscreteInput.max_read_quantity(), 2000);
        assert_eq!(RegisterType::HoldingRegister.max_write_quantity(), 123);
        assert_eq!(RegisterType::Coil.max_write_quantity(), 1968);

        assert_eq!(
            "discrete-input".parse::<RegisterType>().unwrap(),
            RegisterType::DiscreteInput
        );
        assert!("analog-output".parse::<RegisterType>().is_err());
    }

    #[test]
    fn test_effective_quantity() {
        let spec = ResourceSpec {
            register_type: RegisterType::InputRegister,
            start_address: 0,
            quantity: 0,
            poll_interval_ms: 0,
        };
        assert_eq!(spec.effective_quantity(), 1);
        assert!(!spec.is_multiple());

        let spec = ResourceSpec { quantity: 6, ..spec };
        assert_eq!(spec.effective_quantity(), 6);
        assert!(spec.is_multiple());
    }
}
