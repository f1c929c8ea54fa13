//! Mapping file loading and validation
//!
//! Sources, lowest priority first:
//! 1. the JSON mapping file (or the bundled demo mapping)
//! 2. `LWM2M_MODBUS_CONNECTION` / `LWM2M_MODBUS_SLAVE` environment overrides

use std::collections::BTreeMap;
use std::path::Path;

use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use tracing::{info, warn};

use super::types::*;
use crate::error::{Lwm2mSrvError, Result};

/// Demo mapping used when no file is given on the command line
pub const DEMO_CONFIG: &str = include_str!("../../../config/modbus.json");

pub const ENV_PREFIX: &str = "LWM2M_MODBUS_";

impl MappingConfig {
    /// Load from `path`, or the bundled demo mapping when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                info!("Loading default demo Modbus configuration");
                Self::from_json_str(DEMO_CONFIG)
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Lwm2mSrvError::config(format!(
                "Mapping file not found: {}",
                path.display()
            )));
        }

        info!("Loading Modbus configuration from {}", path.display());
        let raw: ModbusConfigFile = with_env_overrides(Figment::new().merge(Json::file(path)))
            .extract()
            .map_err(|e| {
                Lwm2mSrvError::config(format!("Failed to parse {}: {}", path.display(), e))
            })?;

        Self::from_raw(raw)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: ModbusConfigFile = with_env_overrides(Figment::new().merge(Json::string(json)))
            .extract()
            .map_err(|e| Lwm2mSrvError::config(format!("Failed to parse mapping: {}", e)))?;

        Self::from_raw(raw)
    }

    /// Validate the raw tree into the typed model
    pub fn from_raw(raw: ModbusConfigFile) -> Result<Self> {
        let kind: ConnectionKind = raw
            .connection
            .as_deref()
            .ok_or_else(|| Lwm2mSrvError::config("no 'connection' information found"))?
            .parse()?;

        let slave = raw
            .slave
            .ok_or_else(|| Lwm2mSrvError::config("no 'slave' id found"))?;
        let slave_id = u8::try_from(slave).map_err(|_| {
            Lwm2mSrvError::config(format!("Slave id {} out of range 0..=255", slave))
        })?;

        let transport = match kind {
            ConnectionKind::Tcp => {
                let raw = raw.tcp_settings.ok_or_else(|| {
                    Lwm2mSrvError::config("connection 'tcp' requires a 'tcpSettings' block")
                })?;
                TransportSettings::Tcp(validate_tcp(raw)?)
            },
            ConnectionKind::Rtu => {
                let raw = raw.serial_settings.ok_or_else(|| {
                    Lwm2mSrvError::config("connection 'rtu' requires a 'serialSettings' block")
                })?;
                TransportSettings::Rtu(validate_rtu(raw)?)
            },
            ConnectionKind::Ascii => {
                let raw = raw.ascii_settings.ok_or_else(|| {
                    Lwm2mSrvError::config("connection 'ascii' requires an 'asciiSettings' block")
                })?;
                TransportSettings::Ascii(validate_ascii(raw)?)
            },
        };

        let mut objects = BTreeMap::new();
        for (object_key, instances) in raw.objects {
            let object_id: u16 = object_key.trim().parse().map_err(|_| {
                Lwm2mSrvError::config(format!("Invalid object id '{}'", object_key))
            })?;

            let mut maps = Vec::with_capacity(instances.len());
            for (instance_id, resources) in instances.into_iter().enumerate() {
                maps.push(validate_instance(object_id, instance_id, resources)?);
            }
            objects.insert(object_id, maps);
        }

        let config = MappingConfig {
            slave_id,
            transport,
            objects,
        };

        info!(
            "Mapping loaded: {} transport, slave {}, {} objects, {} instances, {} resources",
            config.connection_kind(),
            config.slave_id,
            config.objects.len(),
            config.instance_count(),
            config.resource_count()
        );

        Ok(config)
    }
}

fn with_env_overrides(figment: Figment) -> Figment {
    figment.merge(Env::prefixed(ENV_PREFIX).only(&["connection", "slave"]))
}

fn validate_tcp(raw: RawTcpSettings) -> Result<TcpSettings> {
    if raw.node.trim().is_empty() {
        return Err(Lwm2mSrvError::config("tcpSettings.node cannot be empty"));
    }
    let port = match u16::try_from(raw.port) {
        Ok(port) if port != 0 => port,
        _ => {
            return Err(Lwm2mSrvError::config(format!(
                "tcpSettings.port {} out of range 1..=65535",
                raw.port
            )))
        },
    };

    Ok(TcpSettings {
        host: raw.node.trim().to_string(),
        port,
        keep_alive: raw.keepalive,
    })
}

fn validate_device(section: &str, device: &str, baud_rate: i64) -> Result<u32> {
    if device.trim().is_empty() {
        return Err(Lwm2mSrvError::config(format!(
            "{}.deviceName cannot be empty",
            section
        )));
    }
    match u32::try_from(baud_rate) {
        Ok(baud) if baud > 0 => Ok(baud),
        _ => Err(Lwm2mSrvError::config(format!(
            "{}.baudRate must be greater than zero, got {}",
            section, baud_rate
        ))),
    }
}

fn validate_rtu(raw: RawSerialSettings) -> Result<RtuSettings> {
    let baud_rate = validate_device("serialSettings", &raw.device_name, raw.baud_rate)?;

    if !(5..=8).contains(&raw.data_bits) {
        return Err(Lwm2mSrvError::config(format!(
            "serialSettings.dataBits must be 5, 6, 7 or 8, got {}",
            raw.data_bits
        )));
    }
    if !(1..=2).contains(&raw.stop_bits) {
        return Err(Lwm2mSrvError::config(format!(
            "serialSettings.stopBits must be 1 or 2, got {}",
            raw.stop_bits
        )));
    }

    Ok(RtuSettings {
        device_path: raw.device_name.trim().to_string(),
        baud_rate,
        data_bits: raw.data_bits as u8,
        stop_bits: raw.stop_bits as u8,
        parity: Parity::try_from(raw.parity)?,
    })
}

fn validate_ascii(raw: RawAsciiSettings) -> Result<AsciiSettings> {
    let baud_rate = validate_device("asciiSettings", &raw.device_name, raw.baud_rate)?;

    Ok(AsciiSettings {
        device_path: raw.device_name.trim().to_string(),
        baud_rate,
        parity: Parity::try_from(raw.parity)?,
    })
}

fn validate_instance(
    object_id: u16,
    instance_id: usize,
    resources: BTreeMap<String, RawResourceSpec>,
) -> Result<ResourceMap> {
    let mut map = ResourceMap::new();

    for (resource_key, raw) in resources {
        let path = format!("/{}/{}/{}", object_id, instance_id, resource_key);
        let resource_id: u16 = resource_key
            .trim()
            .parse()
            .map_err(|_| Lwm2mSrvError::config(format!("Invalid resource id at {}", path)))?;

        // Unknown kinds stay unmapped and answer NotFound at request time
        let register_type = match raw.register_type.parse::<RegisterType>() {
            Ok(t) => t,
            Err(_) => {
                warn!(
                    "Skipping {}: unknown register type '{}'",
                    path, raw.register_type
                );
                continue;
            },
        };

        let start_address = u16::try_from(raw.start_address).map_err(|_| {
            Lwm2mSrvError::config(format!(
                "{}: startAddress {} out of range 0..=65535",
                path, raw.start_address
            ))
        })?;

        let max = register_type.max_read_quantity();
        let quantity = match u16::try_from(raw.quantity) {
            Ok(q) if q <= max => q,
            _ => {
                return Err(Lwm2mSrvError::config(format!(
                    "{}: quantity {} out of range 0..={} for {}",
                    path, raw.quantity, max, register_type
                )))
            },
        };

        let spec = ResourceSpec {
            register_type,
            start_address,
            quantity,
            poll_interval_ms: raw.poll_millis,
        };

        if u32::from(start_address) + u32::from(spec.effective_quantity()) > 0x1_0000 {
            return Err(Lwm2mSrvError::config(format!(
                "{}: {} addresses from {} exceed the Modbus address space",
                path,
                spec.effective_quantity(),
                start_address
            )));
        }
        if raw.poll_millis < 0 {
            return Err(Lwm2mSrvError::config(format!(
                "{}: pollMillis cannot be negative",
                path
            )));
        }

        map.insert(resource_id, spec);
    }

    Ok(map)
}
