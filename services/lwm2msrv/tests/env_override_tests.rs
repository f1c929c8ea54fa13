//! `LWM2M_MODBUS_*` environment overrides
//!
//! Kept in their own test binary: `Jail` sets real process variables.

use figment::Jail;

use lwm2msrv::core::config::{ConnectionKind, MappingConfig};
use lwm2msrv::Lwm2mSrvError;

#[test]
fn test_slave_override() {
    Jail::expect_with(|jail| {
        jail.set_env("LWM2M_MODBUS_SLAVE", "42");

        let config = MappingConfig::load(None).map_err(|e| e.to_string())?;
        assert_eq!(config.slave_id, 42);
        assert_eq!(config.connection_kind(), ConnectionKind::Tcp);
        Ok(())
    });
}

#[test]
fn test_connection_override_selects_serial_block() {
    Jail::expect_with(|jail| {
        jail.set_env("LWM2M_MODBUS_CONNECTION", "rtu");

        let config = MappingConfig::load(None).map_err(|e| e.to_string())?;
        assert_eq!(config.connection_kind(), ConnectionKind::Rtu);
        assert!(config.transport.to_string().starts_with("rtu /dev/ttyUSB0"));
        Ok(())
    });
}

#[test]
fn test_override_applies_to_mapping_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "site.json",
            r#"{
                "connection": "tcp",
                "slave": 1,
                "tcpSettings": { "node": "127.0.0.1", "port": 502 },
                "objects": {}
            }"#,
        )?;
        jail.set_env("LWM2M_MODBUS_SLAVE", "7");

        let path = jail.directory().join("site.json");
        let config = MappingConfig::load(Some(&path)).map_err(|e| e.to_string())?;
        assert_eq!(config.slave_id, 7);
        Ok(())
    });
}

#[test]
fn test_bogus_override_is_config_error() {
    Jail::expect_with(|jail| {
        jail.set_env("LWM2M_MODBUS_CONNECTION", "bogus");
        assert!(matches!(
            MappingConfig::load(None),
            Err(Lwm2mSrvError::ConfigError(_))
        ));

        jail.clear_env();
        jail.set_env("LWM2M_MODBUS_SLAVE", "300");
        assert!(matches!(
            MappingConfig::load(None),
            Err(Lwm2mSrvError::ConfigError(_))
        ));
        Ok(())
    });
}
