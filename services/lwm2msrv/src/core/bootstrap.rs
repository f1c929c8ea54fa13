//! Service bootstrap: command line, logging and mapping validation

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use crate::core::config::MappingConfig;
use crate::error::{Lwm2mSrvError, Result};

pub const SERVICE_NAME: &str = "lwm2msrv";
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:6060";

/// Command-line arguments for lwm2msrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "lwm2msrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Modbus to LwM2M adapter service",
    long_about = None
)]
pub struct Args {
    /// Modbus mapping file (JSON). The bundled demo mapping is used when absent
    #[arg(short = 't', long = "config", env = "LWM2M_MODBUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Write a daily rolling log file into this directory
    #[arg(long, env = "LWM2M_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// JSON lines in the log file
    #[arg(long)]
    pub log_json: bool,

    /// Bind address for the resource API
    #[arg(short = 'b', long, default_value = DEFAULT_BIND_ADDRESS)]
    pub bind_address: String,

    /// Do not start the resource API
    #[arg(long)]
    pub no_api: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - load and check the mapping, then exit
    #[arg(long)]
    pub validate: bool,
}

pub fn initialize_logging(args: &Args) -> Result<()> {
    let console_level = common::logging::parse_level(&args.log_level)
        .map_err(|e| Lwm2mSrvError::config(e.to_string()))?;

    let log_config = common::logging::LogConfig {
        service_name: SERVICE_NAME.to_string(),
        log_dir: args.log_dir.clone(),
        console_level,
        enable_json: args.log_json,
        ansi: !args.no_color,
    };

    common::logging::init_with_config(log_config)
        .map_err(|e| Lwm2mSrvError::config(format!("Failed to init logging: {}", e)))
}

/// Human readable listing printed by `--validate`
pub fn mapping_summary(config: &MappingConfig) -> Vec<String> {
    let mut lines = vec![
        format!("Transport: {}", config.transport),
        format!("Slave: {}", config.slave_id),
        format!("Objects: {}", config.objects.len()),
    ];

    for (object_id, instances) in &config.objects {
        for (instance_id, resources) in instances.iter().enumerate() {
            for (resource_id, spec) in resources {
                lines.push(format!(
                    "  /{}/{}/{} -> {} @{} x{}",
                    object_id,
                    instance_id,
                    resource_id,
                    spec.register_type,
                    spec.start_address,
                    spec.quantity
                ));
            }
        }
    }
    lines
}

/// Load the mapping without touching the bus
pub fn validate_configuration(args: &Args) -> Result<MappingConfig> {
    let config = MappingConfig::load(args.config.as_deref())?;
    for line in mapping_summary(&config) {
        info!("{}", line);
    }
    info!("Configuration validation completed successfully");
    Ok(config)
}
