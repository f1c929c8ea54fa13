//! LwM2M Modbus Adapter Library (lwm2msrv)
//!
//! Exposes the coils and registers of one Modbus slave as LwM2M object
//! resources. A declarative JSON mapping says which register backs which
//! `/object/instance/resource` path; every LwM2M read or write on a mapped
//! resource becomes exactly one Modbus request on a shared bus connection.
//!
//! # Features
//!
//! - **Transports**: Modbus TCP, RTU and ASCII over a serial line
//! - **Mapping**: JSON file with environment overrides, validated at load
//! - **Translation**: single and multi-instance resources, bit and word types
//! - **Serialization**: one request in flight per connection, bounded by a response timeout
//! - **REST API**: local HTTP/JSON view of the mapped resources
//! - **Logging**: tracing console output plus optional daily rolling files
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  Mapping (JSON) │───►│ Object Registry │───►│  Modbus Sensor  │
//! │  figment + env  │    │ (obj -> insts)  │    │ (one instance)  │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//!                                 ▲                       │
//!                                 │                       ▼
//!                        ┌─────────────────┐    ┌─────────────────┐
//!                        │   API Server    │    │ TransportHandle │
//!                        │   (REST/HTTP)   │    │ TCP / RTU/ASCII │
//!                        └─────────────────┘    └─────────────────┘
//! ```
//!
//! - **`core::config`**: mapping file types, loader and validation
//! - **`core::transport`**: Modbus masters behind one serialized handle
//! - **`core::sensor`**: read/write translation for one object instance
//! - **`core::registry`**: object instances built from the mapping
//! - **`core::lwm2m`**: resource values, response codes, notification seam
//! - **`api`**: HTTP routes over the registry
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lwm2msrv::core::config::MappingConfig;
//! use lwm2msrv::core::lwm2m::{BroadcastNotifier, ReadResponse};
//! use lwm2msrv::core::registry::ObjectRegistry;
//! use lwm2msrv::core::transport;
//!
//! #[tokio::main]
//! async fn main() -> lwm2msrv::Result<()> {
//!     let config = MappingConfig::load(None)?;
//!     let transport = Arc::new(transport::connect(&config).await?);
//!     let registry = ObjectRegistry::build(
//!         &config,
//!         transport,
//!         Arc::new(BroadcastNotifier::default()),
//!     );
//!
//!     if let ReadResponse::Content(resource) = registry.read(3303, 0, 5700).await {
//!         println!("temperature: {}", resource);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Mapping File
//!
//! ```json
//! {
//!   "connection": "tcp",
//!   "slave": 1,
//!   "tcpSettings": { "node": "127.0.0.1", "port": 502, "keepalive": true },
//!   "objects": {
//!     "3303": [ { "5700": { "type": "input-register", "startAddress": 0 } } ]
//!   }
//! }
//! ```
//!
//! `LWM2M_MODBUS_CONNECTION` and `LWM2M_MODBUS_SLAVE` override the
//! top-level fields of the file.
//!
//! # Error Handling
//!
//! Startup failures surface as [`Lwm2mSrvError`]. Failures of a single
//! request never escape the sensor: they are logged and answered with an
//! internal-error response.

pub mod api;
pub mod core;
pub mod error;

pub use error::{Lwm2mSrvError, Result};
