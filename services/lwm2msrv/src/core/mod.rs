//! Mapping and translation engine

pub mod bootstrap;
pub mod config;
pub mod lwm2m;
pub mod marshal;
pub mod registry;
pub mod sensor;
pub mod transport;
