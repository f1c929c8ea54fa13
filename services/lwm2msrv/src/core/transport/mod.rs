//! Modbus transport layer
//!
//! One [`TransportHandle`] is opened at startup from the mapping's
//! `connection` block and shared by every object instance.
//!
//! ```text
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ ModbusSensor │ │ ModbusSensor │ │ ModbusSensor │   one per instance
//! └──────┬───────┘ └──────┬───────┘ └──────┬───────┘
//!        └────────────────┼────────────────┘
//!                         ▼
//! ┌──────────────────────────────────────────────────┐
//! │ TransportHandle (mutex + 1000 ms timeout)        │
//! └──────────────────────────────────────────────────┘
//!                         │ Box<dyn ModbusMaster>
//!       ┌─────────────────┼─────────────────┐
//!       ▼                 ▼                 ▼
//! ┌───────────┐     ┌───────────┐     ┌────────────┐
//! │    TCP    │     │    RTU    │     │   ASCII    │
//! │ (tokio-   │     │ (tokio-   │     │ AsciiCodec │
//! │  modbus)  │     │  modbus)  │     │ over serial│
//! └───────────┘     └───────────┘     └────────────┘
//! ```
//!
//! There is no reconnect after a lost link and no retry: an exchange either
//! completes within the response timeout or fails that one request. A
//! timed-out exchange marks the link stale; the next exchange first lets the
//! master drop the late reply (see [`ModbusMaster::resync`]).

pub mod ascii;
pub mod context;
#[cfg(test)]
pub mod mock;
pub mod serial;
pub mod tcp;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::config::{ConnectionKind, MappingConfig, TransportSettings};
use crate::error::{Lwm2mSrvError, Result};

/// Response timeout applied to every exchange and to the TCP connect
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Modbus master operations used by the translator
///
/// Every call names the slave explicitly. Failures are
/// `Lwm2mSrvError::OperationError` (bus fault or exception response).
#[async_trait]
pub trait ModbusMaster: Send {
    async fn read_coils(&mut self, slave: u8, addr: u16, qty: u16) -> Result<Vec<bool>>;

    async fn read_discrete_inputs(&mut self, slave: u8, addr: u16, qty: u16)
        -> Result<Vec<bool>>;

    async fn read_holding_registers(&mut self, slave: u8, addr: u16, qty: u16)
        -> Result<Vec<u16>>;

    async fn read_input_registers(&mut self, slave: u8, addr: u16, qty: u16) -> Result<Vec<u16>>;

    async fn write_single_coil(&mut self, slave: u8, addr: u16, value: bool) -> Result<()>;

    async fn write_multiple_coils(&mut self, slave: u8, addr: u16, values: &[bool]) -> Result<()>;

    async fn write_single_register(&mut self, slave: u8, addr: u16, value: u16) -> Result<()>;

    async fn write_multiple_registers(
        &mut self,
        slave: u8,
        addr: u16,
        values: &[u16],
    ) -> Result<()>;

    /// Discard a reply to an abandoned request, waiting at most `window`
    ///
    /// Called before the next exchange whenever the previous one timed out.
    /// Links that match replies to requests (Modbus TCP transaction ids) keep
    /// the default no-op.
    async fn resync(&mut self, _window: Duration) -> Result<()> {
        Ok(())
    }
}

struct Link {
    master: Box<dyn ModbusMaster>,
    /// Previous exchange timed out and its reply may still arrive
    stale: bool,
}

/// Shared connection to the slave network
///
/// The mutex is held for one request/response exchange and released on
/// every exit path, including timeout.
pub struct TransportHandle {
    kind: ConnectionKind,
    description: String,
    response_timeout: Duration,
    link: Mutex<Link>,
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

impl TransportHandle {
    pub fn new(
        kind: ConnectionKind,
        description: impl Into<String>,
        master: Box<dyn ModbusMaster>,
    ) -> Self {
        Self {
            kind,
            description: description.into(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            link: Mutex::new(Link {
                master,
                stale: false,
            }),
        }
    }

    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.response_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Lwm2mSrvError::timeout(format!(
                "{} got no response within {} ms",
                op,
                self.response_timeout.as_millis()
            ))),
        }
    }

    /// Lock the link, resyncing first if the last exchange was abandoned
    async fn acquire(&self) -> tokio::sync::MutexGuard<'_, Link> {
        let mut link = self.link.lock().await;
        if link.stale {
            debug!("Resyncing {} after a timed-out exchange", self.description);
            if let Err(e) = link.master.resync(self.response_timeout).await {
                warn!("Resync of {} failed: {}", self.description, e);
            }
            link.stale = false;
        }
        link
    }

    fn settle<T>(link: &mut Link, result: Result<T>) -> Result<T> {
        if matches!(result, Err(Lwm2mSrvError::TimeoutError(_))) {
            link.stale = true;
        }
        result
    }

    pub async fn read_coils(&self, slave: u8, addr: u16, qty: u16) -> Result<Vec<bool>> {
        let mut link = self.acquire().await;
        let result = self
            .bounded("read coils", link.master.read_coils(slave, addr, qty))
            .await;
        Self::settle(&mut link, result)
    }

    pub async fn read_discrete_inputs(&self, slave: u8, addr: u16, qty: u16) -> Result<Vec<bool>> {
        let mut link = self.acquire().await;
        let result = self
            .bounded("read discrete inputs", link.master.read_discrete_inputs(slave, addr, qty))
            .await;
        Self::settle(&mut link, result)
    }

    pub async fn read_holding_registers(&self, slave: u8, addr: u16, qty: u16) -> Result<Vec<u16>> {
        let mut link = self.acquire().await;
        let result = self
            .bounded("read holding registers", link.master.read_holding_registers(slave, addr, qty))
            .await;
        Self::settle(&mut link, result)
    }

    pub async fn read_input_registers(&self, slave: u8, addr: u16, qty: u16) -> Result<Vec<u16>> {
        let mut link = self.acquire().await;
        let result = self
            .bounded("read input registers", link.master.read_input_registers(slave, addr, qty))
            .await;
        Self::settle(&mut link, result)
    }

    pub async fn write_single_coil(&self, slave: u8, addr: u16, value: bool) -> Result<()> {
        let mut link = self.acquire().await;
        let result = self
            .bounded("write single coil", link.master.write_single_coil(slave, addr, value))
            .await;
        Self::settle(&mut link, result)
    }

    pub async fn write_multiple_coils(&self, slave: u8, addr: u16, values: &[bool]) -> Result<()> {
        let mut link = self.acquire().await;
        let result = self
            .bounded("write multiple coils", link.master.write_multiple_coils(slave, addr, values))
            .await;
        Self::settle(&mut link, result)
    }

    pub async fn write_single_register(&self, slave: u8, addr: u16, value: u16) -> Result<()> {
        let mut link = self.acquire().await;
        let result = self
            .bounded("write single register", link.master.write_single_register(slave, addr, value))
            .await;
        Self::settle(&mut link, result)
    }

    pub async fn write_multiple_registers(
        &self,
        slave: u8,
        addr: u16,
        values: &[u16],
    ) -> Result<()> {
        let mut link = self.acquire().await;
        let result = self
            .bounded(
                "write multiple registers",
                link.master.write_multiple_registers(slave, addr, values),
            )
            .await;
        Self::settle(&mut link, result)
    }
}

/// Open the transport selected by the mapping's `connection` block
///
/// Failures are `ConnectionError` and are fatal to startup.
pub async fn connect(config: &MappingConfig) -> Result<TransportHandle> {
    let description = config.transport.to_string();

    let master: Box<dyn ModbusMaster> = match &config.transport {
        TransportSettings::Tcp(settings) => {
            info!(
                "Starting Modbus TCP master with settings: [{}, {}, {}]",
                settings.host, settings.port, settings.keep_alive
            );
            Box::new(tcp::connect(settings, config.slave_id, DEFAULT_RESPONSE_TIMEOUT).await?)
        },
        TransportSettings::Rtu(settings) => {
            info!(
                "Starting Modbus RTU master with settings: [{}, {}, {}, {}, {}]",
                settings.device_path,
                settings.baud_rate,
                settings.data_bits,
                settings.stop_bits,
                settings.parity
            );
            Box::new(serial::connect_rtu(settings, config.slave_id)?)
        },
        TransportSettings::Ascii(settings) => {
            info!(
                "Starting Modbus ASCII master with settings: [{}, {}, {}]",
                settings.device_path, settings.baud_rate, settings.parity
            );
            Box::new(serial::connect_ascii(settings)?)
        },
    };

    info!("Modbus transport ready: {}", description);
    Ok(TransportHandle::new(
        config.connection_kind(),
        description,
        master,
    ))
}
