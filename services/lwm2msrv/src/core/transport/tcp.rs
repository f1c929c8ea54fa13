//! Modbus TCP link

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpSocket};
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::Slave;
use tracing::debug;

use crate::core::config::TcpSettings;
use crate::error::{Lwm2mSrvError, Result};

/// Resolve `host:port`, first address wins
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = lookup_host((host, port)).await.map_err(|e| {
        Lwm2mSrvError::connection(format!("Failed to resolve {}:{}: {}", host, port, e))
    })?;

    addrs.next().ok_or_else(|| {
        Lwm2mSrvError::connection(format!("No address found for {}:{}", host, port))
    })
}

/// Connect with SO_KEEPALIVE per settings and attach a Modbus TCP client
pub async fn connect(
    settings: &TcpSettings,
    slave_id: u8,
    connect_timeout: Duration,
) -> Result<Context> {
    let addr = resolve(&settings.host, settings.port).await?;
    debug!("Resolved {} to {}", settings.host, addr);

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| Lwm2mSrvError::connection(format!("Failed to create socket: {}", e)))?;

    socket.set_keepalive(settings.keep_alive).map_err(|e| {
        Lwm2mSrvError::connection(format!("Failed to set keepalive: {}", e))
    })?;

    let stream = match timeout(connect_timeout, socket.connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(Lwm2mSrvError::connection(format!(
                "Failed to connect to {}: {}",
                addr, e
            )))
        },
        Err(_) => {
            return Err(Lwm2mSrvError::connection(format!(
                "Connect to {} timed out after {} ms",
                addr,
                connect_timeout.as_millis()
            )))
        },
    };
    // Requests are small; do not wait to coalesce frames
    let _ = stream.set_nodelay(true);

    Ok(tcp::attach_slave(stream, Slave(slave_id)))
}
