use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::shutdown::wait_for_shutdown;
use lwm2msrv::api::{create_api_routes, AppState};
use lwm2msrv::core::bootstrap::{self, Args, SERVICE_NAME};
use lwm2msrv::core::config::MappingConfig;
use lwm2msrv::core::lwm2m::BroadcastNotifier;
use lwm2msrv::core::registry::ObjectRegistry;
use lwm2msrv::core::transport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    bootstrap::initialize_logging(&args)?;

    info!("Starting {} v{}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));

    if args.validate {
        bootstrap::validate_configuration(&args)?;
        return Ok(());
    }

    let config = match MappingConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load Modbus mapping: {}", e);
            return Err(e.into());
        },
    };

    let transport = match transport::connect(&config).await {
        Ok(handle) => Arc::new(handle),
        Err(e) => {
            error!("Unable to open Modbus transport: {}", e);
            return Err(e.into());
        },
    };

    let notifier = Arc::new(BroadcastNotifier::default());
    let mut changes = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => debug!("Resource changed: {}", change),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Change listener lagged, {} notification(s) dropped", skipped);
                },
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let registry = Arc::new(ObjectRegistry::build(&config, transport, notifier));
    info!(
        "Serving {} object(s) with {} resource mapping(s)",
        registry.object_ids().len(),
        config.resource_count()
    );

    let token = CancellationToken::new();
    let server = if args.no_api {
        info!("Resource API disabled");
        None
    } else {
        let addr: SocketAddr = args
            .bind_address
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", args.bind_address, e))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1024)?;

        info!("API server listening on http://{}", addr);
        info!("Health check: http://{}/health", addr);

        let app = create_api_routes(AppState::new(registry.clone()));
        let shutdown = token.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                error!("API server error: {}", e);
            }
        }))
    };

    let signal = wait_for_shutdown().await;
    info!("Received {}, shutting down", signal);

    token.cancel();
    if let Some(handle) = server {
        if let Err(e) = handle.await {
            warn!("API server task ended abnormally: {}", e);
        }
    }

    info!("Service shutdown complete");
    Ok(())
}
