//! live-relay broker entry point.
//!
//! Binds the loopback and LAN handshake listeners plus the UDP discovery
//! responder, then relays until Ctrl-C.

use tracing_subscriber::EnvFilter;

use live_relay::broker::BrokerServer;
use live_relay::cancel::CancelSignal;
use live_relay::config::BrokerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = BrokerConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(
        loopback = %config.loopback_addr,
        lan = %config.lan_addr,
        discovery = %config.discovery_addr,
        "starting live-relay broker"
    );

    let server = BrokerServer::bind(&config).await?;

    let shutdown = CancelSignal::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }

    server.serve(shutdown).await?;

    Ok(())
}
