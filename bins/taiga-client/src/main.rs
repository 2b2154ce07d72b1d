//! Taiga Tunnel Client
//!
//! Routes all outbound IP traffic through a local virtual interface,
//! encrypted end-to-end to the configured exit node.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use taiga_client::{Client, ClientConfig};
use taiga_net::{NetProfile, PlatformConfigurator, TunConfig, TunDevice, TunIo};

/// Taiga overlay tunnel client
#[derive(Parser)]
#[command(name = "taiga-client")]
#[command(author, version, about)]
struct Cli {
    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    info!("starting taiga client");

    let config = ClientConfig::from_env().context("failed to parse config")?;
    info!(
        local_ip = %config.local_ip,
        node_vpn_ip = %config.node_vpn_ip,
        remote = %config.remote_host,
        "config loaded"
    );

    let tun = TunDevice::open(&TunConfig::new(config.local_ip))
        .context("failed to create TUN interface")?;
    info!(name = %tun.name(), "TUN interface created");

    let mut platform = PlatformConfigurator::new(tun.name());
    let profile = NetProfile::client(
        &config.remote_host,
        &config.gateway_ip.to_string(),
        &config.node_vpn_ip.to_string(),
    );
    if let Err(e) = platform.install(&profile).await {
        platform.teardown(&profile).await;
        return Err(e).context("platform network setup failed");
    }

    let transport = match taiga_net::connect(&config.transport).await {
        Ok(transport) => transport,
        Err(e) => {
            platform.teardown(&profile).await;
            return Err(e).context("failed to connect transport");
        }
    };
    info!("transport connected");

    let client = Client::new(
        config.private_key.clone(),
        config.node_public_key,
        Arc::new(tun),
        Arc::from(transport),
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    info!("tunnel client running");
    if let Err(e) = client.run(shutdown).await {
        error!("client error: {}", e);
    }

    if let Err(e) = client.close().await {
        error!("failed to disconnect transport: {}", e);
    }
    platform.teardown(&profile).await;

    info!("taiga client stopped");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;
    Ok(())
}
