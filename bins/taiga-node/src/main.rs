//! Taiga Exit Node
//!
//! Accepts encrypted tunnel connections and forwards client traffic out
//! through the host's network stack with source NAT.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use taiga_net::{NetProfile, PlatformConfigurator, TunConfig, TunDevice, TunIo, UdpServer, WsServer};
use taiga_node::{Handler, NodeConfig};
use taiga_proto::Protocol;

/// Taiga overlay exit node
#[derive(Parser)]
#[command(name = "taiga-node")]
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

    info!("starting taiga node");

    let config = NodeConfig::from_env().context("failed to parse config")?;
    info!(
        transport = %config.transport,
        listen = %config.listen_addr,
        tun_ip = %config.tun_ip,
        subnet = %config.vpn_subnet,
        "config loaded"
    );

    let tun = TunDevice::open(&TunConfig::new(config.tun_ip))
        .context("failed to create TUN interface")?;
    info!(name = %tun.name(), "TUN interface created");

    let mut platform = PlatformConfigurator::new(tun.name());
    let profile = NetProfile::node(&config.vpn_subnet);
    if let Err(e) = platform.install(&profile).await {
        platform.teardown(&profile).await;
        return Err(e).context("platform network setup failed");
    }

    let tun = Arc::new(tun);
    let handler = Arc::new(Handler::new(tun, config.private_key.clone()));
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

    let egress = {
        let handler = Arc::clone(&handler);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { handler.run_egress(shutdown).await })
    };

    let served = match config.transport {
        Protocol::Wss => match WsServer::bind(&config.listen_addr).await {
            Ok(server) => server.serve(handler, shutdown.clone()).await,
            Err(e) => Err(e),
        },
        Protocol::Udp => match UdpServer::bind(&config.listen_addr).await {
            Ok(server) => server.serve(handler, shutdown.clone()).await,
            Err(e) => Err(e),
        },
    };

    shutdown.cancel();
    let _ = egress.await;
    platform.teardown(&profile).await;

    if let Err(e) = served {
        error!("server error: {}", e);
        std::process::exit(1);
    }

    info!("taiga node stopped");
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
