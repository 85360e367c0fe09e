//! Main entry point for the stagelink supervisor binary
//!
//! Wires the real service implementations together with dependency injection,
//! auto-starts the managed processes, and shuts everything down on Ctrl+C.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info};

use stagelink::services::{BroadcastNotifier, HttpProber, RealProcessSpawner};
use stagelink::{BridgeConfig, ProcessKind, Supervisor, UiEvent};

/// Supervisor for the stagelink presentation bridge
#[derive(Parser)]
#[command(name = "stagelink")]
#[command(about = "Supervises the local web server and tunnel for the presentation bridge")]
pub struct Args {
    /// Host the local web server binds to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port the local web server binds to
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// Bearer token handed to the web server
    #[arg(long)]
    pub auth_token: Option<String>,

    /// Tunnel URL; when omitted the tunnel process is never started
    #[arg(long)]
    pub tunnel_url: Option<String>,

    /// Host of the upstream presentation-control application
    #[arg(long, default_value = "127.0.0.1")]
    pub upstream_host: String,

    /// Port of the upstream presentation-control API
    #[arg(long, default_value = "1025")]
    pub upstream_port: u16,

    /// Path to the web server executable
    #[arg(long, default_value = "stagelink-web")]
    pub web_server_bin: PathBuf,

    /// Path to the tunnel executable
    #[arg(long, default_value = "cloudflared")]
    pub tunnel_bin: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Do not start the managed processes on launch
    #[arg(long)]
    pub no_autostart: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    stagelink::logging::init_tracing(&args.log_level);

    let config = BridgeConfig {
        server_host: args.host,
        server_port: args.port,
        auth_token: args.auth_token,
        tunnel_url: args.tunnel_url,
        upstream_host: args.upstream_host,
        upstream_port: args.upstream_port,
        web_server_bin: args.web_server_bin,
        tunnel_bin: args.tunnel_bin,
    };

    let notifier = BroadcastNotifier::new();
    let mut events = notifier.subscribe();

    let supervisor = Supervisor::new(RealProcessSpawner::new(), HttpProber::new(), notifier, config);

    // Without a UI attached, surface status transitions on the debug log so
    // the notification channel is observable from a terminal.
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(UiEvent::Status(snapshot)) => debug!(
                    "status: web={} tunnel={:?} upstream={}",
                    snapshot.web_server.state, snapshot.health.tunnel, snapshot.health.upstream_connected
                ),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    supervisor.start_health_monitor().await;

    if !args.no_autostart {
        supervisor.start(ProcessKind::WebServer).await?;
        let tunnel_configured = supervisor.config().await.tunnel_url.is_some();
        if tunnel_configured {
            supervisor.start(ProcessKind::Tunnel).await?;
        }
    }

    info!("🚀 stagelink supervisor running; press Ctrl+C to stop");
    signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
    info!("🛑 shutting down");

    supervisor.shutdown().await?;
    info!("✅ supervisor stopped gracefully");
    Ok(())
}
