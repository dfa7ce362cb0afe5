use std::time::Duration;

use clap::Parser;
use relaychat::prelude::*;
use tracing::{info, warn};

/// Multi-user chat relay.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on.
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Interface to bind to.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Most clients served at once (unlimited when omitted).
    #[arg(long)]
    max_connections: Option<usize>,

    /// Seconds a new client gets to finish the WebSocket handshake.
    #[arg(long, default_value_t = 10)]
    handshake_timeout: u64,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    init_tracing();

    let cli = Cli::parse();
    let server = RelayServer::builder()
        .config(ServerConfig {
            bind_addr: format!("{}:{}", cli.host, cli.port),
            max_connections: cli.max_connections,
            handshake_timeout: Duration::from_secs(cli.handshake_timeout),
        })
        .build()
        .await?;
    info!(addr = %server.local_addr()?, "relay listening");

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => shutdown.shutdown(),
            Err(error) => warn!(?error, "ctrl-c handler failed"),
        }
    });

    server.run().await
}
