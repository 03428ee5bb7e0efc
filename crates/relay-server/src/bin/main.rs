//! localrelay binary: loopback relay for browser pages
//!
//! Run with:
//! ```bash
//! cargo run -p relay-server --bin localrelay -- --config localrelay.json
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use relay_core::SettingsStore;
use relay_server::{plan_startup, RelayServer};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "localrelay")]
#[command(about = "Relay browser requests to local network devices and files")]
struct Args {
    /// Settings file (created with defaults if missing)
    #[arg(long, default_value = "localrelay.json")]
    config: PathBuf,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relay_server=info".parse()?)
                .add_directive("relay_core=info".parse()?),
        )
        .init();

    let args = Args::parse();

    if let Some(addr) = args.metrics_addr {
        relay_server::metrics::init_prometheus_exporter(addr)?;
    }

    let store = SettingsStore::new(&args.config);
    let plan = plan_startup(&store)?;
    let port = plan.port.port;

    let server = RelayServer::bind(plan.config).await?;

    println!("Server started http://localhost:{}", port);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    println!("Server stopped.");
    Ok(())
}
