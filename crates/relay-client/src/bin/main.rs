//! relay-client binary: send operations to a running localrelay
//!
//! Run with:
//! ```bash
//! cargo run -p relay-client -- read ipAddresses.txt
//! ```

use std::io::Write;

use clap::{Parser, Subcommand};
use relay_client::RelayClient;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relay-client")]
#[command(about = "Send operations to a running localrelay")]
struct Args {
    /// Origin to present to the relay
    #[arg(long, default_value = "null")]
    origin: String,

    /// Relay port; the default candidate ports are probed when omitted
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the port the relay is listening on
    Discover,
    /// Fetch a URL through the relay
    Get { url: String },
    /// POST a body to a URL through the relay
    Post { url: String, body: String },
    /// Read a file on the relay's machine
    Read { path: String },
    /// Overwrite a file on the relay's machine
    Write { path: String, data: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relay_client=info".parse()?))
        .init();

    let args = Args::parse();

    let candidates = match args.port {
        Some(port) => vec![port],
        None => relay_core::defaults::PORTS.to_vec(),
    };

    let mut client = RelayClient::new(args.origin);
    let port = client.discover(&candidates).await?;

    let output = match args.command {
        Command::Discover => {
            println!("[OK] Relay on port {}", port);
            return Ok(());
        }
        Command::Get { url } => client.get(&url).await?,
        Command::Post { url, body } => client.post(&url, &body).await?,
        Command::Read { path } => client.read(&path).await?,
        Command::Write { path, data } => {
            client.write(&path, &data).await?;
            println!("[OK] Wrote {} bytes to {}", data.len(), path);
            return Ok(());
        }
    };

    std::io::stdout().write_all(&output)?;
    println!();
    Ok(())
}
