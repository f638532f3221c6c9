//! FTP server entry point
//!
//! Loads configuration, initialises logging and runs the accept loop.

use clap::Parser;
use log::{error, info};

use ftp_engine::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "ftp-engine", version, about = "Minimal FTP server")]
struct Args {
    /// Configuration file (TOML); defaults to ./config.toml when present
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG overrides the default filter
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig::load(args.config.as_deref()).inspect_err(|e| {
        error!("Invalid configuration: {e}");
    })?;

    info!("Launching FTP server...");
    let server = Server::bind(config).await?;
    server.run().await;
    Ok(())
}
