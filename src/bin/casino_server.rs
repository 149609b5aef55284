//! Remote launch listener
//!
//! Waits for a client to send the seven launch bytes, runs the casino it
//! describes for the requested number of minutes, then goes back to
//! listening.

use std::path::PathBuf;

use casino_floor::core::config::CasinoConfig;
use casino_floor::core::error::Result;
use casino_floor::net::run_session;
use clap::Parser;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "casino_server")]
#[command(about = "Launch casinos on request from a remote client")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: String,

    /// TOML config supplying everything the launch bytes do not
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve a single session and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("casino_floor=info,casino_server=info")),
        )
        .init();

    let args = Args::parse();
    let base = match &args.config {
        Some(path) => CasinoConfig::load(path)?,
        None => CasinoConfig::default(),
    };

    loop {
        let listener = TcpListener::bind(&args.bind).await?;
        tracing::info!(addr = %listener.local_addr()?, "Casino server waiting for a client");

        match run_session(listener, &base, None).await {
            Ok(params) => tracing::info!(?params, "Session finished"),
            Err(err) => tracing::warn!(error = %err, "Session failed"),
        }
        if args.once {
            return Ok(());
        }
    }
}
