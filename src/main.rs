//! Casino Floor - Entry Point
//!
//! Opens a casino locally, lets it run for a while, then closes it and
//! prints how every player did.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use casino_floor::agent::Lifecycle;
use casino_floor::casino::Casino;
use casino_floor::core::config::CasinoConfig;
use casino_floor::core::error::Result;
use casino_floor::monitor::{poll_feed, FeedServer, FloorSnapshot};
use clap::Parser;

/// Run a casino simulation on this machine
#[derive(Parser, Debug)]
#[command(name = "casino-floor")]
#[command(about = "Simulate a casino of concurrently scheduled agents")]
struct Args {
    /// TOML config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    players: Option<usize>,

    #[arg(long)]
    cashiers: Option<usize>,

    #[arg(long)]
    slot_machines: Option<usize>,

    #[arg(long)]
    croupiers: Option<usize>,

    /// Seats per table
    #[arg(long)]
    capacity: Option<usize>,

    /// How long the casino stays open
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    /// Random seed for the agents' decisions
    #[arg(long)]
    seed: Option<u64>,

    /// Serve the monitor feed over TCP while running
    #[arg(long)]
    monitor: bool,

    /// Print the final snapshot as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn into_config(self) -> Result<CasinoConfig> {
        let mut config = match &self.config {
            Some(path) => CasinoConfig::load(path)?,
            None => CasinoConfig::default(),
        };
        if let Some(players) = self.players {
            config.players = players;
        }
        if let Some(cashiers) = self.cashiers {
            config.cashiers = cashiers;
        }
        if let Some(slot_machines) = self.slot_machines {
            config.slot_machines = slot_machines;
        }
        if let Some(croupiers) = self.croupiers {
            config.croupiers = croupiers;
        }
        if let Some(capacity) = self.capacity {
            config.table_capacity = capacity;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("casino_floor=info")),
        )
        .init();

    let args = Args::parse();
    let duration = Duration::from_secs(args.duration_secs);
    let (monitor, json) = (args.monitor, args.json);
    let config = args.into_config()?;

    let casino = Arc::new(Casino::new(config)?);
    casino.open()?;

    let feed = if monitor {
        Some(FeedServer::bind(Arc::clone(&casino), casino.config().monitor_port()).await?)
    } else {
        None
    };

    // Queue and table report on the cadence a viewer would poll at
    let poller = Lifecycle::new();
    {
        let casino = Arc::clone(&casino);
        let every = casino.config().timings.monitor();
        let stop = poller.stop_signal();
        poller.spawn(poll_feed(casino, every, stop, |snapshot| {
            for croupier in &snapshot.croupiers {
                tracing::debug!(
                    croupier = %croupier.name,
                    state = %croupier.state,
                    seated = %croupier.occupants.join(", "),
                    "Table report"
                );
            }
        }));
    }

    tokio::time::sleep(duration).await;

    let report = casino.close().await;
    poller.request_stop();
    poller.join(None).await;
    if let Some(feed) = feed {
        feed.shutdown().await;
    }

    let snapshot = FloorSnapshot::capture(&casino);
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("\n=== CASINO CLOSED ===");
        for player in &snapshot.players {
            println!(
                "{:<10} {:<5} balance {:>10.2}  chips {}",
                player.name,
                player.state,
                player.balance.unwrap_or_default(),
                player.chips.unwrap_or_default()
            );
        }
        let net = snapshot.net_winnings(casino.config().starting_balance);
        println!("Players net: {:+.2}", net);
    }

    if !report.is_clean() {
        tracing::warn!(
            aborted = ?report.aborted,
            panicked = ?report.panicked,
            "Some agents did not stop cleanly"
        );
    }
    Ok(())
}
