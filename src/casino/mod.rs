//! Casino orchestrator
//!
//! Owns the floor and the players. `open` starts resources before the
//! players that consume them; `close` drains players first and only then
//! stops the resources, so nobody is left waiting on a gate that will never
//! open again.

pub mod cashier;
pub mod croupier;
pub mod floor;
pub mod player;
pub mod slot_machine;
pub mod wallet;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::agent::{Agent, JoinOutcome};
use crate::core::config::CasinoConfig;
use crate::core::error::{CasinoError, Result};

pub use cashier::{Cashier, CashierGate, CashierState, Exchange, QueueTicket, Receipt};
pub use croupier::{Croupier, CroupierState, GameType};
pub use floor::Floor;
pub use player::{Player, PlayerState};
pub use slot_machine::{SlotMachine, SlotMachineState};
pub use wallet::Wallet;

/// What happened to each agent during `close`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReport {
    pub finished: usize,
    pub aborted: Vec<String>,
    pub panicked: Vec<String>,
}

impl CloseReport {
    fn record(&mut self, name: &str, outcome: JoinOutcome) {
        match outcome {
            JoinOutcome::Finished | JoinOutcome::NotRunning => self.finished += 1,
            JoinOutcome::Aborted => {
                warn!(agent = %name, "Agent did not stop in time and was cancelled");
                self.aborted.push(name.to_string());
            }
            JoinOutcome::Panicked => {
                error!(agent = %name, "Agent task panicked");
                self.panicked.push(name.to_string());
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty() && self.panicked.is_empty()
    }
}

#[derive(Debug)]
pub struct Casino {
    floor: Arc<Floor>,
    players: Vec<Arc<Player>>,
    opened: AtomicBool,
    closing: tokio::sync::Mutex<bool>,
}

impl Casino {
    /// Build a casino with every agent created but none started
    pub fn new(config: CasinoConfig) -> Result<Self> {
        config.validate().map_err(CasinoError::InvalidConfig)?;

        let floor = Arc::new(Floor::new(&config));
        let entrance = config.layout.entrance;
        let players = (1..=config.players)
            .map(|n| {
                Arc::new(Player::new(
                    &format!("Player{}", n),
                    n,
                    config.starting_balance,
                    0,
                    entrance,
                ))
            })
            .collect();

        Ok(Self {
            floor,
            players,
            opened: AtomicBool::new(false),
            closing: tokio::sync::Mutex::new(false),
        })
    }

    pub fn floor(&self) -> &Arc<Floor> {
        &self.floor
    }

    pub fn config(&self) -> &CasinoConfig {
        self.floor.config()
    }

    pub fn players(&self) -> &[Arc<Player>] {
        &self.players
    }

    pub fn is_closed(&self) -> bool {
        self.floor.is_closed()
    }

    /// Every agent: cashiers, slot machines, croupiers, then players
    pub fn agents(&self) -> Vec<Arc<dyn Agent>> {
        let mut agents = self.floor.resources();
        agents.extend(self.players.iter().map(|p| Arc::clone(p) as Arc<dyn Agent>));
        agents
    }

    /// Open the doors and start every agent. A casino opens once.
    pub fn open(&self) -> Result<()> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(CasinoError::AlreadyOpen);
        }
        info!("=== OPENING CASINO ===");
        self.floor.set_closed(false);

        self.floor.start_resources();
        for player in &self.players {
            Arc::clone(player).start(Arc::clone(&self.floor));
        }
        info!(
            players = self.players.len(),
            cashiers = self.floor.cashiers().len(),
            slot_machines = self.floor.slot_machines().len(),
            croupiers = self.floor.croupiers().len(),
            "Casino open"
        );
        Ok(())
    }

    /// Close the casino and wait for every agent to finish. Calling it again
    /// after it returned does nothing and reports nothing.
    pub async fn close(&self) -> CloseReport {
        let mut closed = self.closing.lock().await;
        let mut report = CloseReport::default();
        if *closed {
            return report;
        }
        info!("=== CLOSING CASINO ===");
        self.floor.set_closed(true);

        let timings = &self.config().timings;
        let drain = timings.player_drain();
        for player in &self.players {
            let outcome = player.lifecycle().join(drain).await;
            report.record(player.name(), outcome);
        }
        info!("All players have left");

        let resources = self.floor.resources();
        for agent in &resources {
            agent.request_stop();
        }
        for agent in &resources {
            let outcome = agent.lifecycle().join(Some(timings.join_wait())).await;
            report.record(agent.name(), outcome);
        }

        *closed = true;
        info!(
            finished = report.finished,
            aborted = report.aborted.len(),
            panicked = report.panicked.len(),
            "=== CASINO CLOSED ==="
        );
        report
    }
}
