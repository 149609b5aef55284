//! Casino configuration with documented constants
//!
//! All magic numbers of the simulation are collected here. Timings are stored
//! in milliseconds so a config file stays readable; use the `Duration`
//! accessors in code.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::casino::croupier::GameType;
use crate::core::error::Result;
use crate::core::types::FloorLayout;

/// Configuration for one casino instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CasinoConfig {
    // === POPULATION ===
    pub players: usize,
    pub cashiers: usize,
    pub slot_machines: usize,
    pub croupiers: usize,

    /// Seats per table. Immutable once a croupier is built.
    pub table_capacity: usize,

    /// Game types handed to croupiers round-robin
    pub table_games: Vec<GameType>,

    // === ECONOMY ===
    /// Money a player walks in with
    pub starting_balance: f32,

    /// Money paid out per chip (and charged per chip on buy-in)
    pub chip_price: f32,

    /// Money charged per slot machine spin
    pub slot_price: f32,

    /// Chips charged to take a seat at a table
    pub table_entry_cost: u32,

    // === TIMING ===
    pub timings: Timings,

    // === MOVEMENT ===
    /// Distance walked per player tick
    pub walk_speed: f32,

    /// Distance under which a player counts as arrived
    pub arrive_epsilon: f32,

    pub layout: FloorLayout,

    // === MONITORING ===
    /// Monitor feed port = base + offset
    pub monitor_base_port: u16,
    pub monitor_port_offset: u16,

    /// Directory holding agent sprites; `None` uses fallback shapes
    pub assets_dir: Option<String>,

    /// Base seed for agent RNG streams; `None` draws from entropy
    pub seed: Option<u64>,
}

/// Fixed delays of the simulation, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Player state machine step interval
    pub tick_ms: u64,

    /// Time a player spends deciding what to do next
    pub decide_ms: u64,

    /// Cashier processing time per exchange
    pub exchange_ms: u64,

    /// Slot machine reel time before the outcome is shown
    pub spin_ms: u64,

    /// Slot machine time between outcome and payout
    pub payout_ms: u64,

    /// How long a table with two or more players waits for more before starting
    pub table_wait_ms: u64,

    /// Length of one table round
    pub round_ms: u64,

    /// How long `close()` waits for each resource before cancelling it
    pub join_wait_ms: u64,

    /// How long `close()` waits for each player to leave; 0 waits forever
    pub player_drain_ms: u64,

    /// Monitor polling cadence
    pub monitor_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            decide_ms: 1000,
            exchange_ms: 3000,
            spin_ms: 500,
            payout_ms: 500,
            table_wait_ms: 2000,
            round_ms: 3000,
            join_wait_ms: 1000,
            player_drain_ms: 0,
            monitor_ms: 1000,
        }
    }
}

impl Timings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn decide(&self) -> Duration {
        Duration::from_millis(self.decide_ms)
    }

    pub fn exchange(&self) -> Duration {
        Duration::from_millis(self.exchange_ms)
    }

    pub fn spin(&self) -> Duration {
        Duration::from_millis(self.spin_ms)
    }

    pub fn payout(&self) -> Duration {
        Duration::from_millis(self.payout_ms)
    }

    pub fn table_wait(&self) -> Duration {
        Duration::from_millis(self.table_wait_ms)
    }

    pub fn round(&self) -> Duration {
        Duration::from_millis(self.round_ms)
    }

    pub fn join_wait(&self) -> Duration {
        Duration::from_millis(self.join_wait_ms)
    }

    pub fn player_drain(&self) -> Option<Duration> {
        (self.player_drain_ms > 0).then(|| Duration::from_millis(self.player_drain_ms))
    }

    pub fn monitor(&self) -> Duration {
        Duration::from_millis(self.monitor_ms)
    }

    /// Every delay scaled down to `ms` milliseconds, for tests and demos
    pub fn uniform(ms: u64) -> Self {
        Self {
            tick_ms: ms,
            decide_ms: ms,
            exchange_ms: ms,
            spin_ms: ms,
            payout_ms: ms,
            table_wait_ms: ms,
            round_ms: ms,
            join_wait_ms: ms.max(1) * 10,
            player_drain_ms: 0,
            monitor_ms: ms,
        }
    }
}

impl Default for CasinoConfig {
    fn default() -> Self {
        Self {
            players: 40,
            cashiers: 3,
            slot_machines: 3,
            croupiers: 3,
            table_capacity: 3,
            table_games: vec![GameType::Roulette],

            starting_balance: 10_000.0,
            chip_price: 1.5,
            slot_price: 1.05,
            table_entry_cost: 1,

            timings: Timings::default(),

            walk_speed: 6.0,
            arrive_epsilon: 1.0,
            layout: FloorLayout::default(),

            monitor_base_port: 5000,
            monitor_port_offset: 0,
            assets_dir: None,
            seed: None,
        }
    }
}

impl CasinoConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a (possibly partial) TOML document; missing keys keep defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Port the monitor feed listens on
    pub fn monitor_port(&self) -> u16 {
        self.monitor_base_port.saturating_add(self.monitor_port_offset)
    }

    /// Seed for RNG stream `stream`, or a fresh random seed
    pub fn seed_for(&self, stream: u64) -> u64 {
        match self.seed {
            Some(base) => base.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(stream),
            None => rand::random(),
        }
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.cashiers == 0 && self.players > 0 {
            return Err("at least one cashier is required when there are players".into());
        }

        if self.croupiers > 0 && self.table_capacity == 0 {
            return Err("table_capacity must be at least 1".into());
        }

        if self.croupiers > 0 && self.table_games.is_empty() {
            return Err("table_games must name at least one game".into());
        }

        if self.chip_price <= 0.0 || self.slot_price <= 0.0 {
            return Err(format!(
                "prices must be positive (chip_price {}, slot_price {})",
                self.chip_price, self.slot_price
            ));
        }

        if self.starting_balance.is_nan() || self.starting_balance < 0.0 {
            return Err(format!(
                "starting_balance ({}) must be non-negative",
                self.starting_balance
            ));
        }

        if self.walk_speed <= 0.0 || self.arrive_epsilon <= 0.0 {
            return Err("walk_speed and arrive_epsilon must be positive".into());
        }

        if self.timings.tick_ms == 0 {
            return Err("timings.tick_ms must be at least 1".into());
        }

        Ok(())
    }
}
