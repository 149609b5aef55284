//! Read-only views of the floor for whatever watches the simulation
//!
//! The simulation never pushes anything: viewers capture a `FloorSnapshot`
//! whenever they like, usually once per monitor tick.

pub mod feed;

use ahash::AHashMap;
use serde::Serialize;

use crate::agent::Agent;
use crate::casino::{
    Casino, CashierState, CroupierState, Player, PlayerState, SlotMachineState,
};
use crate::core::types::{AgentKind, Vec2};

pub use feed::{poll_feed, FeedServer};

/// Label reported by dead players
pub const OUT: &str = "OUT";
/// Label reported by dead resources
pub const CLOSED: &str = "CLOSED";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub name: String,
    pub kind: AgentKind,
    pub state: String,
    pub position: Vec2,
    /// Queue of a cashier, seats of a table, holder of a slot machine
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub occupants: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chips: Option<u32>,
}

impl AgentSnapshot {
    pub fn of(agent: &dyn Agent) -> Self {
        Self {
            name: agent.name().to_string(),
            kind: agent.kind(),
            state: agent.state_label(),
            position: agent.position(),
            occupants: agent.occupants(),
            balance: None,
            chips: None,
        }
    }

    pub fn of_player(player: &Player) -> Self {
        let wallet = player.wallet();
        Self {
            balance: Some(wallet.balance()),
            chips: Some(wallet.chips()),
            ..Self::of(player)
        }
    }

    /// One player entry of the monitor feed, terminator included
    pub fn feed_entry(&self) -> String {
        // Chips go out as a float, the way feed readers expect them
        format!(
            "Player: {}, State: {}, Balance: {:?}, Chips: {:?}|",
            self.name,
            self.state,
            self.balance.unwrap_or_default(),
            self.chips.unwrap_or_default() as f32,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloorSnapshot {
    pub closed: bool,
    pub players: Vec<AgentSnapshot>,
    pub cashiers: Vec<AgentSnapshot>,
    pub slot_machines: Vec<AgentSnapshot>,
    pub croupiers: Vec<AgentSnapshot>,
}

impl FloorSnapshot {
    pub fn capture(casino: &Casino) -> Self {
        let floor = casino.floor();
        Self {
            closed: casino.is_closed(),
            players: casino
                .players()
                .iter()
                .map(|p| AgentSnapshot::of_player(p))
                .collect(),
            cashiers: floor
                .cashiers()
                .iter()
                .map(|c| AgentSnapshot::of(c.as_ref()))
                .collect(),
            slot_machines: floor
                .slot_machines()
                .iter()
                .map(|m| AgentSnapshot::of(m.as_ref()))
                .collect(),
            croupiers: floor
                .croupiers()
                .iter()
                .map(|c| AgentSnapshot::of(c.as_ref()))
                .collect(),
        }
    }

    /// One line of the monitor feed: every player, pipe-terminated
    pub fn feed_line(&self) -> String {
        self.players.iter().map(AgentSnapshot::feed_entry).collect()
    }

    pub fn state_counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for snapshot in self
            .players
            .iter()
            .chain(&self.cashiers)
            .chain(&self.slot_machines)
            .chain(&self.croupiers)
        {
            counts.add(snapshot.kind, &snapshot.state);
        }
        counts
    }

    /// Money won or lost across all players relative to what they came in with
    pub fn net_winnings(&self, starting_balance: f32) -> f32 {
        self.players
            .iter()
            .map(|p| p.balance.unwrap_or_default() - starting_balance)
            .sum()
    }
}

/// How many agents of each kind are in each state
#[derive(Debug, Clone, Default)]
pub struct StateCounts {
    counts: AHashMap<(AgentKind, String), usize>,
}

impl StateCounts {
    fn add(&mut self, kind: AgentKind, state: &str) {
        *self.counts.entry((kind, state.to_string())).or_insert(0) += 1;
    }

    pub fn get(&self, kind: AgentKind, state: &str) -> usize {
        self.counts
            .get(&(kind, state.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Every known state of every kind with its count, zeros included, in
    /// a stable order for display
    pub fn rows(&self) -> Vec<(AgentKind, &'static str, usize)> {
        let players = PlayerState::ALL
            .iter()
            .map(|s| s.label())
            .chain([OUT])
            .map(|label| (AgentKind::Player, label));
        let cashiers = CashierState::ALL
            .iter()
            .map(|s| s.label())
            .chain([CLOSED])
            .map(|label| (AgentKind::Cashier, label));
        let machines = SlotMachineState::ALL
            .iter()
            .map(|s| s.label())
            .chain([CLOSED])
            .map(|label| (AgentKind::SlotMachine, label));
        let croupiers = CroupierState::ALL
            .iter()
            .map(|s| s.label())
            .chain([CLOSED])
            .map(|label| (AgentKind::Croupier, label));

        players
            .chain(cashiers)
            .chain(machines)
            .chain(croupiers)
            .map(|(kind, label)| (kind, label, self.get(kind, label)))
            .collect()
    }

    pub fn total(&self, kind: AgentKind) -> usize {
        self.counts
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, n)| n)
            .sum()
    }
}
