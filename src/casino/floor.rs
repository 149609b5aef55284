//! Shared floor state and resource arbitration
//!
//! Agents reach the other agents only through the `Floor`. It owns every
//! resource, the `closed` flag, and the three lookups players use to find a
//! cashier, a table, or a slot machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::agent::{lock, Agent};
use crate::casino::cashier::{Cashier, QueueTicket};
use crate::casino::croupier::{Croupier, GameType, Seat};
use crate::casino::player::Player;
use crate::casino::slot_machine::SlotMachine;
use crate::core::config::CasinoConfig;
use crate::core::types::FloorLayout;

/// Cashiers ordered for least-loaded selection
///
/// Queue lengths change under other operations (exchanges pop the head), so
/// a heap keyed on them would go stale. Selection instead scans current
/// lengths and assigns while holding the pool lock, which makes
/// pick-and-assign one atomic unit with respect to other selections.
#[derive(Debug)]
pub struct CashierPool {
    cashiers: Vec<Arc<Cashier>>,
    selection: Mutex<()>,
}

impl CashierPool {
    pub fn new(cashiers: Vec<Arc<Cashier>>) -> Self {
        Self {
            cashiers,
            selection: Mutex::new(()),
        }
    }

    pub fn cashiers(&self) -> &[Arc<Cashier>] {
        &self.cashiers
    }

    /// Queue `player` at the cashier with the shortest queue. Ties go to the
    /// lowest cashier number.
    pub fn assign_least_loaded(&self, player: &Arc<Player>) -> Option<QueueTicket> {
        let _selection = lock(&self.selection);
        let (_, cashier) = self
            .cashiers
            .iter()
            .enumerate()
            .min_by_key(|(idx, cashier)| (cashier.queue_len(), *idx))?;
        Some(cashier.enqueue(player))
    }
}

#[derive(Debug)]
pub struct Floor {
    config: CasinoConfig,
    closed: AtomicBool,
    cashiers: CashierPool,
    slot_machines: Vec<Arc<SlotMachine>>,
    croupiers: Vec<Arc<Croupier>>,
    /// Held across a table's admission attempt, so it is an async lock
    table_selection: tokio::sync::Mutex<()>,
}

impl Floor {
    /// Build every resource described by `config`. The floor starts closed.
    pub fn new(config: &CasinoConfig) -> Self {
        let cashiers = (1..=config.cashiers)
            .map(|n| Arc::new(Cashier::new(n, config)))
            .collect();
        let slot_machines = (1..=config.slot_machines)
            .map(|n| Arc::new(SlotMachine::new(n, config)))
            .collect();
        let croupiers = (1..=config.croupiers)
            .map(|n| {
                let game = if config.table_games.is_empty() {
                    GameType::Roulette
                } else {
                    config.table_games[(n - 1) % config.table_games.len()]
                };
                Arc::new(Croupier::new(n, game, config))
            })
            .collect();

        Self {
            config: config.clone(),
            closed: AtomicBool::new(true),
            cashiers: CashierPool::new(cashiers),
            slot_machines,
            croupiers,
            table_selection: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &CasinoConfig {
        &self.config
    }

    pub fn layout(&self) -> &FloorLayout {
        &self.config.layout
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flip the flag agents read to wind down. Returns the previous value.
    pub(crate) fn set_closed(&self, closed: bool) -> bool {
        self.closed.swap(closed, Ordering::SeqCst)
    }

    pub fn cashiers(&self) -> &[Arc<Cashier>] {
        self.cashiers.cashiers()
    }

    pub fn slot_machines(&self) -> &[Arc<SlotMachine>] {
        &self.slot_machines
    }

    pub fn croupiers(&self) -> &[Arc<Croupier>] {
        &self.croupiers
    }

    /// Every resource agent, in start order
    pub fn resources(&self) -> Vec<Arc<dyn Agent>> {
        let mut agents: Vec<Arc<dyn Agent>> = Vec::new();
        agents.extend(self.cashiers().iter().map(|c| Arc::clone(c) as Arc<dyn Agent>));
        agents.extend(
            self.slot_machines
                .iter()
                .map(|m| Arc::clone(m) as Arc<dyn Agent>),
        );
        agents.extend(self.croupiers.iter().map(|c| Arc::clone(c) as Arc<dyn Agent>));
        agents
    }

    /// Start cashiers, then slot machines, then croupiers
    pub(crate) fn start_resources(self: &Arc<Self>) {
        for agent in self.resources() {
            agent.start(Arc::clone(self));
        }
    }

    /// Least-loaded cashier selection. The player stays queued there for as
    /// long as the returned ticket lives.
    pub fn find_cashier(&self, player: &Arc<Player>) -> Option<QueueTicket> {
        let ticket = self.cashiers.assign_least_loaded(player)?;
        let cashier = ticket.cashier();
        debug!(player = %player.name(), cashier = %cashier.name(), queue = cashier.queue_len(), "Assigned cashier");
        Some(ticket)
    }

    /// Seat `player` at the first available table that accepts it
    pub async fn find_croupier(&self, player: &Arc<Player>) -> Option<(Arc<Croupier>, Seat)> {
        let _selection = self.table_selection.lock().await;
        for croupier in &self.croupiers {
            if !croupier.is_available() {
                continue;
            }
            if let Some(seat) = croupier.add_player(player).await {
                return Some((Arc::clone(croupier), seat));
            }
        }
        None
    }

    /// Claim the first free slot machine for `player`
    pub fn find_slot_machine(&self, player: &Arc<Player>) -> Option<Arc<SlotMachine>> {
        self.slot_machines
            .iter()
            .find(|machine| machine.is_available() && machine.take_machine(player))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec2;

    fn floor(cashiers: usize) -> Floor {
        Floor::new(&CasinoConfig {
            cashiers,
            slot_machines: 2,
            croupiers: 2,
            table_capacity: 2,
            table_games: vec![GameType::Roulette, GameType::Poker],
            ..Default::default()
        })
    }

    fn player(name: &str, chips: u32) -> Arc<Player> {
        Arc::new(Player::new(name, 0, 100.0, chips, Vec2::ZERO))
    }

    #[test]
    fn test_least_loaded_tie_goes_to_lowest_number() {
        let floor = floor(3);
        let tickets: Vec<_> = (0..4)
            .map(|i| floor.find_cashier(&player(&format!("P{}", i), 0)).unwrap())
            .collect();
        let picked: Vec<&str> = tickets.iter().map(|t| t.cashier().name()).collect();
        assert_eq!(picked, vec!["Cashier1", "Cashier2", "Cashier3", "Cashier1"]);

        drop(tickets);
        assert!(floor.cashiers().iter().all(|c| c.queue_len() == 0));
    }

    #[test]
    fn test_games_assigned_round_robin() {
        let floor = floor(1);
        assert_eq!(floor.croupiers()[0].game(), GameType::Roulette);
        assert_eq!(floor.croupiers()[1].game(), GameType::Poker);
    }

    #[test]
    fn test_slot_machine_scan_claims() {
        let floor = floor(1);
        let a = player("A", 0);
        let b = player("B", 0);
        let c = player("C", 0);

        let first = floor.find_slot_machine(&a).unwrap();
        let second = floor.find_slot_machine(&b).unwrap();
        assert_ne!(first.id(), second.id());
        assert!(floor.find_slot_machine(&c).is_none());
    }

    #[tokio::test]
    async fn test_find_croupier_fills_tables_in_order() {
        let floor = floor(1);
        let mut tables = Vec::new();
        for i in 0..4 {
            let (croupier, _) = floor.find_croupier(&player(&format!("P{}", i), 5)).await.unwrap();
            tables.push(croupier.name().to_string());
        }
        // A full table is starting its round and stops admitting
        assert_eq!(tables, vec!["Croupier1", "Croupier1", "Croupier2", "Croupier2"]);
        assert!(floor.find_croupier(&player("P4", 5)).await.is_none());
    }

    #[tokio::test]
    async fn test_find_croupier_rejects_chipless_player() {
        let floor = floor(1);
        assert!(floor.find_croupier(&player("Broke", 0)).await.is_none());
    }
}
