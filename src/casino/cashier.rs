//! Cashier - queue-backed exchange counter
//!
//! Players are appended to the queue when the casino routes them here and are
//! served strictly in that order: the gate only opens for the player at the
//! head of the queue, and only one player holds it at a time.
//!
//! A place in the queue is a `QueueTicket`. Dropping the ticket before it
//! turns into a gate withdraws the player, and dropping the gate releases it
//! and takes its holder out of the queue if the exchange did not already do
//! so. An aborted player task therefore never leaves a stale queue entry.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::agent::{lock, Agent, Appearance, Lifecycle, StopSignal};
use crate::casino::floor::Floor;
use crate::casino::player::Player;
use crate::core::config::CasinoConfig;
use crate::core::error::{CasinoError, Result};
use crate::core::types::{AgentId, AgentKind, FloorLayout, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashierState {
    Available,
    Exchanging,
    Closing,
}

impl CashierState {
    pub const ALL: [CashierState; 3] = [Self::Available, Self::Exchanging, Self::Closing];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Exchanging => "EXCHANGING",
            Self::Closing => "CLOSING",
        }
    }
}

/// What a player asks the cashier for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Exchange {
    /// Chips in, money out
    CashOut { chips: u32 },
    /// Money in, chips out
    BuyIn { money: f32 },
}

/// What the player received for a completed exchange
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Receipt {
    Paid { money: f32 },
    Issued { chips: u32 },
}

#[derive(Debug)]
struct Counter {
    state: CashierState,
    queue: VecDeque<Arc<Player>>,
    serving: Option<AgentId>,
}

impl Counter {
    fn remove(&mut self, player: AgentId) -> bool {
        match self.queue.iter().position(|p| p.id() == player) {
            Some(idx) => {
                self.queue.remove(idx);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
pub struct Cashier {
    id: AgentId,
    name: String,
    position: Vec2,
    appearance: Appearance,
    lifecycle: Lifecycle,
    chip_price: f32,
    exchange_delay: Duration,
    report_every: Duration,
    counter: Mutex<Counter>,
    /// Bumped on every queue or gate change so waiting players re-check
    turns: watch::Sender<u64>,
}

impl Cashier {
    /// Build the 1-based cashier `n`
    pub fn new(n: usize, config: &CasinoConfig) -> Self {
        let (turns, _) = watch::channel(0);
        Self {
            id: AgentId::new(),
            name: format!("Cashier{}", n),
            position: FloorLayout::cashier_position(n),
            appearance: Appearance::load(
                config.assets_dir.as_deref(),
                "cashier.png",
                Appearance::CASHIER,
            ),
            lifecycle: Lifecycle::new(),
            chip_price: config.chip_price,
            exchange_delay: config.timings.exchange(),
            report_every: config.timings.monitor(),
            counter: Mutex::new(Counter {
                state: CashierState::Available,
                queue: VecDeque::new(),
                serving: None,
            }),
            turns,
        }
    }

    pub fn state(&self) -> CashierState {
        lock(&self.counter).state
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.counter).queue.len()
    }

    /// Names of queued players, head first
    pub fn queue(&self) -> Vec<String> {
        lock(&self.counter)
            .queue
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn chip_price(&self) -> f32 {
        self.chip_price
    }

    fn bump(&self) {
        self.turns.send_modify(|turn| *turn = turn.wrapping_add(1));
    }

    fn set_state(&self, state: CashierState) {
        let mut counter = lock(&self.counter);
        if counter.state != CashierState::Closing {
            counter.state = state;
        }
    }

    /// Append `player` to the back of the queue
    pub fn assign(&self, player: &Arc<Player>) {
        {
            let mut counter = lock(&self.counter);
            counter.queue.push_back(Arc::clone(player));
            if counter.state != CashierState::Closing {
                counter.state = CashierState::Exchanging;
            }
        }
        self.bump();
    }

    /// Queue `player` and hand back the ticket that owns its place
    pub fn enqueue(self: &Arc<Self>, player: &Arc<Player>) -> QueueTicket {
        self.assign(player);
        QueueTicket {
            cashier: Arc::clone(self),
            player: Arc::clone(player),
            queued: true,
        }
    }

    /// Wait until `player` is at the head of the queue and the counter is
    /// free, then hold the gate
    pub async fn acquire_gate(self: &Arc<Self>, player: &Player) -> Result<CashierGate> {
        let mut turns = self.turns.subscribe();
        loop {
            {
                let mut counter = lock(&self.counter);
                let position = counter.queue.iter().position(|p| p.id() == player.id());
                match position {
                    None => {
                        return Err(CasinoError::NotQueued {
                            cashier: self.name.clone(),
                            player: player.name().to_string(),
                        })
                    }
                    Some(0) if counter.serving.is_none() => {
                        counter.serving = Some(player.id());
                        return Ok(CashierGate {
                            cashier: Arc::clone(self),
                            player: player.id(),
                        });
                    }
                    Some(_) => {}
                }
            }
            if turns.changed().await.is_err() {
                return Err(CasinoError::Cancelled(self.name.clone()));
            }
        }
    }

    /// Leave the queue without being served
    pub fn withdraw(&self, player: AgentId) {
        {
            let mut counter = lock(&self.counter);
            counter.remove(player);
            if counter.serving == Some(player) {
                counter.serving = None;
            }
            if counter.queue.is_empty() && counter.state == CashierState::Exchanging {
                counter.state = CashierState::Available;
            }
        }
        self.bump();
    }

    /// Serve the gate holder. Insufficient holdings abort the exchange
    /// without charging anything and put the counter back in service.
    pub async fn exchange(
        &self,
        gate: &CashierGate,
        player: &Player,
        order: Exchange,
    ) -> Result<Receipt> {
        if gate.player != player.id() || gate.cashier.id != self.id {
            return Err(CasinoError::NotQueued {
                cashier: self.name.clone(),
                player: player.name().to_string(),
            });
        }

        self.set_state(CashierState::Exchanging);
        let charged = match order {
            Exchange::CashOut { chips } => player.charge_chips(chips),
            Exchange::BuyIn { money } => player.charge_money(money),
        };
        if let Err(err) = charged {
            debug!(cashier = %self.name, player = %player.name(), error = %err, "Exchange aborted");
            self.set_state(CashierState::Available);
            return Err(err);
        }

        tokio::time::sleep(self.exchange_delay).await;

        let receipt = match order {
            Exchange::CashOut { chips } => {
                let money = chips as f32 * self.chip_price;
                player.pay_money(money);
                Receipt::Paid { money }
            }
            Exchange::BuyIn { money } => {
                let chips = (money / self.chip_price) as u32;
                player.pay_chips(chips);
                Receipt::Issued { chips }
            }
        };

        {
            let mut counter = lock(&self.counter);
            // The gate holder is always the head of the queue
            if counter.queue.front().map(|p| p.id()) == Some(player.id()) {
                counter.queue.pop_front();
            } else {
                counter.remove(player.id());
            }
            if counter.state != CashierState::Closing {
                counter.state = CashierState::Available;
            }
        }
        self.bump();

        debug!(cashier = %self.name, player = %player.name(), ?receipt, "Exchange complete");
        Ok(receipt)
    }

    fn release(&self, player: AgentId) {
        {
            let mut counter = lock(&self.counter);
            if counter.serving == Some(player) {
                counter.serving = None;
            }
            counter.remove(player);
            if counter.queue.is_empty() && counter.state == CashierState::Exchanging {
                counter.state = CashierState::Available;
            }
        }
        self.bump();
    }

    async fn run(self: Arc<Self>, mut stop: StopSignal) {
        debug!(cashier = %self.name, "Counter open");
        while stop.sleep(self.report_every).await.is_ok() {
            trace!(
                cashier = %self.name,
                queue_size = self.queue_len(),
                players = %self.queue().join(", "),
                "Queue report"
            );
        }
        lock(&self.counter).state = CashierState::Closing;
        debug!(cashier = %self.name, "Counter closed");
    }
}

impl Agent for Cashier {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Cashier
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn position(&self) -> Vec2 {
        self.position
    }

    fn appearance(&self) -> Appearance {
        self.appearance.clone()
    }

    fn state_label(&self) -> String {
        if !self.is_alive() {
            return "CLOSED".to_string();
        }
        self.state().label().to_string()
    }

    fn occupants(&self) -> Vec<String> {
        self.queue()
    }

    fn start(self: Arc<Self>, _floor: Arc<Floor>) -> bool {
        let stop = self.lifecycle.stop_signal();
        self.set_state(CashierState::Available);
        let worker = Arc::clone(&self);
        self.lifecycle.spawn(worker.run(stop))
    }

    fn request_stop(&self) {
        lock(&self.counter).state = CashierState::Closing;
        self.lifecycle.request_stop();
    }
}

/// A player's place in one cashier's queue
#[derive(Debug)]
pub struct QueueTicket {
    cashier: Arc<Cashier>,
    player: Arc<Player>,
    queued: bool,
}

impl QueueTicket {
    pub fn cashier(&self) -> &Arc<Cashier> {
        &self.cashier
    }

    /// Wait for the gate. On success the place in the queue passes to it.
    pub async fn into_gate(mut self) -> Result<CashierGate> {
        let gate = self.cashier.acquire_gate(&self.player).await?;
        self.queued = false;
        Ok(gate)
    }
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        if self.queued {
            self.cashier.withdraw(self.player.id());
        }
    }
}

/// Exclusive right to be served at one cashier; released on drop
#[derive(Debug)]
pub struct CashierGate {
    cashier: Arc<Cashier>,
    player: AgentId,
}

impl CashierGate {
    pub fn cashier(&self) -> &Arc<Cashier> {
        &self.cashier
    }
}

impl Drop for CashierGate {
    fn drop(&mut self) {
        self.cashier.release(self.player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CasinoConfig {
        let mut config = CasinoConfig::default();
        config.timings.exchange_ms = 30;
        config
    }

    fn player(name: &str, balance: f32, chips: u32) -> Arc<Player> {
        Arc::new(Player::new(name, 0, balance, chips, Vec2::ZERO))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cash_out_round_trip() {
        let cashier = Arc::new(Cashier::new(1, &fast_config()));
        let p = player("Player1", 100.0, 20);

        cashier.assign(&p);
        let gate = cashier.acquire_gate(&p).await.unwrap();
        let receipt = cashier
            .exchange(&gate, &p, Exchange::CashOut { chips: 20 })
            .await
            .unwrap();
        drop(gate);

        assert_eq!(receipt, Receipt::Paid { money: 30.0 });
        assert_eq!(p.chips(), 0);
        assert!((p.balance() - 130.0).abs() < 0.001);
        assert_eq!(cashier.queue_len(), 0);
        assert_eq!(cashier.state(), CashierState::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_chips_leaves_player_unchanged() {
        let cashier = Arc::new(Cashier::new(1, &fast_config()));
        let p = player("Player1", 100.0, 5);

        cashier.assign(&p);
        let gate = cashier.acquire_gate(&p).await.unwrap();
        let err = cashier
            .exchange(&gate, &p, Exchange::CashOut { chips: 20 })
            .await
            .unwrap_err();
        assert!(err.is_insufficient());
        assert_eq!(cashier.state(), CashierState::Available);
        drop(gate);

        assert_eq!(p.chips(), 5);
        assert_eq!(p.balance(), 100.0);
        assert_eq!(cashier.queue_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_in_issues_whole_chips() {
        let cashier = Arc::new(Cashier::new(1, &fast_config()));
        let p = player("Player1", 200.0, 0);

        cashier.assign(&p);
        let gate = cashier.acquire_gate(&p).await.unwrap();
        let receipt = cashier
            .exchange(&gate, &p, Exchange::BuyIn { money: 100.0 })
            .await
            .unwrap();

        // 100 / 1.5 = 66.67 -> 66 chips
        assert_eq!(receipt, Receipt::Issued { chips: 66 });
        assert_eq!(p.chips(), 66);
        assert!((p.balance() - 100.0).abs() < 0.001);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_follows_queue_order() {
        let cashier = Arc::new(Cashier::new(1, &fast_config()));
        let a = player("A", 0.0, 1);
        let b = player("B", 0.0, 1);
        cashier.assign(&a);
        cashier.assign(&b);

        // B is not at the head, so its wait cannot complete while A holds the queue
        let waiting_b = {
            let cashier = Arc::clone(&cashier);
            let b = Arc::clone(&b);
            tokio::spawn(async move { cashier.acquire_gate(&b).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!waiting_b.is_finished());

        let gate_a = cashier.acquire_gate(&a).await.unwrap();
        cashier
            .exchange(&gate_a, &a, Exchange::CashOut { chips: 1 })
            .await
            .unwrap();
        drop(gate_a);

        waiting_b.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdraw_lets_next_player_through() {
        let cashier = Arc::new(Cashier::new(1, &fast_config()));
        let a = player("A", 0.0, 1);
        let b = player("B", 0.0, 1);
        cashier.assign(&a);
        cashier.assign(&b);

        cashier.withdraw(a.id());
        assert_eq!(cashier.queue(), vec!["B".to_string()]);
        let gate = cashier.acquire_gate(&b).await.unwrap();
        assert_eq!(gate.cashier().name(), "Cashier1");
    }

    #[tokio::test]
    async fn test_unqueued_player_cannot_take_gate() {
        let cashier = Arc::new(Cashier::new(1, &fast_config()));
        let p = player("Stranger", 0.0, 0);
        assert!(matches!(
            cashier.acquire_gate(&p).await,
            Err(CasinoError::NotQueued { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticket_becomes_gate_and_keeps_place() {
        let cashier = Arc::new(Cashier::new(1, &fast_config()));
        let a = player("A", 0.0, 1);

        let ticket = cashier.enqueue(&a);
        assert_eq!(ticket.cashier().name(), "Cashier1");
        let gate = ticket.into_gate().await.unwrap();
        assert_eq!(cashier.queue(), vec!["A".to_string()]);

        drop(gate);
        assert_eq!(cashier.queue_len(), 0);
        assert_eq!(cashier.state(), CashierState::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_wait_gives_up_queue_place() {
        let cashier = Arc::new(Cashier::new(1, &fast_config()));
        let holder = player("X", 0.0, 1);
        let a = player("A", 0.0, 1);
        let b = player("B", 0.0, 1);

        let holding = cashier.enqueue(&holder).into_gate().await.unwrap();
        let ticket = cashier.enqueue(&a);
        let waiting_a = tokio::spawn(async move { ticket.into_gate().await.map(|_| ()) });
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!waiting_a.is_finished());

        waiting_a.abort();
        assert!(waiting_a.await.unwrap_err().is_cancelled());
        drop(holding);
        assert_eq!(cashier.queue_len(), 0);

        let gate = tokio::time::timeout(Duration::from_secs(3600), cashier.enqueue(&b).into_gate())
            .await
            .expect("queue is stuck behind an aborted player")
            .unwrap();
        drop(gate);
        assert_eq!(cashier.queue_len(), 0);
    }
}
