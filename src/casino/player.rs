//! Player - the agent that drives the simulation
//!
//! A player is split in two. `Player` is the shared handle resources hold on
//! to: identity, wallet, and the display state. The state machine itself
//! lives in a task-local `Brain` that nobody else can touch, so the only
//! shared mutation is through the wallet and the display label.
//!
//! The brain holds at most one `Engagement` at a time. Each engagement owns a
//! guard that gives the resource back when dropped, so an aborted player task
//! releases whatever it held.

use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{lock, Agent, Appearance, Lifecycle, StopSignal};
use crate::casino::cashier::{CashierGate, Exchange};
use crate::casino::croupier::{Croupier, Seat};
use crate::casino::floor::Floor;
use crate::casino::slot_machine::SlotMachine;
use crate::casino::wallet::Wallet;
use crate::core::error::Result;
use crate::core::types::{AgentId, AgentKind, Vec2, Zone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerState {
    Entering,
    Walking,
    InLobby,
    Deciding,
    FindingSlotMachine,
    FindingTable,
    InGameArea,
    WaitingCashier,
    Exchanging,
    InGameSlotMachine,
    WaitingGameStart,
    InGameCroupier,
    WaitingGameEnd,
    Leaving,
}

impl PlayerState {
    pub const ALL: [PlayerState; 14] = [
        Self::Entering,
        Self::Walking,
        Self::InLobby,
        Self::Deciding,
        Self::FindingSlotMachine,
        Self::FindingTable,
        Self::InGameArea,
        Self::WaitingCashier,
        Self::Exchanging,
        Self::InGameSlotMachine,
        Self::WaitingGameStart,
        Self::InGameCroupier,
        Self::WaitingGameEnd,
        Self::Leaving,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Entering => "ENTERING",
            Self::Walking => "WALKING",
            Self::InLobby => "IN_LOBBY",
            Self::Deciding => "DECIDING",
            Self::FindingSlotMachine => "FINDING_SLOT_MACHINE",
            Self::FindingTable => "FINDING_TABLE",
            Self::InGameArea => "IN_GAME_AREA",
            Self::WaitingCashier => "WAITING_CASHIER",
            Self::Exchanging => "EXCHANGING",
            Self::InGameSlotMachine => "IN_GAME_SLOT_MACHINE",
            Self::WaitingGameStart => "WAITING_GAME_START",
            Self::InGameCroupier => "IN_GAME_CROUPIER",
            Self::WaitingGameEnd => "WAITING_GAME_END",
            Self::Leaving => "LEAVING",
        }
    }
}

#[derive(Debug)]
struct View {
    state: PlayerState,
    position: Vec2,
}

#[derive(Debug)]
pub struct Player {
    id: AgentId,
    name: String,
    /// Seed stream for this player's decisions
    index: usize,
    lifecycle: Lifecycle,
    wallet: Mutex<Wallet>,
    view: Mutex<View>,
}

impl Player {
    pub fn new(name: &str, index: usize, balance: f32, chips: u32, position: Vec2) -> Self {
        Self {
            id: AgentId::new(),
            name: name.to_string(),
            index,
            lifecycle: Lifecycle::new(),
            wallet: Mutex::new(Wallet::new(balance, chips)),
            view: Mutex::new(View {
                state: PlayerState::Entering,
                position,
            }),
        }
    }

    pub fn wallet(&self) -> Wallet {
        *lock(&self.wallet)
    }

    pub fn balance(&self) -> f32 {
        lock(&self.wallet).balance()
    }

    pub fn chips(&self) -> u32 {
        lock(&self.wallet).chips()
    }

    pub fn charge_money(&self, money: f32) -> Result<()> {
        lock(&self.wallet).charge_money(money)
    }

    pub fn charge_chips(&self, chips: u32) -> Result<()> {
        lock(&self.wallet).charge_chips(chips)
    }

    pub fn pay_money(&self, money: f32) {
        lock(&self.wallet).pay_money(money);
    }

    pub fn pay_chips(&self, chips: u32) {
        lock(&self.wallet).pay_chips(chips);
    }

    pub fn state(&self) -> PlayerState {
        lock(&self.view).state
    }

    /// Display state. Croupiers also set this for seated players.
    pub(crate) fn set_state(&self, state: PlayerState) {
        lock(&self.view).state = state;
    }

    fn set_position(&self, position: Vec2) {
        lock(&self.view).position = position;
    }
}

impl Agent for Player {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Player
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn position(&self) -> Vec2 {
        lock(&self.view).position
    }

    fn appearance(&self) -> Appearance {
        Appearance::PLAYER
    }

    fn state_label(&self) -> String {
        if !self.is_alive() {
            return "OUT".to_string();
        }
        self.state().label().to_string()
    }

    fn start(self: Arc<Self>, floor: Arc<Floor>) -> bool {
        let brain = Brain::new(Arc::clone(&self), floor);
        self.lifecycle.spawn(brain.run())
    }
}

/// Hold on a slot machine, given back on drop
#[derive(Debug)]
struct MachineClaim {
    machine: Arc<SlotMachine>,
    player: Arc<Player>,
}

impl Drop for MachineClaim {
    fn drop(&mut self) {
        self.machine.leave_machine(&self.player);
    }
}

/// Seat at a table. Dropping it before the round starts gets up and takes
/// the entry cost back; once the round is under way the croupier clears it.
#[derive(Debug)]
struct TableSeat {
    croupier: Arc<Croupier>,
    seat: Seat,
    player: Arc<Player>,
}

impl Drop for TableSeat {
    fn drop(&mut self) {
        self.croupier.leave_table(&self.player);
    }
}

/// The one resource a player is currently dealing with
#[derive(Debug)]
enum Engagement {
    None,
    Cashier(CashierGate),
    Croupier(TableSeat),
    SlotMachine(MachineClaim),
}

struct Brain {
    player: Arc<Player>,
    floor: Arc<Floor>,
    rng: ChaCha8Rng,
    stop: StopSignal,
    state: PlayerState,
    next_state: PlayerState,
    destination: Vec2,
    direction: Vec2,
    engagement: Engagement,
    /// Exchange to carry out once a cashier gate is held
    pending: Option<Exchange>,
}

/// Whether the run loop keeps going after a step
enum Flow {
    Continue,
    Exit,
}

impl Brain {
    fn new(player: Arc<Player>, floor: Arc<Floor>) -> Self {
        let seed = floor.config().seed_for(1_000 + player.index as u64);
        let stop = player.lifecycle.stop_signal();
        let position = player.position();
        Self {
            player,
            floor,
            rng: ChaCha8Rng::seed_from_u64(seed),
            stop,
            state: PlayerState::Entering,
            next_state: PlayerState::Entering,
            destination: position,
            direction: Vec2::ZERO,
            engagement: Engagement::None,
            pending: None,
        }
    }

    async fn run(mut self) {
        debug!(player = %self.player.name(), "Entered the casino");
        let tick = self.floor.config().timings.tick();
        loop {
            if !self.player.is_alive() {
                break;
            }
            if let Flow::Exit = self.step().await {
                break;
            }
            if self.stop.sleep(tick).await.is_err() {
                break;
            }
        }
        self.release_engagement();
        self.set_state(PlayerState::Leaving);
        self.player.lifecycle.mark_dead();
        info!(
            player = %self.player.name(),
            balance = self.player.balance(),
            chips = self.player.chips(),
            "Left the casino"
        );
    }

    fn set_state(&mut self, state: PlayerState) {
        self.state = state;
        self.player.set_state(state);
    }

    fn walk_to(&mut self, destination: Vec2, next: PlayerState) {
        self.destination = destination;
        self.direction = Vec2::direction(self.player.position(), destination);
        self.next_state = next;
        self.set_state(PlayerState::Walking);
    }

    fn walk_to_zone(&mut self, zone: Zone, next: PlayerState) {
        let destination = self.floor.layout().destination(zone, &mut self.rng);
        self.walk_to(destination, next);
    }

    async fn step(&mut self) -> Flow {
        match self.state {
            PlayerState::Entering => {
                self.walk_to_zone(Zone::Lobby, PlayerState::Deciding);
            }
            PlayerState::Walking => self.walk(),
            PlayerState::InLobby => self.set_state(PlayerState::Deciding),
            PlayerState::Deciding => return self.decide().await,
            PlayerState::InGameArea => self.choose_game(),
            PlayerState::FindingSlotMachine => self.find_slot_machine(),
            PlayerState::FindingTable => self.find_table().await,
            PlayerState::InGameSlotMachine => self.play_slot_machine().await,
            PlayerState::WaitingGameStart => self.wait_game_start(),
            PlayerState::InGameCroupier => return self.play_table().await,
            PlayerState::WaitingGameEnd => self.collect_results(),
            PlayerState::WaitingCashier => return self.wait_cashier().await,
            PlayerState::Exchanging => self.exchange().await,
            PlayerState::Leaving => return Flow::Exit,
        }
        Flow::Continue
    }

    /// Advance one tick toward the destination
    fn walk(&mut self) {
        let config = self.floor.config();
        let position = self.player.position();
        let remaining = self.destination - position;
        let distance = position.distance(&self.destination);

        // Arrived, or the remaining leg points back against the walking
        // direction, which means the last step overshot
        if distance <= config.arrive_epsilon || remaining.dot(&self.direction) < 0.0 {
            self.player.set_position(self.destination);
            let next = self.next_state;
            self.set_state(next);
            return;
        }

        let step = config.walk_speed.min(distance);
        self.player.set_position(position + self.direction * step);
    }

    async fn decide(&mut self) -> Flow {
        if self.stop.sleep(self.floor.config().timings.decide()).await.is_err() {
            return Flow::Exit;
        }

        if self.floor.is_closed() {
            let chips = self.player.chips();
            if chips > 0 {
                self.pending = Some(Exchange::CashOut { chips });
                self.walk_to_zone(Zone::CashierArea, PlayerState::WaitingCashier);
            } else {
                self.walk_to_zone(Zone::Entrance, PlayerState::Leaving);
            }
            return Flow::Continue;
        }

        match self.rng.gen_range(0..3) {
            0 => self.walk_to_zone(Zone::GameArea, PlayerState::InGameArea),
            1 => self.walk_to_zone(Zone::Lobby, PlayerState::InLobby),
            _ => {
                let money = self.rng.gen_range(100.0f32..200.0);
                self.pending = Some(Exchange::BuyIn { money });
                self.walk_to_zone(Zone::CashierArea, PlayerState::WaitingCashier);
            }
        }
        Flow::Continue
    }

    fn choose_game(&mut self) {
        if self.floor.is_closed() {
            self.set_state(PlayerState::Deciding);
            return;
        }
        let config = self.floor.config();
        let next = if self.rng.gen_bool(0.5) {
            if self.player.balance() >= config.slot_price {
                PlayerState::FindingSlotMachine
            } else {
                PlayerState::Deciding
            }
        } else if self.player.chips() >= config.table_entry_cost {
            PlayerState::FindingTable
        } else {
            PlayerState::Deciding
        };
        self.set_state(next);
    }

    fn find_slot_machine(&mut self) {
        match self.floor.find_slot_machine(&self.player) {
            Some(machine) => {
                let approach = machine.position() + Vec2::new(-10.0, 0.0);
                self.engagement = Engagement::SlotMachine(MachineClaim {
                    machine,
                    player: Arc::clone(&self.player),
                });
                self.walk_to(approach, PlayerState::InGameSlotMachine);
            }
            None => {
                debug!(player = %self.player.name(), "No free slot machine");
                self.set_state(PlayerState::Deciding);
            }
        }
    }

    async fn play_slot_machine(&mut self) {
        if let Engagement::SlotMachine(claim) = &self.engagement {
            let machine = Arc::clone(&claim.machine);
            if let Err(err) = machine.start_game(&self.player).await {
                debug!(player = %self.player.name(), error = %err, "Spin declined");
            }
        }
        self.release_engagement();
        self.set_state(PlayerState::Deciding);
    }

    async fn find_table(&mut self) {
        match self.floor.find_croupier(&self.player).await {
            Some((croupier, seat)) => {
                let approach = croupier.position() + Vec2::new(-10.0, 10.0 * seat.index as f32);
                self.engagement = Engagement::Croupier(TableSeat {
                    croupier,
                    seat,
                    player: Arc::clone(&self.player),
                });
                self.walk_to(approach, PlayerState::WaitingGameStart);
            }
            None => {
                debug!(player = %self.player.name(), "No table has a free seat");
                self.set_state(PlayerState::Deciding);
            }
        }
    }

    fn wait_game_start(&mut self) {
        let Engagement::Croupier(table) = &self.engagement else {
            self.set_state(PlayerState::Deciding);
            return;
        };
        let (croupier, seat) = (Arc::clone(&table.croupier), table.seat);
        if croupier.round_finished(&seat) {
            self.set_state(PlayerState::WaitingGameEnd);
        } else if croupier.round_started(&seat) {
            self.set_state(PlayerState::InGameCroupier);
        } else if self.floor.is_closed() && croupier.leave_table(&self.player) {
            debug!(player = %self.player.name(), croupier = %croupier.name(), "Left the table before the round");
            self.engagement = Engagement::None;
            self.set_state(PlayerState::Deciding);
        } else {
            // Keep showing the waiting label the croupier may have overwritten
            self.set_state(PlayerState::WaitingGameStart);
        }
    }

    async fn play_table(&mut self) -> Flow {
        let Engagement::Croupier(table) = &self.engagement else {
            self.set_state(PlayerState::Deciding);
            return Flow::Continue;
        };
        let (croupier, seat) = (Arc::clone(&table.croupier), table.seat);
        if croupier.wait_round_end(&seat, &mut self.stop).await.is_err() {
            return Flow::Exit;
        }
        self.set_state(PlayerState::WaitingGameEnd);
        Flow::Continue
    }

    fn collect_results(&mut self) {
        if let Engagement::Croupier(table) = &self.engagement {
            if table.croupier.round_played(&table.seat) {
                let won = table.croupier.get_results(&self.player);
                debug!(player = %self.player.name(), croupier = %table.croupier.name(), won, "Collected table results");
            }
        }
        self.engagement = Engagement::None;
        self.set_state(PlayerState::Deciding);
    }

    async fn wait_cashier(&mut self) -> Flow {
        if self.pending.is_none() {
            self.set_state(PlayerState::Deciding);
            return Flow::Continue;
        }
        let Some(ticket) = self.floor.find_cashier(&self.player) else {
            warn!(player = %self.player.name(), "No cashier on the floor");
            self.give_up_exchange();
            return Flow::Continue;
        };
        let cashier = Arc::clone(ticket.cashier());

        // Losing the race drops the ticket, which withdraws from the queue
        let acquired = tokio::select! {
            gate = ticket.into_gate() => Some(gate),
            _ = self.stop.stopped() => None,
        };
        match acquired {
            Some(Ok(gate)) => {
                let approach = cashier.position() + Vec2::new(-10.0, 0.0);
                self.engagement = Engagement::Cashier(gate);
                self.walk_to(approach, PlayerState::Exchanging);
                Flow::Continue
            }
            Some(Err(err)) => {
                debug!(player = %self.player.name(), cashier = %cashier.name(), error = %err, "Gave up on the cashier");
                self.give_up_exchange();
                Flow::Continue
            }
            None => {
                self.give_up_exchange();
                Flow::Exit
            }
        }
    }

    fn give_up_exchange(&mut self) {
        self.pending = None;
        self.set_state(PlayerState::Deciding);
    }

    async fn exchange(&mut self) {
        let engagement = std::mem::replace(&mut self.engagement, Engagement::None);
        let order = self.pending.take();
        if let (Engagement::Cashier(gate), Some(order)) = (&engagement, order) {
            let cashier = Arc::clone(gate.cashier());
            match cashier.exchange(gate, &self.player, order).await {
                Ok(receipt) => {
                    debug!(player = %self.player.name(), cashier = %cashier.name(), ?receipt, "Exchanged")
                }
                Err(err) => {
                    debug!(player = %self.player.name(), cashier = %cashier.name(), error = %err, "Exchange failed")
                }
            }
        }
        // Dropping the gate hands the counter to the next in line
        drop(engagement);

        if self.floor.is_closed() && self.player.chips() == 0 {
            self.walk_to_zone(Zone::Entrance, PlayerState::Leaving);
        } else {
            self.set_state(PlayerState::Deciding);
        }
    }

    fn release_engagement(&mut self) {
        self.engagement = Engagement::None;
    }
}
