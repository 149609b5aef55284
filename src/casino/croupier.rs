//! Croupier - capacity-gated table
//!
//! State machine:
//! `AVAILABLE -> WAITING_PLAYERS -> STARTING_GAME -> GAME_STARTED -> ENDING_GAME -> AVAILABLE`,
//! with `CLOSING` reachable from anywhere once the table is asked to stop.
//!
//! Admission takes one permit of a counting semaphore sized to the table
//! capacity and always gives it back when the attempt ends, seated or not.
//! The permit only throttles concurrent admission attempts; the seat count
//! check under the table lock is what bounds occupancy.
//!
//! Rounds are numbered. A seated player holds a `Seat` naming the round it
//! will play in and waits on the round counter rather than on its own state
//! label, so a label overwritten while walking can never strand it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::agent::{lock, Agent, Appearance, Lifecycle, StopSignal, Stopped};
use crate::casino::floor::Floor;
use crate::casino::player::{Player, PlayerState};
use crate::core::config::CasinoConfig;
use crate::core::types::{AgentId, AgentKind, FloorLayout, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameType {
    Roulette,
    Blackjack,
    Poker,
}

impl GameType {
    /// Payout multiplier for a uniform draw in [0, 1)
    pub fn multiplier(&self, odds: f32) -> f32 {
        match self {
            Self::Roulette => {
                if odds <= 0.1 {
                    1.5
                } else if odds <= 0.5 {
                    1.25
                } else if odds <= 0.8 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Blackjack => {
                if odds <= 0.1 {
                    1.75
                } else if odds <= 0.3 {
                    1.5
                } else if odds <= 0.6 {
                    1.25
                } else {
                    0.0
                }
            }
            Self::Poker => {
                if odds <= 0.03 {
                    2.5
                } else if odds <= 0.1 {
                    2.0
                } else if odds <= 0.4 {
                    1.5
                } else {
                    0.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CroupierState {
    Available,
    WaitingPlayers,
    StartingGame,
    GameStarted,
    EndingGame,
    Closing,
}

impl CroupierState {
    pub const ALL: [CroupierState; 6] = [
        Self::Available,
        Self::WaitingPlayers,
        Self::StartingGame,
        Self::GameStarted,
        Self::EndingGame,
        Self::Closing,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::WaitingPlayers => "WAITING_PLAYERS",
            Self::StartingGame => "STARTING_GAME",
            Self::GameStarted => "GAME_STARTED",
            Self::EndingGame => "ENDING_GAME",
            Self::Closing => "CLOSING",
        }
    }

    /// States in which new players may sit down
    pub fn admits_players(&self) -> bool {
        matches!(self, Self::Available | Self::WaitingPlayers)
    }
}

/// Rounds started and finished at one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundCounter {
    pub started: u64,
    pub finished: u64,
    /// Rounds that ran to completion; cut rounds are refunded, not paid
    pub played: u64,
}

/// Proof of a seat at a table for one numbered round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub round: u64,
    /// 0-based position at the table
    pub index: usize,
}

#[derive(Debug)]
struct Table {
    state: CroupierState,
    seated: Vec<Arc<Player>>,
    /// When a table in `WAITING_PLAYERS` starts without being full
    start_deadline: Option<Instant>,
}

#[derive(Debug)]
pub struct Croupier {
    id: AgentId,
    name: String,
    position: Vec2,
    appearance: Appearance,
    lifecycle: Lifecycle,
    game: GameType,
    capacity: usize,
    entry_cost: u32,
    wait_for_players: Duration,
    round_duration: Duration,
    admission: Semaphore,
    table: Mutex<Table>,
    rounds: watch::Sender<RoundCounter>,
    wake: Notify,
    rng: Mutex<ChaCha8Rng>,
}

impl Croupier {
    /// Build the 1-based croupier `n` running `game`
    pub fn new(n: usize, game: GameType, config: &CasinoConfig) -> Self {
        let (rounds, _) = watch::channel(RoundCounter::default());
        Self {
            id: AgentId::new(),
            name: format!("Croupier{}", n),
            position: FloorLayout::croupier_position(n),
            appearance: Appearance::load(
                config.assets_dir.as_deref(),
                "croupier.png",
                Appearance::CROUPIER,
            ),
            lifecycle: Lifecycle::new(),
            game,
            capacity: config.table_capacity,
            entry_cost: config.table_entry_cost,
            wait_for_players: config.timings.table_wait(),
            round_duration: config.timings.round(),
            admission: Semaphore::new(config.table_capacity),
            table: Mutex::new(Table {
                state: CroupierState::Available,
                seated: Vec::with_capacity(config.table_capacity),
                start_deadline: None,
            }),
            rounds,
            wake: Notify::new(),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(config.seed_for(3_000 + n as u64))),
        }
    }

    pub fn game(&self) -> GameType {
        self.game
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entry_cost(&self) -> u32 {
        self.entry_cost
    }

    pub fn state(&self) -> CroupierState {
        lock(&self.table).state
    }

    pub fn num_players(&self) -> usize {
        lock(&self.table).seated.len()
    }

    /// Names of seated players in arrival order
    pub fn players(&self) -> Vec<String> {
        lock(&self.table)
            .seated
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn rounds(&self) -> RoundCounter {
        *self.rounds.borrow()
    }

    /// Whether the table is currently taking players
    pub fn is_available(&self) -> bool {
        lock(&self.table).state.admits_players()
    }

    /// Try to seat `player`. Returns `None` without side effects when the
    /// table is full, not admitting, or the player cannot pay the entry cost.
    pub async fn add_player(&self, player: &Arc<Player>) -> Option<Seat> {
        // Closed semaphore means the table is shutting down
        let _permit = self.admission.acquire().await.ok()?;

        let seat = {
            let mut table = lock(&self.table);
            if !table.state.admits_players() {
                debug!(croupier = %self.name, player = %player.name(), "Table is not admitting players");
                return None;
            }
            if table.seated.len() >= self.capacity {
                debug!(croupier = %self.name, player = %player.name(), "Game is already full");
                return None;
            }
            if table.seated.iter().any(|p| p.id() == player.id()) {
                return None;
            }
            if let Err(err) = player.charge_chips(self.entry_cost) {
                debug!(croupier = %self.name, player = %player.name(), error = %err, "Entry refused");
                return None;
            }

            table.seated.push(Arc::clone(player));
            let seated = table.seated.len();
            debug!(croupier = %self.name, player = %player.name(), seated, "Player joined");

            if seated >= self.capacity {
                table.state = CroupierState::StartingGame;
                table.start_deadline = None;
                self.wake.notify_one();
            } else if seated >= 2 && table.state == CroupierState::Available {
                table.state = CroupierState::WaitingPlayers;
                table.start_deadline = Some(Instant::now() + self.wait_for_players);
                self.wake.notify_one();
            }

            Seat {
                round: self.rounds.borrow().started + 1,
                index: seated - 1,
            }
        };
        Some(seat)
    }

    /// Get up before the round starts. Refunds the entry cost. Fails once
    /// the table has stopped admitting players.
    pub fn leave_table(&self, player: &Player) -> bool {
        let mut table = lock(&self.table);
        if !table.state.admits_players() {
            return false;
        }
        let Some(idx) = table.seated.iter().position(|p| p.id() == player.id()) else {
            return false;
        };
        table.seated.remove(idx);
        player.pay_chips(self.entry_cost);
        if table.seated.len() < 2 && table.state == CroupierState::WaitingPlayers {
            table.state = CroupierState::Available;
            table.start_deadline = None;
        }
        true
    }

    pub fn round_started(&self, seat: &Seat) -> bool {
        self.rounds.borrow().started >= seat.round
    }

    pub fn round_finished(&self, seat: &Seat) -> bool {
        self.rounds.borrow().finished >= seat.round
    }

    /// Whether the seat's round ran to completion and is owed results
    pub fn round_played(&self, seat: &Seat) -> bool {
        self.rounds.borrow().played >= seat.round
    }

    /// Wait until the round `seat` plays in has ended
    pub async fn wait_round_end(&self, seat: &Seat, stop: &mut StopSignal) -> Result<(), Stopped> {
        let mut rounds = self.rounds.subscribe();
        tokio::select! {
            // A dropped sender means the table is gone: nothing left to wait for
            _ = rounds.wait_for(|r| r.finished >= seat.round) => Ok(()),
            _ = stop.stopped() => Err(Stopped),
        }
    }

    /// Run one round for everyone seated, then clear the table
    pub async fn start_game(&self, stop: &mut StopSignal) -> Result<(), Stopped> {
        let seated = {
            let mut table = lock(&self.table);
            table.state = CroupierState::GameStarted;
            table.start_deadline = None;
            table.seated.clone()
        };
        self.rounds.send_modify(|r| r.started += 1);
        for player in &seated {
            player.set_state(PlayerState::InGameCroupier);
        }
        info!(croupier = %self.name, players = seated.len(), game = ?self.game, "Round started");

        let outcome = stop.sleep(self.round_duration).await;

        {
            let mut table = lock(&self.table);
            table.state = CroupierState::EndingGame;
            table.seated.clear();
        }
        // Seated players hear the round ended even when it was cut short
        for player in &seated {
            if outcome.is_err() {
                player.pay_chips(self.entry_cost);
            }
            player.set_state(PlayerState::WaitingGameEnd);
        }
        self.rounds.send_modify(|r| {
            r.finished = r.started;
            if outcome.is_ok() {
                r.played = r.started;
            }
        });
        lock(&self.table).state = if outcome.is_ok() {
            CroupierState::Available
        } else {
            CroupierState::Closing
        };
        debug!(croupier = %self.name, cancelled = outcome.is_err(), "Round over");
        outcome
    }

    /// Pay out one seated player after the round; returns the chips credited
    pub fn get_results(&self, player: &Player) -> u32 {
        let odds: f32 = lock(&self.rng).gen();
        let multiplier = self.game.multiplier(odds);
        let payout = (self.entry_cost as f32 * multiplier) as u32;
        player.pay_chips(payout);
        payout
    }

    async fn run(self: Arc<Self>, mut stop: StopSignal) {
        loop {
            if stop.is_stopped() {
                break;
            }
            let (state, deadline) = {
                let table = lock(&self.table);
                (table.state, table.start_deadline)
            };
            match state {
                CroupierState::WaitingPlayers => {
                    let deadline = deadline.unwrap_or_else(|| Instant::now() + self.wait_for_players);
                    tokio::select! {
                        _ = stop.sleep_until(deadline) => {}
                        _ = self.wake.notified() => continue,
                    }
                    let mut table = lock(&self.table);
                    if table.state == CroupierState::WaitingPlayers && Instant::now() >= deadline {
                        table.state = CroupierState::StartingGame;
                    }
                }
                CroupierState::StartingGame => {
                    if self.start_game(&mut stop).await.is_err() {
                        break;
                    }
                }
                CroupierState::Closing => break,
                _ => {
                    tokio::select! {
                        _ = stop.stopped() => break,
                        _ = self.wake.notified() => {}
                    }
                }
            }
        }
        self.shut_table();
    }

    /// Final cleanup: refuse new admissions and release anyone still seated
    fn shut_table(&self) {
        self.admission.close();
        let leftover = {
            let mut table = lock(&self.table);
            table.state = CroupierState::Closing;
            table.start_deadline = None;
            std::mem::take(&mut table.seated)
        };
        for player in &leftover {
            player.pay_chips(self.entry_cost);
        }
        self.rounds.send_modify(|r| {
            r.started += u64::from(!leftover.is_empty());
            r.finished = r.started;
        });
        debug!(croupier = %self.name, refunded = leftover.len(), "Table closed");
    }
}

impl Agent for Croupier {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Croupier
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
        self.players()
    }

    fn start(self: Arc<Self>, _floor: Arc<Floor>) -> bool {
        let stop = self.lifecycle.stop_signal();
        let worker = Arc::clone(&self);
        self.lifecycle.spawn(worker.run(stop))
    }

    fn request_stop(&self) {
        {
            let mut table = lock(&self.table);
            // A round in progress notices the stop signal and winds down itself
            if table.state != CroupierState::GameStarted {
                table.state = CroupierState::Closing;
            }
        }
        self.lifecycle.request_stop();
        self.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(capacity: usize) -> CasinoConfig {
        let mut config = CasinoConfig::default();
        config.table_capacity = capacity;
        config.timings.table_wait_ms = 20;
        config.timings.round_ms = 30;
        config.seed = Some(5);
        config
    }

    fn player(name: &str, chips: u32) -> Arc<Player> {
        Arc::new(Player::new(name, 0, 0.0, chips, Vec2::ZERO))
    }

    #[test]
    fn test_payout_ladders() {
        assert_eq!(GameType::Roulette.multiplier(0.05), 1.5);
        assert_eq!(GameType::Roulette.multiplier(0.7), 1.0);
        assert_eq!(GameType::Roulette.multiplier(0.9), 0.0);
        assert_eq!(GameType::Blackjack.multiplier(0.2), 1.5);
        assert_eq!(GameType::Blackjack.multiplier(0.61), 0.0);
        assert_eq!(GameType::Poker.multiplier(0.02), 2.5);
        assert_eq!(GameType::Poker.multiplier(0.39), 1.5);
    }

    const GAMES: [GameType; 3] = [GameType::Roulette, GameType::Blackjack, GameType::Poker];

    proptest! {
        #[test]
        fn prop_better_draws_never_pay_less(a in 0.0f32..1.0, b in 0.0f32..1.0) {
            let (lucky, unlucky) = if a <= b { (a, b) } else { (b, a) };
            for game in GAMES {
                prop_assert!(game.multiplier(lucky) >= game.multiplier(unlucky));
                prop_assert!((0.0..=2.5).contains(&game.multiplier(lucky)));
            }
        }
    }

    #[tokio::test]
    async fn test_seating_transitions() {
        let croupier = Croupier::new(1, GameType::Roulette, &config(3));
        let a = player("A", 5);
        let b = player("B", 5);
        let c = player("C", 5);

        let seat = croupier.add_player(&a).await.unwrap();
        assert_eq!(seat, Seat { round: 1, index: 0 });
        assert_eq!(croupier.state(), CroupierState::Available);
        assert_eq!(a.chips(), 4);

        croupier.add_player(&b).await.unwrap();
        assert_eq!(croupier.state(), CroupierState::WaitingPlayers);

        croupier.add_player(&c).await.unwrap();
        assert_eq!(croupier.state(), CroupierState::StartingGame);
        assert!(!croupier.is_available());
        assert_eq!(croupier.players(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_full_table_rejects_without_side_effects() {
        let croupier = Croupier::new(1, GameType::Poker, &config(1));
        let a = player("A", 5);
        let b = player("B", 5);

        assert!(croupier.add_player(&a).await.is_some());
        assert!(croupier.add_player(&b).await.is_none());
        assert_eq!(b.chips(), 5);
        assert_eq!(croupier.num_players(), 1);
        // Every permit came back
        assert_eq!(croupier.admission.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_chipless_player_is_not_seated() {
        let croupier = Croupier::new(1, GameType::Roulette, &config(3));
        let broke = player("Broke", 0);
        assert!(croupier.add_player(&broke).await.is_none());
        assert_eq!(croupier.num_players(), 0);
    }

    #[tokio::test]
    async fn test_leave_table_refunds() {
        let croupier = Croupier::new(1, GameType::Roulette, &config(3));
        let a = player("A", 5);
        let b = player("B", 5);
        croupier.add_player(&a).await.unwrap();
        croupier.add_player(&b).await.unwrap();

        assert!(croupier.leave_table(&b));
        assert_eq!(b.chips(), 5);
        assert_eq!(croupier.state(), CroupierState::Available);
        assert!(!croupier.leave_table(&b));
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_clears_table_and_pays() {
        let croupier = Arc::new(Croupier::new(1, GameType::Roulette, &config(2)));
        let a = player("A", 5);
        let b = player("B", 5);
        let seat_a = croupier.add_player(&a).await.unwrap();
        let seat_b = croupier.add_player(&b).await.unwrap();
        assert_eq!(seat_a.round, seat_b.round);

        let lifecycle = Lifecycle::new();
        let mut stop = lifecycle.stop_signal();
        croupier.start_game(&mut stop).await.unwrap();

        assert!(croupier.round_finished(&seat_a));
        assert!(croupier.round_played(&seat_a));
        assert_eq!(croupier.num_players(), 0);
        assert_eq!(croupier.state(), CroupierState::Available);
        assert_eq!(a.state(), PlayerState::WaitingGameEnd);

        let paid = croupier.get_results(&a);
        assert!(paid <= 1);
        assert_eq!(a.chips(), 4 + paid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_round_still_releases_players() {
        let croupier = Arc::new(Croupier::new(1, GameType::Blackjack, &config(2)));
        let a = player("A", 5);
        let b = player("B", 5);
        let seat = croupier.add_player(&a).await.unwrap();
        croupier.add_player(&b).await.unwrap();

        let lifecycle = Lifecycle::new();
        let mut stop = lifecycle.stop_signal();
        lifecycle.request_stop();
        assert!(croupier.start_game(&mut stop).await.is_err());

        assert!(croupier.round_finished(&seat));
        assert!(!croupier.round_played(&seat));
        assert_eq!(croupier.num_players(), 0);
        assert_eq!(b.state(), PlayerState::WaitingGameEnd);
        // Cut rounds give the entry cost back
        assert_eq!(b.chips(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_starts_after_wait() {
        let cfg = config(4);
        let croupier = Arc::new(Croupier::new(1, GameType::Roulette, &cfg));
        let floor = Arc::new(Floor::new(&CasinoConfig { players: 0, cashiers: 0, ..cfg }));
        Arc::clone(&croupier).start(floor);

        let a = player("A", 5);
        let b = player("B", 5);
        let seat = croupier.add_player(&a).await.unwrap();
        croupier.add_player(&b).await.unwrap();

        // Under capacity: the round starts once the wait runs out
        let waiter = Lifecycle::new();
        let mut stop = waiter.stop_signal();
        croupier.wait_round_end(&seat, &mut stop).await.unwrap();
        assert_eq!(
            croupier.rounds(),
            RoundCounter { started: 1, finished: 1, played: 1 }
        );

        croupier.request_stop();
        assert_eq!(
            croupier.lifecycle().join(Some(Duration::from_secs(1))).await,
            crate::agent::JoinOutcome::Finished
        );
        assert_eq!(croupier.state_label(), "CLOSED");
    }
}
