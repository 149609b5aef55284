//! Slot machine - single-occupancy resource
//!
//! Claiming and releasing happen under one lock so `available` and the
//! active player always change together. A spin is only accepted from the
//! player currently holding the machine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::{lock, Agent, Appearance, Lifecycle, StopSignal};
use crate::casino::floor::Floor;
use crate::casino::player::Player;
use crate::core::config::CasinoConfig;
use crate::core::error::{CasinoError, Result};
use crate::core::types::{AgentId, AgentKind, FloorLayout, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotMachineState {
    Available,
    Taken,
    InGame,
    Jackpot1,
    Jackpot2,
    Jackpot3,
    Lose,
    Closing,
}

impl SlotMachineState {
    pub const ALL: [SlotMachineState; 8] = [
        Self::Available,
        Self::Taken,
        Self::InGame,
        Self::Jackpot1,
        Self::Jackpot2,
        Self::Jackpot3,
        Self::Lose,
        Self::Closing,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Taken => "TAKEN",
            Self::InGame => "IN_GAME",
            Self::Jackpot1 => "JACKPOT_1",
            Self::Jackpot2 => "JACKPOT_2",
            Self::Jackpot3 => "JACKPOT_3",
            Self::Lose => "LOSE",
            Self::Closing => "CLOSING",
        }
    }
}

/// Rung of the payout ladder a spin landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpinTier {
    Jackpot3,
    Jackpot2,
    Jackpot1,
    Lose,
}

impl SpinTier {
    /// Map a uniform draw in [0, 1) onto the ladder
    pub fn from_odds(odds: f32) -> Self {
        if odds <= 0.01 {
            Self::Jackpot3
        } else if odds <= 0.15 {
            Self::Jackpot2
        } else if odds <= 0.4 {
            Self::Jackpot1
        } else {
            Self::Lose
        }
    }

    /// Multiple of the spin price paid back
    pub fn multiplier(&self) -> f32 {
        match self {
            Self::Jackpot3 => 2.0,
            Self::Jackpot2 => 1.5,
            Self::Jackpot1 => 1.25,
            Self::Lose => 0.0,
        }
    }

    fn display_state(&self) -> SlotMachineState {
        match self {
            Self::Jackpot3 => SlotMachineState::Jackpot3,
            Self::Jackpot2 => SlotMachineState::Jackpot2,
            Self::Jackpot1 => SlotMachineState::Jackpot1,
            Self::Lose => SlotMachineState::Lose,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinOutcome {
    pub tier: SpinTier,
    pub payout: f32,
}

#[derive(Debug)]
struct Cabinet {
    state: SlotMachineState,
    active: Option<Arc<Player>>,
}

#[derive(Debug)]
pub struct SlotMachine {
    id: AgentId,
    name: String,
    position: Vec2,
    appearance: Appearance,
    lifecycle: Lifecycle,
    price: f32,
    spin_delay: Duration,
    payout_delay: Duration,
    cabinet: Mutex<Cabinet>,
    rng: Mutex<ChaCha8Rng>,
}

impl SlotMachine {
    /// Build the 1-based slot machine `n`
    pub fn new(n: usize, config: &CasinoConfig) -> Self {
        Self {
            id: AgentId::new(),
            name: format!("Slot Machine{}", n),
            position: FloorLayout::slot_machine_position(n),
            appearance: Appearance::load(
                config.assets_dir.as_deref(),
                "slotmachine.png",
                Appearance::SLOT_MACHINE,
            ),
            lifecycle: Lifecycle::new(),
            price: config.slot_price,
            spin_delay: config.timings.spin(),
            payout_delay: config.timings.payout(),
            cabinet: Mutex::new(Cabinet {
                state: SlotMachineState::Available,
                active: None,
            }),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(config.seed_for(2_000 + n as u64))),
        }
    }

    pub fn price(&self) -> f32 {
        self.price
    }

    pub fn state(&self) -> SlotMachineState {
        lock(&self.cabinet).state
    }

    /// True exactly when nobody holds the machine
    pub fn is_available(&self) -> bool {
        lock(&self.cabinet).active.is_none()
    }

    /// Name of the player at the machine, if any
    pub fn active_player(&self) -> Option<String> {
        lock(&self.cabinet)
            .active
            .as_ref()
            .map(|p| p.name().to_string())
    }

    /// Claim the machine for `player`. Fails if someone already holds it.
    pub fn take_machine(&self, player: &Arc<Player>) -> bool {
        let mut cabinet = lock(&self.cabinet);
        if cabinet.active.is_some() || cabinet.state == SlotMachineState::Closing {
            return false;
        }
        cabinet.active = Some(Arc::clone(player));
        cabinet.state = SlotMachineState::Taken;
        true
    }

    /// Release the machine if `player` holds it
    pub fn leave_machine(&self, player: &Player) -> bool {
        let mut cabinet = lock(&self.cabinet);
        let holds = cabinet.active.as_ref().map(|p| p.id()) == Some(player.id());
        if holds {
            cabinet.active = None;
            if cabinet.state != SlotMachineState::Closing {
                cabinet.state = SlotMachineState::Available;
            }
        }
        holds
    }

    fn set_state(&self, state: SlotMachineState) {
        let mut cabinet = lock(&self.cabinet);
        if cabinet.state != SlotMachineState::Closing {
            cabinet.state = state;
        }
    }

    /// Play one spin for the holder of the machine
    pub async fn start_game(&self, player: &Player) -> Result<SpinOutcome> {
        let holds = lock(&self.cabinet).active.as_ref().map(|p| p.id()) == Some(player.id());
        if !holds {
            return Err(CasinoError::NotHoldingMachine {
                machine: self.name.clone(),
                player: player.name().to_string(),
            });
        }

        if let Err(err) = player.charge_money(self.price) {
            debug!(machine = %self.name, player = %player.name(), error = %err, "Spin refused");
            return Err(err);
        }

        self.set_state(SlotMachineState::InGame);
        let odds: f32 = lock(&self.rng).gen();
        tokio::time::sleep(self.spin_delay).await;

        let tier = SpinTier::from_odds(odds);
        self.set_state(tier.display_state());
        tokio::time::sleep(self.payout_delay).await;

        let payout = self.price * tier.multiplier();
        player.pay_money(payout);
        debug!(machine = %self.name, player = %player.name(), ?tier, payout, "Spin finished");
        Ok(SpinOutcome { tier, payout })
    }

    async fn run(self: Arc<Self>, mut stop: StopSignal) {
        stop.stopped().await;
        let mut cabinet = lock(&self.cabinet);
        cabinet.state = SlotMachineState::Closing;
        cabinet.active = None;
    }
}

impl Agent for SlotMachine {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::SlotMachine
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
        self.active_player().into_iter().collect()
    }

    fn start(self: Arc<Self>, _floor: Arc<Floor>) -> bool {
        let stop = self.lifecycle.stop_signal();
        let worker = Arc::clone(&self);
        self.lifecycle.spawn(worker.run(stop))
    }

    fn request_stop(&self) {
        lock(&self.cabinet).state = SlotMachineState::Closing;
        self.lifecycle.request_stop();
    }
}
