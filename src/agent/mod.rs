//! Agent runtime
//!
//! Every participant on the floor (players, cashiers, slot machines,
//! croupiers) is an independently scheduled task behind the same capability:
//! it can be started, asked to stop, queried for liveness, and asked for a
//! display label. Nothing here knows about casino rules.

pub mod appearance;
pub mod lifecycle;

use std::sync::Arc;

use crate::casino::floor::Floor;
use crate::core::types::{AgentId, AgentKind, Vec2};

pub use appearance::{Appearance, Shape};
pub(crate) use lifecycle::lock;
pub use lifecycle::{JoinOutcome, Lifecycle, StopSignal, Stopped};

pub trait Agent: Send + Sync {
    fn id(&self) -> AgentId;

    fn name(&self) -> &str;

    fn kind(&self) -> AgentKind;

    fn lifecycle(&self) -> &Lifecycle;

    fn position(&self) -> Vec2;

    fn appearance(&self) -> Appearance;

    /// Display label of the current state, as shown by the monitor
    fn state_label(&self) -> String;

    /// Names of the players queued or seated at this agent, if any
    fn occupants(&self) -> Vec<String> {
        Vec::new()
    }

    /// Spawn the agent's run loop. Returns false if it was already started.
    fn start(self: Arc<Self>, floor: Arc<Floor>) -> bool;

    fn request_stop(&self) {
        self.lifecycle().request_stop();
    }

    fn is_alive(&self) -> bool {
        self.lifecycle().is_alive()
    }
}
