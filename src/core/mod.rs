pub mod config;
pub mod error;
pub mod types;

pub use config::{CasinoConfig, Timings};
pub use error::{CasinoError, Result};
pub use types::{AgentId, AgentKind, FloorLayout, Vec2, Zone};
