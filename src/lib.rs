//! Casino Floor - concurrent casino simulation
//!
//! Players, cashiers, slot machines and croupiers each run as their own task
//! and compete for capacity-limited resources under an open/close lifecycle.

pub mod agent;
pub mod casino;
pub mod core;
pub mod monitor;
pub mod net;
