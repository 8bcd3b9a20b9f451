//! Repair layer - escalating stop/kill/restart and startup watching

pub mod escalator;
pub mod startup;

pub use escalator::{RepairEscalator, RepairReport, RepairState};
pub use startup::StartupWatcher;
