//! Service control layer - idempotent start/stop primitives over the init system

pub mod controller;
pub mod systemd;

pub use controller::{ServiceController, ServiceError, ServiceStatus};
pub use systemd::SystemdController;
