//! ServiceController trait and error taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Observed registration/run state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceStatus {
    /// No service registered under this name
    NotFound,
    /// Registered but not running
    Stopped,
    /// Registered and running
    Running,
    /// Transitional or unreadable state
    Unknown,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceStatus::NotFound => write!(f, "not-found"),
            ServiceStatus::Stopped => write!(f, "stopped"),
            ServiceStatus::Running => write!(f, "running"),
            ServiceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classified service-control failure. Callers branch on the class to decide
/// whether a retry makes sense (access-denied does not, without elevation).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service not found: {0}")]
    NotFound(String),
    #[error("access denied controlling service {0}")]
    AccessDenied(String),
    #[error("service {0} in invalid or transitional state: {1}")]
    InvalidState(String, String),
    #[error("service control I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Idempotent service-control primitives. Acting on an already-correct state
/// is a no-op success. No internal retries; no blocking beyond the OS call.
pub trait ServiceController: Send + Sync {
    /// Whether a service is registered under this name.
    fn exists(&self, name: &str) -> Result<bool, ServiceError>;

    /// Current status snapshot.
    fn status(&self, name: &str) -> Result<ServiceStatus, ServiceError>;

    /// Start the service. Already running counts as success.
    fn start(&self, name: &str) -> Result<bool, ServiceError>;

    /// Stop the service, forcefully if asked. Already stopped counts as success.
    fn stop(&self, name: &str, force: bool) -> Result<bool, ServiceError>;

    /// Main process id of the service, if it has one.
    fn main_pid(&self, name: &str) -> Option<u32>;

    /// Whether the service is currently running. Never fails: any error or an
    /// unknown name reads as "not running".
    fn is_running(&self, name: &str) -> bool {
        matches!(self.status(name), Ok(ServiceStatus::Running))
    }
}
