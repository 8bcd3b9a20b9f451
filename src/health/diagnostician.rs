//! Health diagnosis - aggregates liveness signals into one verdict

use crate::process::ProcessQuery;
use crate::service::{ServiceController, ServiceStatus};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use super::probe::DatabaseProbe;

/// Immutable snapshot of one health check. Not persisted anywhere; the
/// monitoring loop acts on it and throws it away.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthVerdict {
    pub is_healthy: bool,
    pub reason: String,
    pub service_status: ServiceStatus,
    pub process_found: bool,
    pub database_responsive: bool,
    pub log_active: bool,
}

impl HealthVerdict {
    fn unhealthy(reason: &str, service_status: ServiceStatus) -> Self {
        Self {
            is_healthy: false,
            reason: reason.to_string(),
            service_status,
            process_found: false,
            database_responsive: false,
            log_active: false,
        }
    }
}

/// Aggregates service status, process presence, database reachability and
/// log freshness. Healthy iff the process is found and at least one of the
/// two activity signals holds; requiring both would flag the server as dead
/// during brief database hiccups.
pub struct HealthDiagnostician {
    controller: Arc<dyn ServiceController>,
    staleness: Duration,
}

impl HealthDiagnostician {
    pub fn new(controller: Arc<dyn ServiceController>, staleness: Duration) -> Self {
        Self {
            controller,
            staleness,
        }
    }

    /// Run one health check. Never fails: every probe error reads as a
    /// negative signal and is logged at warning level.
    pub fn diagnose(
        &self,
        service: &str,
        resolver: &mut dyn ProcessQuery,
        log_path: Option<&Path>,
        probe: Option<&dyn DatabaseProbe>,
    ) -> HealthVerdict {
        let status = match self.controller.status(service) {
            Ok(status) => status,
            Err(e) => {
                warn!(service, error = %e, "Service status unreadable");
                ServiceStatus::Unknown
            }
        };

        if status != ServiceStatus::Running {
            return HealthVerdict::unhealthy("service not running", status);
        }

        let service_pid = self.controller.main_pid(service);
        let leaf = resolver.resolve_leaf(service_pid);
        let Some(leaf) = leaf else {
            return HealthVerdict::unhealthy("process not found", status);
        };
        debug!(pid = leaf.pid, "Workload process present");

        let database_responsive = probe.map(|p| p.ping().success).unwrap_or(false);
        let log_active = log_path
            .map(|path| self.log_fresh(path))
            .unwrap_or(false);

        let is_healthy = database_responsive || log_active;
        let reason = if is_healthy {
            match (database_responsive, log_active) {
                (true, true) => "ok (database responsive, log active)",
                (true, false) => "ok (database responsive)",
                _ => "ok (log active)",
            }
        } else {
            "no activity signal (database unresponsive, log stale)"
        };

        HealthVerdict {
            is_healthy,
            reason: reason.to_string(),
            service_status: status,
            process_found: true,
            database_responsive,
            log_active,
        }
    }

    /// Whether the log file was modified within the staleness window.
    fn log_fresh(&self, path: &Path) -> bool {
        let modified = match path.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Log freshness unreadable");
                return false;
            }
        };

        match SystemTime::now().duration_since(modified) {
            Ok(age) => age <= self.staleness,
            // Modified in the future (clock skew) still counts as fresh.
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct FixedController(ServiceStatus);

    impl ServiceController for FixedController {
        fn exists(&self, _: &str) -> Result<bool, crate::service::ServiceError> {
            Ok(self.0 != ServiceStatus::NotFound)
        }
        fn status(&self, _: &str) -> Result<ServiceStatus, crate::service::ServiceError> {
            Ok(self.0)
        }
        fn start(&self, _: &str) -> Result<bool, crate::service::ServiceError> {
            Ok(true)
        }
        fn stop(&self, _: &str, _: bool) -> Result<bool, crate::service::ServiceError> {
            Ok(true)
        }
        fn main_pid(&self, _: &str) -> Option<u32> {
            Some(4242)
        }
    }

    struct NoProcess;

    impl ProcessQuery for NoProcess {
        fn resolve_leaf(&mut self, _: Option<u32>) -> Option<crate::process::ProcessRecord> {
            None
        }
        fn kill(&mut self, _: u32) -> bool {
            false
        }
    }

    #[test]
    fn test_stopped_service_short_circuits() {
        let diag = HealthDiagnostician::new(
            Arc::new(FixedController(ServiceStatus::Stopped)),
            Duration::from_secs(900),
        );
        let verdict = diag.diagnose("game", &mut NoProcess, None, None);
        assert!(!verdict.is_healthy);
        assert_eq!(verdict.reason, "service not running");
        assert!(!verdict.process_found);
    }

    #[test]
    fn test_missing_process_is_unhealthy() {
        let diag = HealthDiagnostician::new(
            Arc::new(FixedController(ServiceStatus::Running)),
            Duration::from_secs(900),
        );
        let verdict = diag.diagnose("game", &mut NoProcess, None, None);
        assert!(!verdict.is_healthy);
        assert_eq!(verdict.reason, "process not found");
    }

    #[test]
    fn test_fresh_log_counts_as_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server.log");
        fs::write(&log, "tick").unwrap();

        let diag = HealthDiagnostician::new(
            Arc::new(FixedController(ServiceStatus::Running)),
            Duration::from_secs(900),
        );
        assert!(diag.log_fresh(&log));
    }

    #[test]
    fn test_missing_log_is_stale() {
        let diag = HealthDiagnostician::new(
            Arc::new(FixedController(ServiceStatus::Running)),
            Duration::from_secs(900),
        );
        assert!(!diag.log_fresh(Path::new("/no/such/warden.log")));
    }
}
