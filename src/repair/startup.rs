//! Startup watcher - bounded polling until the service is running

use crate::service::ServiceController;
use std::time::{Duration, Instant};
use tracing::info;

/// Polls `is_running` at a fixed interval until the service is up or the
/// timeout elapses.
pub struct StartupWatcher {
    interval: Duration,
    timeout: Duration,
}

impl StartupWatcher {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Wait for the service to come up. Returns the elapsed time on success,
    /// `None` on timeout.
    pub fn wait(&self, controller: &dyn ServiceController, service: &str) -> Option<Duration> {
        info!(service, timeout_secs = self.timeout.as_secs(), "Waiting for service startup");
        let started = Instant::now();

        loop {
            if controller.is_running(service) {
                let elapsed = started.elapsed();
                info!(service, elapsed_ms = elapsed.as_millis() as u64, "Service is up");
                return Some(elapsed);
            }
            if started.elapsed() >= self.timeout {
                info!(service, "Service did not come up within the timeout");
                return None;
            }
            std::thread::sleep(self.interval);
        }
    }
}
