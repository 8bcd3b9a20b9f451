//! Escalating repair state machine
//!
//! Graceful stop first, always. Only after a graceful stop is observed to
//! fail does the escalator start killing processes, child before wrapper,
//! followed by a forced service-level stop that tolerates "already stopped".
//! Every step is safe to run when an earlier step already did the job.

use crate::process::ProcessQuery;
use crate::service::{ServiceController, ServiceError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Named states of one repair run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    Detected,
    GracefulStopAttempted,
    GracefulStopSucceeded,
    GracefulStopFailed,
    ForcedChildKill,
    ForcedParentKill,
    ServiceForceStop,
    Cooldown,
    Restarted,
    Success,
    Failed,
}

impl RepairState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RepairState::Success | RepairState::Failed)
    }
}

/// Outcome of one repair run, with the full transition trace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub final_state: RepairState,
    pub transitions: Vec<RepairState>,
    pub restarted: bool,
    pub error: Option<String>,
}

impl RepairReport {
    pub fn succeeded(&self) -> bool {
        self.final_state == RepairState::Success
    }
}

/// Drives a service from "unhealthy" back to "running" through escalating
/// force. One transition function, no hidden state between runs.
pub struct RepairEscalator {
    controller: Arc<dyn ServiceController>,
    /// Wait after killing the child before killing the wrapper
    settle: Duration,
    /// Wait before restart so the OS releases handles and ports
    cooldown: Duration,
}

impl RepairEscalator {
    pub fn new(controller: Arc<dyn ServiceController>, cooldown: Duration) -> Self {
        Self {
            controller,
            settle: Duration::from_secs(2),
            cooldown,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Run the state machine to a terminal state.
    pub fn repair(&self, service: &str, resolver: &mut dyn ProcessQuery) -> RepairReport {
        let mut state = RepairState::Detected;
        let mut transitions = vec![state];
        let mut error = None;

        while !state.is_terminal() {
            state = self.step(state, service, resolver, &mut error);
            transitions.push(state);
        }

        let report = RepairReport {
            final_state: state,
            restarted: state == RepairState::Success,
            transitions,
            error,
        };

        // Restart outcome is always reported, success or not.
        match report.final_state {
            RepairState::Success => info!(service, "Repair succeeded, service restarted"),
            _ => warn!(service, error = ?report.error, "Repair failed"),
        }

        report
    }

    /// The single transition function: performs the action belonging to
    /// `state` and returns the next state.
    fn step(
        &self,
        state: RepairState,
        service: &str,
        resolver: &mut dyn ProcessQuery,
        error: &mut Option<String>,
    ) -> RepairState {
        match state {
            RepairState::Detected => RepairState::GracefulStopAttempted,

            RepairState::GracefulStopAttempted => {
                match self.controller.stop(service, false) {
                    Ok(_) if !self.controller.is_running(service) => {
                        info!(service, "Graceful stop succeeded");
                        RepairState::GracefulStopSucceeded
                    }
                    Ok(_) => {
                        warn!(service, "Graceful stop issued but service still running");
                        RepairState::GracefulStopFailed
                    }
                    Err(e) => {
                        warn!(service, error = %e, "Graceful stop failed");
                        RepairState::GracefulStopFailed
                    }
                }
            }

            RepairState::GracefulStopSucceeded => RepairState::Cooldown,

            RepairState::GracefulStopFailed => RepairState::ForcedChildKill,

            RepairState::ForcedChildKill => {
                let main_pid = self.controller.main_pid(service);
                if let Some(leaf) = resolver.resolve_leaf(main_pid) {
                    if Some(leaf.pid) != main_pid {
                        // Wrapper present: take the child down first and give
                        // the wrapper a moment to notice before it respawns.
                        info!(pid = leaf.pid, "Force-killing workload child");
                        resolver.kill(leaf.pid);
                        std::thread::sleep(self.settle);
                    } else {
                        info!(pid = leaf.pid, "Force-killing service process");
                        resolver.kill(leaf.pid);
                    }
                }
                RepairState::ForcedParentKill
            }

            RepairState::ForcedParentKill => {
                if let Some(pid) = self.controller.main_pid(service) {
                    // Already-dead pids read as a failed kill, which is fine.
                    if resolver.kill(pid) {
                        info!(pid, "Force-killed wrapper process");
                    }
                }
                RepairState::ServiceForceStop
            }

            RepairState::ServiceForceStop => {
                match self.controller.stop(service, true) {
                    Ok(_) => {}
                    Err(ServiceError::NotFound(_)) => {}
                    Err(e) => warn!(service, error = %e, "Forced service stop reported an error"),
                }
                RepairState::Cooldown
            }

            RepairState::Cooldown => {
                std::thread::sleep(self.cooldown);
                RepairState::Restarted
            }

            RepairState::Restarted => match self.controller.start(service) {
                Ok(_) => RepairState::Success,
                Err(e) => {
                    *error = Some(e.to_string());
                    RepairState::Failed
                }
            },

            terminal => terminal,
        }
    }
}
