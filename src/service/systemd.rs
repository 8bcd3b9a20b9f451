//! systemd-backed ServiceController

use super::controller::{ServiceController, ServiceError, ServiceStatus};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// ServiceController implementation shelling out to `systemctl`.
pub struct SystemdController {
    systemctl: PathBuf,
}

impl SystemdController {
    pub fn new() -> Self {
        let systemctl = which::which("systemctl").unwrap_or_else(|_| PathBuf::from("systemctl"));
        Self { systemctl }
    }

    /// Query `systemctl show` and return its properties as a key/value map.
    fn show(&self, name: &str) -> Result<HashMap<String, String>, ServiceError> {
        let output = Command::new(&self.systemctl)
            .args([
                "show",
                name,
                "--property=LoadState",
                "--property=ActiveState",
                "--property=MainPID",
            ])
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let props = stdout
            .lines()
            .filter_map(|line| {
                line.split_once('=')
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            })
            .collect();

        Ok(props)
    }

    /// Map a failed systemctl invocation to a classified error.
    fn classify_failure(name: &str, stderr: &str) -> ServiceError {
        let lower = stderr.to_lowercase();
        if lower.contains("access denied")
            || lower.contains("permission denied")
            || lower.contains("authentication required")
        {
            ServiceError::AccessDenied(name.to_string())
        } else if lower.contains("not found") || lower.contains("not loaded") {
            ServiceError::NotFound(name.to_string())
        } else {
            ServiceError::InvalidState(name.to_string(), stderr.trim().to_string())
        }
    }

    fn run(&self, args: &[&str], name: &str) -> Result<(), ServiceError> {
        let output = Command::new(&self.systemctl).args(args).output()?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Self::classify_failure(name, &stderr))
        }
    }
}

impl Default for SystemdController {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceController for SystemdController {
    fn exists(&self, name: &str) -> Result<bool, ServiceError> {
        let props = self.show(name)?;
        Ok(props.get("LoadState").map(String::as_str) == Some("loaded"))
    }

    fn status(&self, name: &str) -> Result<ServiceStatus, ServiceError> {
        let props = self.show(name)?;

        if props.get("LoadState").map(String::as_str) != Some("loaded") {
            return Ok(ServiceStatus::NotFound);
        }

        let status = match props.get("ActiveState").map(String::as_str) {
            Some("active") => ServiceStatus::Running,
            Some("inactive") | Some("failed") => ServiceStatus::Stopped,
            _ => ServiceStatus::Unknown,
        };

        Ok(status)
    }

    fn start(&self, name: &str) -> Result<bool, ServiceError> {
        match self.status(name)? {
            ServiceStatus::Running => {
                debug!(service = name, "Start requested but already running");
                return Ok(true);
            }
            ServiceStatus::NotFound => return Err(ServiceError::NotFound(name.to_string())),
            _ => {}
        }

        self.run(&["start", name], name)?;
        Ok(true)
    }

    fn stop(&self, name: &str, force: bool) -> Result<bool, ServiceError> {
        match self.status(name)? {
            ServiceStatus::Stopped => {
                debug!(service = name, "Stop requested but already stopped");
                return Ok(true);
            }
            ServiceStatus::NotFound => return Err(ServiceError::NotFound(name.to_string())),
            _ => {}
        }

        if force {
            // SIGKILL the whole cgroup; a service that exited in the meantime
            // reads as already stopped, which is still success.
            match self.run(&["kill", "-s", "SIGKILL", name], name) {
                Ok(()) => {}
                Err(ServiceError::InvalidState(_, ref msg)) if msg.contains("not running") => {}
                Err(e) => return Err(e),
            }
        }
        self.run(&["stop", name], name)?;
        Ok(true)
    }

    fn main_pid(&self, name: &str) -> Option<u32> {
        let props = self.show(name).ok()?;
        props
            .get("MainPID")
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|&pid| pid > 0)
    }
}
