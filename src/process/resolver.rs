//! Process tree resolution - find the real workload behind a supervisor wrapper

use regex::Regex;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};
use tracing::{debug, info, warn};

/// Value snapshot of one process-table row. Looked up fresh each cycle and
/// never held across calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub parent: Option<u32>,
}

/// Query seam over the OS process table. The production implementation is
/// [`ProcessTreeResolver`]; tests substitute a canned table.
pub trait ProcessQuery: Send {
    /// Resolve the leaf workload process for the service, given the pid the
    /// service registration reports (if any).
    fn resolve_leaf(&mut self, service_pid: Option<u32>) -> Option<ProcessRecord>;

    /// Terminate a process by pid. Returns false when the process is already
    /// gone or the signal could not be delivered.
    fn kill(&mut self, pid: u32) -> bool;
}

/// Resolves the real workload process behind a supervisor wrapper.
///
/// The service's registered pid may belong to a thin process-manager wrapper
/// whose only child is the actual game server. Resolution walks one level
/// down and picks the child matching the workload naming convention; zero or
/// several matches read as ambiguity and resolve to none.
pub struct ProcessTreeResolver {
    system: System,
    workload_pattern: Regex,
    wrapper_name: Option<String>,
    /// Last identity we logged, to keep the log volume bounded.
    last_resolved: Option<Option<u32>>,
}

impl ProcessTreeResolver {
    pub fn new(workload_pattern: &str, wrapper_name: Option<String>) -> anyhow::Result<Self> {
        let workload_pattern = Regex::new(workload_pattern)?;
        let mut system = System::new_all();
        system.refresh_all();
        Ok(Self {
            system,
            workload_pattern,
            wrapper_name,
            last_resolved: None,
        })
    }

    fn snapshot(&self, pid: u32) -> Option<ProcessRecord> {
        let process = self.system.process(Pid::from_u32(pid))?;
        Some(ProcessRecord {
            pid,
            name: process.name().to_string_lossy().to_string(),
            parent: process.parent().map(|p| p.as_u32()),
        })
    }

    /// Direct children of `pid`, as value snapshots.
    fn children_of(&self, pid: u32) -> Vec<ProcessRecord> {
        let parent = Pid::from_u32(pid);
        self.system
            .processes()
            .iter()
            .filter(|(_, p)| p.parent() == Some(parent))
            .map(|(child_pid, p)| ProcessRecord {
                pid: child_pid.as_u32(),
                name: p.name().to_string_lossy().to_string(),
                parent: Some(pid),
            })
            .collect()
    }

    fn is_wrapper(&self, record: &ProcessRecord) -> bool {
        if let Some(wrapper) = &self.wrapper_name {
            if record.name.to_lowercase().contains(&wrapper.to_lowercase()) {
                return true;
            }
        }
        // A service main process that does not look like the workload itself
        // but has children is treated as a wrapper.
        !self.workload_pattern.is_match(&record.name) && !self.children_of(record.pid).is_empty()
    }

    fn do_resolve(&mut self, service_pid: Option<u32>) -> Option<ProcessRecord> {
        self.system.refresh_all();

        let root = self.snapshot(service_pid?)?;

        if !self.is_wrapper(&root) {
            return Some(root);
        }

        let mut matches: Vec<ProcessRecord> = self
            .children_of(root.pid)
            .into_iter()
            .filter(|c| self.workload_pattern.is_match(&c.name))
            .collect();

        match matches.len() {
            1 => {
                // The child can vanish between enumeration and lookup; confirm
                // it is still in the table before handing it out.
                let candidate = matches.remove(0);
                self.snapshot(candidate.pid)
            }
            0 => {
                debug!(wrapper = root.pid, "Wrapper has no child matching the workload pattern");
                None
            }
            n => {
                warn!(wrapper = root.pid, candidates = n, "Ambiguous workload children, resolving to none");
                None
            }
        }
    }
}

impl ProcessQuery for ProcessTreeResolver {
    fn resolve_leaf(&mut self, service_pid: Option<u32>) -> Option<ProcessRecord> {
        let resolved = self.do_resolve(service_pid);

        let identity = resolved.as_ref().map(|r| r.pid);
        if self.last_resolved != Some(identity) {
            match &resolved {
                Some(r) => info!(pid = r.pid, name = %r.name, "Resolved workload process"),
                None => info!("Workload process not resolved"),
            }
            self.last_resolved = Some(identity);
        }

        resolved
    }

    fn kill(&mut self, pid: u32) -> bool {
        self.system.refresh_all();
        match self.system.process(Pid::from_u32(pid)) {
            Some(process) => process.kill(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_own_process() {
        let mut resolver = ProcessTreeResolver::new(".*", None).unwrap();
        let me = std::process::id();
        let record = resolver.resolve_leaf(Some(me)).unwrap();
        assert_eq!(record.pid, me);
        assert!(!record.name.is_empty());
    }

    #[test]
    fn test_resolve_missing_pid_is_none() {
        let mut resolver = ProcessTreeResolver::new(".*", None).unwrap();
        // Pid near the top of the range is almost certainly unused.
        assert!(resolver.resolve_leaf(Some(u32::MAX - 7)).is_none());
    }

    #[test]
    fn test_resolve_no_pid_is_none() {
        let mut resolver = ProcessTreeResolver::new(".*", None).unwrap();
        assert!(resolver.resolve_leaf(None).is_none());
    }

    #[test]
    fn test_kill_missing_pid_is_false() {
        let mut resolver = ProcessTreeResolver::new(".*", None).unwrap();
        assert!(!resolver.kill(u32::MAX - 7));
    }
}
