//! Supervisor - the single serial controller over health, repair and backups
//!
//! One instance is constructed at startup and owns all long-lived state,
//! including the duplicate-log-suppression cache inside the resolver. Health
//! checks, repairs and backups run strictly one after another; nothing here
//! is concurrent, which is what makes the backup invariants hold.

use crate::backup::{BackupArtifact, BackupError, BackupPipeline, BackupStats, IntegrityVerifier, PruneSummary, RetentionManager};
use crate::config::WardenConfig;
use crate::health::{DatabaseProbe, HealthDiagnostician, HealthVerdict, StopClassifier, StopContext, TcpProbe};
use crate::notify::{LogSink, Notification, NotificationKind, Notifier, WebhookSink};
use crate::process::ProcessTreeResolver;
use crate::repair::{RepairEscalator, RepairReport, StartupWatcher};
use crate::service::{ServiceController, SystemdController};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct Supervisor {
    config: WardenConfig,
    controller: Arc<dyn ServiceController>,
    resolver: ProcessTreeResolver,
    diagnostician: HealthDiagnostician,
    classifier: StopClassifier,
    escalator: RepairEscalator,
    startup: StartupWatcher,
    retention: RetentionManager,
    notifier: Notifier,
    probe: Option<Box<dyn DatabaseProbe>>,
    last_backup: Option<Instant>,
}

impl Supervisor {
    pub fn from_config(config: WardenConfig) -> Result<Self> {
        let controller: Arc<dyn ServiceController> = Arc::new(SystemdController::new());
        Self::with_controller(config, controller)
    }

    /// Construction over an injected controller (used by tests).
    pub fn with_controller(
        config: WardenConfig,
        controller: Arc<dyn ServiceController>,
    ) -> Result<Self> {
        let resolver = ProcessTreeResolver::new(
            &config.workload_pattern,
            config.wrapper_process.clone(),
        )
        .context("Invalid workload pattern")?;

        let mut notifier = Notifier::new();
        notifier.register(Arc::new(LogSink));
        if let Some(url) = &config.webhook_url {
            match WebhookSink::new(url.clone()) {
                Ok(sink) => notifier.register(Arc::new(sink)),
                Err(e) => warn!(error = %e, "Webhook sink unavailable"),
            }
        }

        let probe: Option<Box<dyn DatabaseProbe>> = config
            .database_probe_addr
            .as_ref()
            .map(|addr| Box::new(TcpProbe::new(addr.clone(), Duration::from_secs(3))) as Box<dyn DatabaseProbe>);

        Ok(Self {
            diagnostician: HealthDiagnostician::new(
                controller.clone(),
                Duration::from_secs(config.staleness_minutes * 60),
            ),
            classifier: StopClassifier::new(&config.log_file_name),
            escalator: RepairEscalator::new(
                controller.clone(),
                Duration::from_secs(config.repair_cooldown_secs),
            ),
            startup: StartupWatcher::new(
                Duration::from_secs(2),
                Duration::from_secs(config.startup_timeout_secs),
            ),
            retention: RetentionManager::new(&config.backup_root, config.max_backups),
            notifier,
            probe,
            resolver,
            controller,
            config,
            last_backup: None,
        })
    }

    /// One health check against the configured service.
    pub fn check_health(&mut self) -> HealthVerdict {
        let log_path = self.config.primary_log_path();
        self.diagnostician.diagnose(
            &self.config.service_name,
            &mut self.resolver,
            Some(log_path.as_path()),
            self.probe.as_deref(),
        )
    }

    /// Was the last stop intentional?
    pub fn classify_stop(&self) -> bool {
        self.classifier.classify(&StopContext {
            service_name: self.config.service_name.clone(),
            data_dir: self.config.source_path.clone(),
            lookback: Duration::from_secs(self.config.stop_lookback_minutes * 60),
        })
    }

    /// Escalating repair plus startup wait, with the outcome notified.
    pub fn repair(&mut self) -> RepairReport {
        let report = self
            .escalator
            .repair(&self.config.service_name, &mut self.resolver);

        if report.succeeded() {
            match self.startup.wait(self.controller.as_ref(), &self.config.service_name) {
                Some(elapsed) => {
                    self.notifier.send(&Notification::new(
                        NotificationKind::RepairCompleted,
                        format!(
                            "Service {} repaired and running after {:.1}s",
                            self.config.service_name,
                            elapsed.as_secs_f64()
                        ),
                        json!({ "elapsedMs": elapsed.as_millis() as u64 }),
                    ));
                }
                None => {
                    self.notifier.send(&Notification::new(
                        NotificationKind::RepairFailed,
                        format!(
                            "Service {} restarted but never reached running",
                            self.config.service_name
                        ),
                        json!({ "transitions": report.transitions.clone() }),
                    ));
                }
            }
        } else {
            self.notifier.send(&Notification::new(
                NotificationKind::RepairFailed,
                format!("Repair of {} failed", self.config.service_name),
                json!({ "error": report.error.clone(), "transitions": report.transitions.clone() }),
            ));
        }

        report
    }

    /// One backup run behind the per-root gate, followed by retention and
    /// verification.
    pub fn backup(&mut self) -> Result<BackupArtifact, BackupError> {
        let _gate = match acquire_backup_gate(&self.config.backup_root) {
            Some(gate) => gate,
            None => {
                warn!(root = %self.config.backup_root.display(), "Another backup holds the root, skipping");
                return Err(BackupError::RootBusy(self.config.backup_root.clone()));
            }
        };

        let pipeline = BackupPipeline::new(
            &self.config.source_path,
            &self.config.backup_root,
            self.config.compress_backups,
            &self.config.log_file_name,
            self.notifier.clone(),
        );

        let artifact = pipeline.run()?;
        self.last_backup = Some(Instant::now());

        if !IntegrityVerifier::verify(&artifact.path) {
            warn!(path = %artifact.path.display(), "Backup artifact failed verification");
        }
        if let Err(e) = self.retention.prune() {
            warn!(error = %e, "Retention pass failed");
        }

        Ok(artifact)
    }

    /// Retention pass alone.
    pub fn prune(&self) -> Result<PruneSummary> {
        self.retention.prune()
    }

    /// Backup statistics for the configured root.
    pub fn stats(&self) -> Result<BackupStats> {
        BackupStats::gather(&self.config.backup_root)
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    fn backup_due(&self) -> bool {
        let interval = Duration::from_secs(self.config.backup_interval_minutes * 60);
        match self.last_backup {
            Some(last) => last.elapsed() >= interval,
            None => true,
        }
    }

    /// The watch loop: health check every poll interval, repair on crash,
    /// scheduled backups. Fully blocking by design (operations are serial,
    /// with no mid-operation cancellation); runs until the hosting process
    /// is terminated.
    pub fn run(&mut self) -> Result<()> {
        info!(
            service = %self.config.service_name,
            poll_secs = self.config.poll_interval_secs,
            "Warden watching"
        );

        loop {
            let verdict = self.check_health();

            if verdict.is_healthy {
                if self.backup_due() {
                    let _ = self.backup();
                }
            } else {
                warn!(reason = %verdict.reason, "Service unhealthy");
                if self.classify_stop() {
                    info!("Stop looks intentional, leaving the service alone");
                } else {
                    info!("Stop looks like a crash, repairing");
                    self.repair();
                }
            }

            std::thread::sleep(Duration::from_secs(self.config.poll_interval_secs));
        }
    }
}

/// Advisory per-root exclusion gate. The lock is released when the returned
/// handle drops; a root held by another process skips the run instead of
/// queueing behind it.
fn acquire_backup_gate(root: &Path) -> Option<File> {
    std::fs::create_dir_all(root).ok()?;
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(root.join(".warden.lock"))
        .ok()?;
    file.try_lock_exclusive().ok()?;
    Some(file)
}
