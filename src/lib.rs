//! Server Warden - keep a game-server process alive and its save data safe
//!
//! Fault-tolerance core for a single-host game server: process-health
//! diagnosis, crash-vs-intentional-stop classification, escalating
//! repair/restart, and a tiered backup/retention pipeline.

pub mod backup;
pub mod config;
pub mod health;
pub mod notify;
pub mod process;
pub mod repair;
pub mod service;
pub mod supervisor;

pub use backup::{
    format_size, list_artifacts, BackupArtifact, BackupError, BackupPipeline, BackupStats,
    IntegrityVerifier, PruneSummary, RetentionManager, StageTier,
};
pub use config::WardenConfig;
pub use health::{
    DatabaseProbe, HealthDiagnostician, HealthVerdict, ProbeResult, StopClassifier, StopContext,
    TcpProbe,
};
pub use notify::{
    LogSink, Notification, NotificationKind, NotificationSink, Notifier, WebhookSink,
};
pub use process::{ProcessQuery, ProcessRecord, ProcessTreeResolver};
pub use repair::{RepairEscalator, RepairReport, RepairState, StartupWatcher};
pub use service::{ServiceController, ServiceError, ServiceStatus, SystemdController};
pub use supervisor::Supervisor;
