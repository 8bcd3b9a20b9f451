//! Notification layer - best-effort event delivery to external sinks
//!
//! Delivery is fault-isolated: a failing sink is logged and never fails the
//! operation that produced the event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Event kinds the core produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationKind {
    #[serde(rename = "backup.completed")]
    BackupCompleted,
    #[serde(rename = "backup.failed")]
    BackupFailed,
    #[serde(rename = "repair.completed")]
    RepairCompleted,
    #[serde(rename = "repair.failed")]
    RepairFailed,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::BackupCompleted => write!(f, "backup.completed"),
            NotificationKind::BackupFailed => write!(f, "backup.failed"),
            NotificationKind::RepairCompleted => write!(f, "repair.completed"),
            NotificationKind::RepairFailed => write!(f, "repair.failed"),
        }
    }
}

/// One outbound event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind,
            message: message.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// One delivery channel.
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Sink that writes the event into the warden's own log.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            kind = %notification.kind,
            message = %notification.message,
            "Notification"
        );
        Ok(())
    }
}

/// Sink that POSTs the event as JSON to a webhook URL.
pub struct WebhookSink {
    url: String,
    client: reqwest::blocking::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let response = self.client.post(&self.url).json(notification).send()?;
        response.error_for_status()?;
        Ok(())
    }
}

/// Routes events to all registered sinks, swallowing per-sink failures.
#[derive(Clone, Default)]
pub struct Notifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Arc<dyn NotificationSink>) {
        info!(sink = sink.name(), "Registering notification sink");
        self.sinks.push(sink);
    }

    /// Deliver to every sink. Never fails the caller.
    pub fn send(&self, notification: &Notification) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(notification) {
                warn!(sink = sink.name(), error = %e, "Notification delivery failed");
            }
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}
