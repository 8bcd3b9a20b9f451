//! Stop classification - was the last stop intentional or a crash?
//!
//! Evidence sources are consulted in confidence order and the first strong
//! match wins. Nothing matching means crash: restarting a server someone shut
//! down on purpose is annoying, not restarting a crashed one loses the night.

use chrono::{Local, Timelike};
use regex::Regex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How much weight a matched evidence source carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Decides the classification on its own
    Strong,
    /// Logged for context, never decides anything
    Hint,
}

/// Result of evaluating one evidence source.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub matched: bool,
    pub confidence: Confidence,
    pub detail: String,
}

impl Evidence {
    pub fn none() -> Self {
        Self {
            matched: false,
            confidence: Confidence::Strong,
            detail: String::new(),
        }
    }
}

/// Inputs shared by all evidence sources for one classification call.
pub struct StopContext {
    pub service_name: String,
    pub data_dir: PathBuf,
    pub lookback: Duration,
}

/// One independent evidence source. Evaluation must never panic; internal
/// failures read as "no match".
pub trait EvidenceProvider: Send {
    fn name(&self) -> &'static str;
    fn evaluate(&self, ctx: &StopContext) -> Evidence;
}

/// Ordered evidence aggregator. Ordering is part of the contract: recovery
/// behavior depends on the stronger sources being consulted first.
pub struct StopClassifier {
    providers: Vec<Box<dyn EvidenceProvider>>,
}

impl StopClassifier {
    /// Classifier with the standard provider chain.
    pub fn new(log_file_name: &str) -> Self {
        Self {
            providers: vec![
                Box::new(JournalEventLog),
                Box::new(ServiceStateLog),
                Box::new(LogTailShutdown::new(log_file_name)),
                Box::new(TimeOfDayHint),
            ],
        }
    }

    /// Classifier over an explicit provider chain (used by tests).
    pub fn with_providers(providers: Vec<Box<dyn EvidenceProvider>>) -> Self {
        Self { providers }
    }

    /// Returns true when the stop looks intentional.
    pub fn classify(&self, ctx: &StopContext) -> bool {
        for provider in &self.providers {
            let evidence = provider.evaluate(ctx);
            if !evidence.matched {
                continue;
            }
            match evidence.confidence {
                Confidence::Strong => {
                    info!(
                        source = provider.name(),
                        detail = %evidence.detail,
                        "Stop classified as intentional"
                    );
                    return true;
                }
                Confidence::Hint => {
                    debug!(
                        source = provider.name(),
                        detail = %evidence.detail,
                        "Weak stop hint (ignored for classification)"
                    );
                }
            }
        }

        info!(service = %ctx.service_name, "No stop evidence found, classifying as crash");
        false
    }
}

fn stop_vocabulary() -> Regex {
    Regex::new(r"(?i)\b(stopp(ed|ing)|terminat(ed|ing)|shut\s?down|shutting down)\b")
        .unwrap_or_else(|_| unreachable!("static regex"))
}

/// Whether a single event-log line names the service together with stop
/// vocabulary within the same entry.
pub fn entry_indicates_stop(line: &str, service_name: &str) -> bool {
    line.to_lowercase().contains(&service_name.to_lowercase()) && stop_vocabulary().is_match(line)
}

fn journal_lines(args: &[&str], lookback: Duration) -> Vec<String> {
    let since = format!("-{}s", lookback.as_secs());
    let result = Command::new("journalctl")
        .args(args)
        .args(["--since", &since, "--no-pager"])
        .output();

    match result {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect(),
        Ok(output) => {
            debug!(status = %output.status, "journalctl query unsuccessful");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "journalctl unavailable");
            Vec::new()
        }
    }
}

/// Source 1: application-level event log entries naming the service with
/// stop vocabulary.
struct JournalEventLog;

impl EvidenceProvider for JournalEventLog {
    fn name(&self) -> &'static str {
        "event-log"
    }

    fn evaluate(&self, ctx: &StopContext) -> Evidence {
        let lines = journal_lines(&["--identifier", &ctx.service_name], ctx.lookback);
        for line in &lines {
            if entry_indicates_stop(line, &ctx.service_name) {
                return Evidence {
                    matched: true,
                    confidence: Confidence::Strong,
                    detail: line.clone(),
                };
            }
        }
        Evidence::none()
    }
}

/// Source 2: init-system state-change log showing a stop transition for the
/// unit within the window.
struct ServiceStateLog;

impl EvidenceProvider for ServiceStateLog {
    fn name(&self) -> &'static str {
        "service-state-log"
    }

    fn evaluate(&self, ctx: &StopContext) -> Evidence {
        let unit = format!("{}.service", ctx.service_name.trim_end_matches(".service"));
        let lines = journal_lines(&["-u", &unit, "-o", "cat"], ctx.lookback);
        for line in &lines {
            let trimmed = line.trim();
            if trimmed.starts_with("Stopped")
                || trimmed.starts_with("Stopping")
                || trimmed.starts_with("Deactivated successfully")
            {
                return Evidence {
                    matched: true,
                    confidence: Confidence::Strong,
                    detail: trimmed.to_string(),
                };
            }
        }
        Evidence::none()
    }
}

/// Fixed clean-shutdown phrases game servers print on an orderly exit.
const CLEAN_SHUTDOWN_PATTERNS: &[&str] = &[
    r"(?i)world saved",
    r"(?i)save complete",
    r"(?i)shutting down",
    r"(?i)shutdown complete",
    r"(?i)server (closed|stopped)",
    r"(?i)goodbye",
];

/// How many trailing log lines are inspected.
const TAIL_LINES: usize = 20;
/// Bounded read size from the end of the log; enough for 20 lines of any
/// sane server log without ever loading the whole file.
const TAIL_READ_BYTES: u64 = 16 * 1024;

/// Read at most the last `max_lines` lines of a file without loading it
/// whole: seek near the end and split what fits in one bounded read.
pub fn tail_lines(path: &Path, max_lines: usize) -> std::io::Result<Vec<String>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(TAIL_READ_BYTES);
    file.seek(SeekFrom::Start(start))?;

    let mut buf = String::new();
    file.take(TAIL_READ_BYTES).read_to_string(&mut buf)?;

    let mut lines: Vec<String> = buf.lines().map(str::to_string).collect();
    // The first line may be a partial one when we seeked mid-line.
    if start > 0 && !lines.is_empty() {
        lines.remove(0);
    }
    let skip = lines.len().saturating_sub(max_lines);
    Ok(lines.split_off(skip))
}

/// Source 3: clean-shutdown phrases in the tail of the primary log.
struct LogTailShutdown {
    log_file_name: String,
    patterns: Vec<Regex>,
}

impl LogTailShutdown {
    fn new(log_file_name: &str) -> Self {
        let patterns = CLEAN_SHUTDOWN_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self {
            log_file_name: log_file_name.to_string(),
            patterns,
        }
    }
}

impl EvidenceProvider for LogTailShutdown {
    fn name(&self) -> &'static str {
        "log-tail"
    }

    fn evaluate(&self, ctx: &StopContext) -> Evidence {
        let path = ctx.data_dir.join(&self.log_file_name);
        let lines = match tail_lines(&path, TAIL_LINES) {
            Ok(lines) => lines,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Log tail unreadable");
                return Evidence::none();
            }
        };

        for line in &lines {
            if self.patterns.iter().any(|p| p.is_match(line)) {
                return Evidence {
                    matched: true,
                    confidence: Confidence::Strong,
                    detail: line.clone(),
                };
            }
        }
        Evidence::none()
    }
}

/// Source 4: time of day. Stops during the usual maintenance window are
/// slightly more likely to be intentional. Collected as context only; the
/// classification outcome never turns on it.
struct TimeOfDayHint;

impl EvidenceProvider for TimeOfDayHint {
    fn name(&self) -> &'static str {
        "time-of-day"
    }

    fn evaluate(&self, _ctx: &StopContext) -> Evidence {
        let hour = Local::now().hour();
        let in_maintenance_window = (3..6).contains(&hour);
        Evidence {
            matched: in_maintenance_window,
            confidence: Confidence::Hint,
            detail: format!("local hour {hour}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_entry_indicates_stop() {
        assert!(entry_indicates_stop(
            "Service game-server stopped by administrator",
            "game-server"
        ));
        assert!(entry_indicates_stop("game-server: shutting down", "game-server"));
        assert!(!entry_indicates_stop("game-server started", "game-server"));
        assert!(!entry_indicates_stop("other-daemon stopped", "game-server"));
    }

    #[test]
    fn test_tail_lines_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.log");
        let mut file = File::create(&path).unwrap();
        for i in 0..5000 {
            writeln!(file, "line number {i}").unwrap();
        }

        let tail = tail_lines(&path, 20).unwrap();
        assert_eq!(tail.len(), 20);
        assert_eq!(tail.last().unwrap(), "line number 4999");
        assert_eq!(tail.first().unwrap(), "line number 4980");
    }

    #[test]
    fn test_tail_lines_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.log");
        std::fs::write(&path, "one\ntwo\n").unwrap();

        let tail = tail_lines(&path, 20).unwrap();
        assert_eq!(tail, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_log_tail_provider_matches_clean_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("server.log"), "tick\nWorld saved\n").unwrap();

        let ctx = StopContext {
            service_name: "game".to_string(),
            data_dir: dir.path().to_path_buf(),
            lookback: Duration::from_secs(600),
        };
        let evidence = LogTailShutdown::new("server.log").evaluate(&ctx);
        assert!(evidence.matched);
        assert_eq!(evidence.confidence, Confidence::Strong);
    }

    #[test]
    fn test_hint_never_decides() {
        struct AlwaysHint;
        impl EvidenceProvider for AlwaysHint {
            fn name(&self) -> &'static str {
                "hint"
            }
            fn evaluate(&self, _: &StopContext) -> Evidence {
                Evidence {
                    matched: true,
                    confidence: Confidence::Hint,
                    detail: "hint".to_string(),
                }
            }
        }

        let classifier = StopClassifier::with_providers(vec![Box::new(AlwaysHint)]);
        let ctx = StopContext {
            service_name: "game".to_string(),
            data_dir: PathBuf::from("/tmp"),
            lookback: Duration::from_secs(600),
        };
        assert!(!classifier.classify(&ctx));
    }
}
