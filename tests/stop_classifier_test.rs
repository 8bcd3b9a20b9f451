//! Stop classification: ordered evidence, first strong match wins, crash by
//! default

use server_warden::health::stop_classifier::{
    entry_indicates_stop, Confidence, Evidence, EvidenceProvider, StopClassifier, StopContext,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn ctx() -> StopContext {
    StopContext {
        service_name: "game-server".to_string(),
        data_dir: PathBuf::from("/tmp"),
        lookback: Duration::from_secs(600),
    }
}

/// Provider backed by canned event-log lines, reusing the production
/// line-matching rule.
struct SyntheticEventLog {
    lines: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl EvidenceProvider for SyntheticEventLog {
    fn name(&self) -> &'static str {
        "synthetic-event-log"
    }

    fn evaluate(&self, ctx: &StopContext) -> Evidence {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for line in &self.lines {
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

struct NeverMatches;

impl EvidenceProvider for NeverMatches {
    fn name(&self) -> &'static str {
        "never"
    }
    fn evaluate(&self, _: &StopContext) -> Evidence {
        Evidence::none()
    }
}

#[test]
fn test_event_log_entry_with_stop_vocabulary_is_intentional() {
    let classifier = StopClassifier::with_providers(vec![Box::new(SyntheticEventLog {
        lines: vec!["Service game-server stopped by administrator request".to_string()],
        calls: Arc::new(AtomicUsize::new(0)),
    })]);
    assert!(classifier.classify(&ctx()));
}

#[test]
fn test_no_evidence_defaults_to_crash() {
    let classifier =
        StopClassifier::with_providers(vec![Box::new(NeverMatches), Box::new(NeverMatches)]);
    assert!(!classifier.classify(&ctx()));
}

#[test]
fn test_first_match_short_circuits_later_providers() {
    let first_calls = Arc::new(AtomicUsize::new(0));
    let second_calls = Arc::new(AtomicUsize::new(0));

    let classifier = StopClassifier::with_providers(vec![
        Box::new(SyntheticEventLog {
            lines: vec!["game-server: shutting down".to_string()],
            calls: first_calls.clone(),
        }),
        Box::new(SyntheticEventLog {
            lines: vec!["game-server terminated".to_string()],
            calls: second_calls.clone(),
        }),
    ]);

    assert!(classifier.classify(&ctx()));
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_entry_must_name_the_service() {
    let classifier = StopClassifier::with_providers(vec![Box::new(SyntheticEventLog {
        lines: vec!["Service other-daemon stopped".to_string()],
        calls: Arc::new(AtomicUsize::new(0)),
    })]);
    assert!(!classifier.classify(&ctx()));
}

#[test]
fn test_start_vocabulary_does_not_match() {
    let classifier = StopClassifier::with_providers(vec![Box::new(SyntheticEventLog {
        lines: vec!["Service game-server started".to_string()],
        calls: Arc::new(AtomicUsize::new(0)),
    })]);
    assert!(!classifier.classify(&ctx()));
}
