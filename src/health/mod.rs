//! Health layer - liveness diagnosis and stop classification

pub mod diagnostician;
pub mod probe;
pub mod stop_classifier;

pub use diagnostician::{HealthDiagnostician, HealthVerdict};
pub use probe::{DatabaseProbe, ProbeResult, TcpProbe};
pub use stop_classifier::{
    tail_lines, Confidence, Evidence, EvidenceProvider, StopClassifier, StopContext,
};
