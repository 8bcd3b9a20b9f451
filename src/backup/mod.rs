//! Backup layer - tiered snapshot pipeline, retention, verification

pub mod artifact;
pub mod pipeline;
pub mod retention;
pub mod stats;
pub mod verify;

pub use artifact::{format_size, list_artifacts, BackupArtifact};
pub use pipeline::{
    BackupError, BackupPipeline, BulkCopyStage, EnumeratedStage, ManualStage, StageTier,
};
pub use retention::{PruneSummary, RetentionManager};
pub use stats::BackupStats;
pub use verify::IntegrityVerifier;
