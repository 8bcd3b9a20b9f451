//! Process table layer - resolving the workload process behind a wrapper

pub mod resolver;

pub use resolver::{ProcessQuery, ProcessRecord, ProcessTreeResolver};
