//! Pipeline orchestration
//!
//! Sequences the bronze and silver stages for one partition and reports a
//! single [`RunOutcome`] to the hosting scheduler.

pub mod orchestrator;
pub mod target;
pub mod types;

pub use orchestrator::PipelineOrchestrator;
pub use target::ReportTarget;
pub use types::{BronzeRecord, PartitionKey, RunContext, RunOutcome, RunStats, SilverRecord};
