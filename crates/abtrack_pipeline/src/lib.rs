//! The incremental build pipeline.
//!
//! [`PipelineOrchestrator`] walks the version list stage by stage. For every
//! item it asks the artifact store and the staleness oracle whether the cached
//! artifact can be reused, and otherwise invokes the matching tool adapter and
//! records the result. Pairwise stages pull missing prerequisites (sonames,
//! dumps) on demand. Per-item failures are reported as diagnostics and never
//! abort the run; the store is checkpointed after every version and pair and
//! flushed on interrupt.

#![warn(missing_docs)]

pub mod codes;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod scan;
mod stages;
pub mod timeline;

pub use error::PipelineError;
pub use orchestrator::PipelineOrchestrator;
pub use report::{Outcome, PairSummary, RunReport, StageCounts};
pub use scan::scan_objects;
pub use timeline::{Timeline, TimelineRow};
