//! Sync pipeline for the Tally report engine.
//!
//! Jobs pull one family of marketplace data each into their own report; the
//! [`orchestrator`] runs them in dependency order and [`merge`] folds their
//! reports into the canonical one. Storage and HTTP are reached only through
//! [`ReportStore`](tally_core::store::ReportStore) and
//! [`Transport`](tally_client::Transport).

pub mod context;
pub mod error;
pub mod fanout;
pub mod jobs;
pub mod layout;
pub mod merge;
pub mod orchestrator;
pub mod settings;

pub use context::{RunContext, Shop};
pub use error::{Result, SyncError};
pub use jobs::{JobKind, JobOutput};
pub use merge::{MergePlan, MergeReport};
pub use orchestrator::{JobReport, MergeOutcome, PipelineReport, run_pipeline};
pub use settings::{PoolSizes, SyncSettings};
