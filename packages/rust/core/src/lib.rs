//! Core pipeline orchestration for mfdocs.
//!
//! This crate wires configuration, the browser session, the checkpoint
//! store, and the traversal into end-to-end workflows (e.g., `harvest`).

pub mod pipeline;

pub use mfdocs_crawler::{ArtifactOutcome, FundRecord, ProgressReporter, RunSummary, SilentProgress};
pub use mfdocs_storage::Checkpoint;
pub use pipeline::{fetch_document, harvest, progress_status, reset_progress};
