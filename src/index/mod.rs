pub mod engine;
pub mod ledger;
pub mod listeners;
pub mod queue;
pub mod store;
pub mod suppression;

use std::path::PathBuf;

pub use engine::{EngineBuilder, IndexEngine, PendingWrite};
pub use ledger::{CompletionLedger, Tally, Trigger, signature};
pub use listeners::{Change, Subscription};
pub use queue::{ScanHandle, ScanQueue};
pub use store::TaskStore;
pub use suppression::{Gate, SuppressReason, SuppressionPolicy};

/// Error type for scans and document writes
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("task not found in {path}: {raw}")]
    TaskNotFound { path: PathBuf, raw: String },
    #[error("line {line} is out of range in {path}")]
    LineOutOfRange { path: PathBuf, line: usize },
    #[error("recurrence handler failed: {0}")]
    Recurrence(String),
}
