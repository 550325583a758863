pub mod base;
pub mod evolution;
pub mod orchestrator;

pub use orchestrator::{run_import, ImportOptions, RunSummary, DEFAULT_CONCURRENCY};

/// Terminal state of one phase-1 item.
#[derive(Debug)]
pub enum BaseOutcome {
    Imported { id: i64, name: String },
    Skipped(SkipReason),
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The remote confirmed the id does not exist.
    NotFound,
    /// The entity was already in the local store.
    AlreadyPresent,
}

/// Terminal state of one phase-2 item.
#[derive(Debug)]
pub enum LinkOutcome {
    Linked { id: i64, relations_created: u64 },
    Skipped,
    Error,
}
