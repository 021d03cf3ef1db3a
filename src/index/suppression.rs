use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Why a scan's triggers were held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// The first full vault pass has not finished yet
    InitialLoad,
    /// First time this document is scanned this session
    FirstScan,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressReason::InitialLoad => write!(f, "initial load"),
            SuppressReason::FirstScan => write!(f, "first scan"),
        }
    }
}

/// Outcome of `SuppressionPolicy::admit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Dispatch,
    Suppress(SuppressReason),
}

/// Keeps completions that already existed before the engine saw a document
/// from firing recurrence again.
#[derive(Debug)]
pub struct SuppressionPolicy {
    visited: HashSet<PathBuf>,
    loading: bool,
    passes_in_flight: usize,
}

impl SuppressionPolicy {
    pub fn new() -> Self {
        SuppressionPolicy {
            visited: HashSet::new(),
            loading: true,
            passes_in_flight: 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn has_visited(&self, path: &Path) -> bool {
        self.visited.contains(path)
    }

    /// A full vault pass started.
    pub fn begin_pass(&mut self) {
        self.passes_in_flight += 1;
    }

    /// A full vault pass finished. The initial load ends once no other pass
    /// is still running; it never starts again.
    pub fn end_pass(&mut self) {
        self.passes_in_flight = self.passes_in_flight.saturating_sub(1);
        if self.passes_in_flight == 0 {
            self.loading = false;
        }
    }

    /// Decide whether this scan of `path` may dispatch, and record the visit.
    pub fn admit(&mut self, path: &Path) -> Gate {
        let first_scan = self.visited.insert(path.to_path_buf());
        if self.loading {
            Gate::Suppress(SuppressReason::InitialLoad)
        } else if first_scan {
            Gate::Suppress(SuppressReason::FirstScan)
        } else {
            Gate::Dispatch
        }
    }
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self::new()
    }
}
