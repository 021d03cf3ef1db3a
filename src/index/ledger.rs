use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::model::task::TaskRecord;
use crate::parse::LineParser;

/// Identity used to match task occurrences across parses:
/// `path|date-or-no-date|content|commands-json`.
///
/// Textually identical tasks in one document share a signature even when
/// they sit on different lines.
pub fn signature(task: &TaskRecord) -> String {
    let date = task
        .date()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "no-date".to_string());
    let commands = serde_json::to_string(&task.commands).unwrap_or_default();
    format!(
        "{}|{}|{}|{}",
        task.path.display(),
        date,
        task.content.trim(),
        commands
    )
}

/// Triggerable tasks of one parse, grouped by signature in first-seen order.
#[derive(Debug, Default)]
pub struct Tally<'a> {
    entries: IndexMap<String, (usize, &'a TaskRecord)>,
}

impl<'a> Tally<'a> {
    /// Count tasks that are triggerable and carry at least one command.
    pub fn count(tasks: &'a [TaskRecord], parser: &dyn LineParser) -> Self {
        let mut entries: IndexMap<String, (usize, &'a TaskRecord)> = IndexMap::new();
        for task in tasks {
            if task.commands.is_empty() || !parser.is_triggerable(task) {
                continue;
            }
            entries
                .entry(signature(task))
                .and_modify(|(count, _)| *count += 1)
                .or_insert((1, task));
        }
        Tally { entries }
    }

    pub fn get(&self, signature: &str) -> usize {
        self.entries.get(signature).map_or(0, |(count, _)| *count)
    }
}

/// A signature whose count rose since the last scan. `count` is how many
/// times recurrence should fire for `task`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub signature: String,
    pub task: TaskRecord,
    pub count: usize,
}

/// Outstanding optimistic decrement. Handed back through `settle` once the
/// write lands, or `restore` if it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compensation {
    path: PathBuf,
    signature: String,
    generation: u64,
}

#[derive(Debug, Default)]
struct DocumentCounts {
    generation: u64,
    counts: HashMap<String, usize>,
    // Decrements whose write has not landed yet. A scan in between still
    // reads the done line, so these are added back when diffing.
    pending: HashMap<String, usize>,
}

/// High-water marks: per document, the count of each triggerable signature
/// seen in the latest parse.
#[derive(Debug, Default)]
pub struct CompletionLedger {
    documents: HashMap<PathBuf, DocumentCounts>,
    next_generation: u64,
}

impl CompletionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored count for a signature, 0 if never seen.
    pub fn count(&self, path: &Path, signature: &str) -> usize {
        self.documents
            .get(path)
            .and_then(|doc| doc.counts.get(signature))
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of a document's counts.
    pub fn counts(&self, path: &Path) -> HashMap<String, usize> {
        self.documents
            .get(path)
            .map(|doc| doc.counts.clone())
            .unwrap_or_default()
    }

    /// Diff a fresh tally against the stored counts, then replace the
    /// document's counts with the tally wholesale.
    ///
    /// Triggers come back in first-seen order, one per signature whose count
    /// went up. Signatures with a pending decrement are compared against
    /// their count before the decrement.
    pub fn reconcile(&mut self, path: &Path, tally: &Tally<'_>) -> Vec<Trigger> {
        let previous = self.documents.remove(path).unwrap_or_default();

        let triggers = tally
            .entries
            .iter()
            .filter_map(|(sig, (current, task))| {
                let stored = previous.counts.get(sig).copied().unwrap_or(0)
                    + previous.pending.get(sig).copied().unwrap_or(0);
                (*current > stored).then(|| Trigger {
                    signature: sig.clone(),
                    task: (*task).clone(),
                    count: current - stored,
                })
            })
            .collect();

        self.next_generation += 1;
        self.documents.insert(
            path.to_path_buf(),
            DocumentCounts {
                generation: self.next_generation,
                counts: tally
                    .entries
                    .iter()
                    .map(|(sig, (count, _))| (sig.clone(), *count))
                    .collect(),
                pending: previous.pending,
            },
        );

        triggers
    }

    /// Lower a signature's count by one, floored at zero. Returns a token for
    /// `settle` or `restore` when something was actually decremented.
    pub fn decrement(&mut self, path: &Path, signature: &str) -> Option<Compensation> {
        let doc = self.documents.get_mut(path)?;
        let count = doc.counts.get_mut(signature)?;
        if *count == 0 {
            return None;
        }
        *count -= 1;
        *doc.pending.entry(signature.to_string()).or_insert(0) += 1;
        Some(Compensation {
            path: path.to_path_buf(),
            signature: signature.to_string(),
            generation: doc.generation,
        })
    }

    /// The write behind a decrement landed. If a scan replaced the counts
    /// meanwhile it read the text from before the write, so the decrement is
    /// applied again to what that scan stored.
    pub fn settle(&mut self, compensation: &Compensation) {
        let Some(doc) = self.documents.get_mut(&compensation.path) else {
            return;
        };
        release(&mut doc.pending, &compensation.signature);
        if doc.generation != compensation.generation
            && let Some(count) = doc.counts.get_mut(&compensation.signature)
        {
            *count = count.saturating_sub(1);
        }
    }

    /// Put back a decrement whose write failed, unless a scan has replaced
    /// the counts since. Returns whether the count was restored.
    pub fn restore(&mut self, compensation: &Compensation) -> bool {
        let Some(doc) = self.documents.get_mut(&compensation.path) else {
            return false;
        };
        release(&mut doc.pending, &compensation.signature);
        if doc.generation != compensation.generation {
            return false;
        }
        *doc.counts.entry(compensation.signature.clone()).or_insert(0) += 1;
        true
    }

    #[cfg(test)]
    fn pending(&self, path: &Path, signature: &str) -> usize {
        self.documents
            .get(path)
            .and_then(|doc| doc.pending.get(signature))
            .copied()
            .unwrap_or(0)
    }
}

fn release(pending: &mut HashMap<String, usize>, signature: &str) {
    if let Some(n) = pending.get_mut(signature) {
        *n -= 1;
        if *n == 0 {
            pending.remove(signature);
        }
    }
}
