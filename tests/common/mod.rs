//! Shared fixtures for engine tests: an in-memory vault that serves as both
//! document source and repository, and a recurrence handler that records
//! what it was given.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tally::index::{IndexEngine, IndexError};
use tally::io::recurrence::FnRecurrence;
use tally::io::repository::{Edit, Repository, apply_edit};
use tally::io::source::DocumentSource;
use tally::model::task::TaskRecord;

/// Documents held in memory, keyed by path.
#[derive(Default)]
pub struct MemoryVault {
    docs: Mutex<BTreeMap<PathBuf, String>>,
    /// Per-path scripted reads: (text to return, delay before returning)
    scripted: Mutex<HashMap<PathBuf, VecDeque<(String, Duration)>>>,
    fail_writes: AtomicBool,
    /// "read <path>" / "write <path>" in completion order
    events: Mutex<Vec<String>>,
}

impl MemoryVault {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, path: &Path, text: &str) {
        self.docs
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), text.to_string());
    }

    pub fn remove(&self, path: &Path) {
        self.docs.lock().unwrap().remove(path);
    }

    pub fn text(&self, path: &Path) -> Option<String> {
        self.docs.lock().unwrap().get(path).cloned()
    }

    /// The next read of `path` returns `text` after `delay`, regardless of
    /// what the document holds by then.
    pub fn script_read(&self, path: &Path, text: &str, delay: Duration) {
        self.scripted
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default()
            .push_back((text.to_string(), delay));
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn edit(&self, path: &Path, edit: Edit<'_>) -> Result<(), IndexError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IndexError::WriteError {
                path: path.to_path_buf(),
                source: io::Error::other("disk full"),
            });
        }
        let mut docs = self.docs.lock().unwrap();
        let text = docs.get(path).cloned().unwrap_or_default();
        let updated = apply_edit(&text, path, &edit)?;
        docs.insert(path.to_path_buf(), updated);
        self.events
            .lock()
            .unwrap()
            .push(format!("write {}", path.display()));
        Ok(())
    }
}

#[async_trait]
impl DocumentSource for MemoryVault {
    async fn read(&self, path: &Path) -> io::Result<String> {
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(|q| q.pop_front());
        let text = match scripted {
            Some((text, delay)) => {
                tokio::time::sleep(delay).await;
                Some(text)
            }
            None => self.text(path),
        };
        self.events
            .lock()
            .unwrap()
            .push(format!("read {}", path.display()));
        text.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such document"))
    }

    async fn list(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self.docs.lock().unwrap().keys().cloned().collect())
    }
}

#[async_trait]
impl Repository for MemoryVault {
    async fn update_task_in_file(&self, old: &TaskRecord, new: &TaskRecord) -> Result<(), IndexError> {
        self.edit(&old.path, Edit::Update { old, new })
    }

    async fn delete_task_from_file(&self, task: &TaskRecord) -> Result<(), IndexError> {
        self.edit(&task.path, Edit::Delete(task))
    }

    async fn duplicate_task_in_file(&self, task: &TaskRecord) -> Result<(), IndexError> {
        self.edit(&task.path, Edit::Duplicate(task))
    }

    async fn duplicate_task_for_week(&self, task: &TaskRecord) -> Result<(), IndexError> {
        self.edit(&task.path, Edit::DuplicateForWeek(task))
    }

    async fn update_line(&self, path: &Path, line: usize, text: &str) -> Result<(), IndexError> {
        self.edit(path, Edit::Line { line, text })
    }
}

/// An engine over a `MemoryVault` with recorded completions.
pub struct Harness {
    pub vault: Arc<MemoryVault>,
    pub engine: IndexEngine,
    fired: Arc<Mutex<Vec<TaskRecord>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_recovery_dir(dir: &Path) -> Self {
        Self::build(Some(dir))
    }

    fn build(recovery_dir: Option<&Path>) -> Self {
        let vault = MemoryVault::new();
        let fired: Arc<Mutex<Vec<TaskRecord>>> = Arc::default();
        let sink = fired.clone();
        let recurrence = FnRecurrence(move |task: &TaskRecord| sink.lock().unwrap().push(task.clone()));

        let mut builder = IndexEngine::builder(vault.clone(), vault.clone()).recurrence(Arc::new(recurrence));
        if let Some(dir) = recovery_dir {
            builder = builder.recovery_dir(dir);
        }

        Harness {
            vault,
            engine: builder.build(),
            fired,
        }
    }

    /// Put `text` at `path` and wait for the resulting scan.
    pub async fn write(&self, path: &Path, text: &str) {
        self.vault.put(path, text);
        self.engine.on_document_modified(path).wait().await;
    }

    /// Contents of every completion handed to the recurrence handler so far.
    pub fn fired(&self) -> Vec<String> {
        self.fired
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.content.clone())
            .collect()
    }

    /// Total high-water mark across a document's signatures.
    pub fn completions(&self, path: &Path) -> usize {
        self.engine.completion_counts(path).values().sum()
    }

    /// The only task on `line` of `path`.
    pub fn task_at(&self, path: &Path, line: usize) -> TaskRecord {
        self.engine
            .for_document(path)
            .into_iter()
            .find(|t| t.line == line)
            .unwrap_or_else(|| panic!("no task at {}:{}", path.display(), line))
    }
}
