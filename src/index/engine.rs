use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::index::IndexError;
use crate::index::ledger::{CompletionLedger, Tally, signature};
use crate::index::listeners::{Change, Listeners, Subscription};
use crate::index::queue::{ScanHandle, ScanQueue};
use crate::index::store::TaskStore;
use crate::index::suppression::{Gate, SuppressionPolicy};
use crate::io::recovery::{RecoveryCategory, RecoveryEntry, log_recovery};
use crate::io::recurrence::{LogRecurrence, RecurrenceHandler};
use crate::io::repository::Repository;
use crate::io::source::DocumentSource;
use crate::model::task::{TaskId, TaskIdGen, TaskPatch, TaskRecord, TaskStatus};
use crate::parse::{LineParser, MarkdownLineParser, parse_document, serialize_task_line};

/// Everything the engine mutates, kept behind one lock.
#[derive(Debug, Default)]
struct IndexState {
    store: TaskStore,
    ledger: CompletionLedger,
    suppression: SuppressionPolicy,
}

struct Inner {
    state: Mutex<IndexState>,
    listeners: Arc<Listeners>,
    queue: ScanQueue,
    ids: TaskIdGen,
    parser: Arc<dyn LineParser>,
    source: Arc<dyn DocumentSource>,
    repository: Arc<dyn Repository>,
    recurrence: Arc<dyn RecurrenceHandler>,
    recovery_dir: Option<PathBuf>,
}

/// The live task index.
///
/// Cheap to clone; clones share the same index. All state sits behind a
/// mutex that is never held across an await, so scans of different
/// documents interleave freely while each scan's store and ledger update is
/// atomic.
///
/// Methods that start background work (`on_document_*`, `update`, `delete`)
/// must be called from within a tokio runtime.
#[derive(Clone)]
pub struct IndexEngine {
    inner: Arc<Inner>,
}

/// Configures an `IndexEngine`.
pub struct EngineBuilder {
    source: Arc<dyn DocumentSource>,
    repository: Arc<dyn Repository>,
    recurrence: Arc<dyn RecurrenceHandler>,
    parser: Arc<dyn LineParser>,
    recovery_dir: Option<PathBuf>,
}

impl EngineBuilder {
    pub fn parser(mut self, parser: Arc<dyn LineParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn recurrence(mut self, recurrence: Arc<dyn RecurrenceHandler>) -> Self {
        self.recurrence = recurrence;
        self
    }

    /// Directory for the recovery log of failed writes. Without one, failed
    /// writes are only logged.
    pub fn recovery_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recovery_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> IndexEngine {
        IndexEngine {
            inner: Arc::new(Inner {
                state: Mutex::new(IndexState::default()),
                listeners: Listeners::new(),
                queue: ScanQueue::new(),
                ids: TaskIdGen::new(),
                parser: self.parser,
                source: self.source,
                repository: self.repository,
                recurrence: self.recurrence,
                recovery_dir: self.recovery_dir,
            }),
        }
    }
}

/// Handle on a background write started by an optimistic mutation.
///
/// The write runs in its document's scan lane, so scans requested after the
/// mutation read the written text.
#[derive(Debug)]
pub struct PendingWrite(ScanHandle);

impl PendingWrite {
    /// Wait until the write has been attempted. Failures are already logged.
    pub async fn finished(self) {
        self.0.wait().await;
    }
}

impl IndexEngine {
    /// Start configuring an engine. Defaults: `MarkdownLineParser`,
    /// `LogRecurrence`, no recovery log.
    pub fn builder(source: Arc<dyn DocumentSource>, repository: Arc<dyn Repository>) -> EngineBuilder {
        EngineBuilder {
            source,
            repository,
            recurrence: Arc::new(LogRecurrence),
            parser: Arc::new(MarkdownLineParser),
            recovery_dir: None,
        }
    }

    // -----------------------------------------------------------------------
    // Host events
    // -----------------------------------------------------------------------

    /// Queue a rescan of `path` behind any scan already pending for it.
    pub fn on_document_modified(&self, path: &Path) -> ScanHandle {
        let inner = self.inner.clone();
        let owned = path.to_path_buf();
        self.inner
            .queue
            .enqueue(path, async move { inner.scan(&owned).await })
    }

    /// Queue removal of `path`'s tasks. Its completion counts are kept, so a
    /// document saved by delete-and-recreate does not fire again.
    pub fn on_document_deleted(&self, path: &Path) -> ScanHandle {
        let inner = self.inner.clone();
        let owned = path.to_path_buf();
        self.inner.queue.enqueue(path, async move {
            let removed = inner.lock().store.remove_document(&owned);
            debug!(path = %owned.display(), removed, "document deleted");
            inner.listeners.notify(&Change::everything());
            Ok(())
        })
    }

    /// The host finished laying out; index the whole vault.
    pub async fn on_layout_ready(&self) {
        self.vault_pass("layout ready").await;
    }

    /// Index the whole vault without waiting for the layout signal.
    pub async fn fallback_scan(&self) {
        self.vault_pass("fallback").await;
    }

    async fn vault_pass(&self, reason: &'static str) {
        self.inner.lock().suppression.begin_pass();

        match self.inner.source.list().await {
            Ok(paths) => {
                let handles: Vec<ScanHandle> =
                    paths.iter().map(|p| self.on_document_modified(p)).collect();
                for handle in handles {
                    handle.wait().await;
                }
                let tasks = self.inner.lock().store.len();
                info!(reason, documents = paths.len(), tasks, "vault pass finished");
            }
            Err(e) => warn!(reason, error = %e, "could not list vault documents"),
        }

        let mut state = self.inner.lock();
        let was_loading = state.suppression.is_loading();
        state.suppression.end_pass();
        if was_loading && !state.suppression.is_loading() {
            info!("initial load complete, completions now trigger recurrence");
        }
    }

    /// Wait until every scan requested so far for `path` has finished.
    pub async fn wait_for_document(&self, path: &Path) {
        self.inner.queue.wait_idle(path).await;
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn all(&self) -> Vec<TaskRecord> {
        self.inner.lock().store.all().cloned().collect()
    }

    pub fn get(&self, id: TaskId) -> Option<TaskRecord> {
        self.inner.lock().store.get(id).cloned()
    }

    pub fn by_date(&self, date: NaiveDate) -> Vec<TaskRecord> {
        self.inner.lock().store.by_date(date).into_iter().cloned().collect()
    }

    pub fn for_visual_window(&self, date: NaiveDate, boundary_hour: u32) -> Vec<TaskRecord> {
        self.inner
            .lock()
            .store
            .for_visual_window(date, boundary_hour)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn for_document(&self, path: &Path) -> Vec<TaskRecord> {
        self.inner.lock().store.for_document(path).into_iter().cloned().collect()
    }

    /// Current entry for a task reference taken before a reparse.
    pub fn resolve(&self, task: &TaskRecord) -> Option<TaskRecord> {
        self.inner.lock().store.resolve(task).cloned()
    }

    /// High-water marks for a document, by signature.
    pub fn completion_counts(&self, path: &Path) -> HashMap<String, usize> {
        self.inner.lock().ledger.counts(path)
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().suppression.is_loading()
    }

    pub fn subscribe(&self, listener: impl Fn(&Change) + Send + Sync + 'static) -> Subscription {
        self.inner.listeners.subscribe(Arc::new(listener))
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Apply `patch` to the task in memory right away, then persist it in
    /// the background, behind any scan already queued for the document.
    ///
    /// Unchecking a triggerable task lowers its completion count by one, so
    /// checking it again counts as a new completion even before a rescan.
    /// Until the write lands the decrement stays pending: a scan queued
    /// earlier still reads the done line and must not count it as new.
    /// If the write fails the in-memory task stays as patched until the next
    /// scan reads the document again; the lowered count is put back (unless
    /// a scan already replaced it) and the intended line goes to the
    /// recovery log.
    ///
    /// A recurrence handler must not await the returned `PendingWrite` for
    /// its own document: the write queues behind the scan running it.
    ///
    /// Returns `None` for an unknown id.
    pub fn update(&self, id: TaskId, patch: TaskPatch) -> Option<PendingWrite> {
        let (old, new, compensation) = {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            let Some(task) = state.store.get_mut(id) else {
                warn!(%id, "update for unknown task ignored");
                return None;
            };

            let unchecking = self.inner.parser.is_triggerable(task)
                && patch.status == Some(TaskStatus::Todo);
            let old = task.clone();
            let compensation = if unchecking {
                state.ledger.decrement(&old.path, &signature(&old))
            } else {
                None
            };
            patch.apply(task);
            // The queued write puts exactly this line on disk; a second
            // update before the next scan has to find it there.
            task.raw = serialize_task_line(task);
            (old, task.clone(), compensation)
        };

        self.inner
            .listeners
            .notify(&Change::task(id, Some(patch.changed_fields())));

        let inner = self.inner.clone();
        let path = old.path.clone();
        let handle = self.inner.queue.enqueue(&path, async move {
            match inner.repository.update_task_in_file(&old, &new).await {
                Ok(()) => {
                    if let Some(token) = compensation {
                        inner.lock().ledger.settle(&token);
                    }
                }
                Err(e) => {
                    warn!(path = %new.path.display(), line = new.line + 1, error = %e, "task update not saved");
                    if let Some(token) = compensation {
                        inner.lock().ledger.restore(&token);
                    }
                    inner.record_failed_write(RecoveryCategory::Update, &new.raw, &new, &e);
                }
            }
            Ok(())
        });
        Some(PendingWrite(handle))
    }

    /// Remove the task from the index, then delete it from its document in
    /// the background. Returns `None` for an unknown id.
    pub fn delete(&self, id: TaskId) -> Option<PendingWrite> {
        let removed = self.inner.lock().store.remove(id);
        let Some(task) = removed else {
            warn!(%id, "delete for unknown task ignored");
            return None;
        };

        self.inner.listeners.notify(&Change::task(id, None));

        let inner = self.inner.clone();
        let path = task.path.clone();
        let handle = self.inner.queue.enqueue(&path, async move {
            if let Err(e) = inner.repository.delete_task_from_file(&task).await {
                warn!(path = %task.path.display(), line = task.line + 1, error = %e, "task delete not saved");
                inner.record_failed_write(RecoveryCategory::Delete, &task.raw, &task, &e);
            }
            Ok(())
        });
        Some(PendingWrite(handle))
    }

    /// Copy the task in its document. The index picks the copy up on the
    /// next scan.
    pub async fn duplicate(&self, id: TaskId) -> Result<(), IndexError> {
        let Some(task) = self.get(id) else {
            warn!(%id, "duplicate for unknown task ignored");
            return Ok(());
        };
        self.inner.repository.duplicate_task_in_file(&task).await
    }

    /// Copy the task as an open task one week later.
    pub async fn duplicate_for_week(&self, id: TaskId) -> Result<(), IndexError> {
        let Some(task) = self.get(id) else {
            warn!(%id, "duplicate for unknown task ignored");
            return Ok(());
        };
        self.inner.repository.duplicate_task_for_week(&task).await
    }

    /// Replace one line of a document once its pending scans have finished.
    pub async fn update_line(&self, path: &Path, line: usize, text: &str) -> Result<(), IndexError> {
        self.inner.queue.wait_idle(path).await;
        self.inner.repository.update_line(path, line, text).await
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One full reparse of one document.
    async fn scan(&self, path: &Path) -> Result<(), IndexError> {
        let text = self
            .source
            .read(path)
            .await
            .map_err(|source| IndexError::ReadError {
                path: path.to_path_buf(),
                source,
            })?;
        let tasks = parse_document(&text, path, self.parser.as_ref(), &self.ids);
        let task_count = tasks.len();

        // Store and ledger are both updated before anything is dispatched
        let (triggers, gate) = {
            let mut state = self.lock();
            let triggers = {
                let tally = Tally::count(&tasks, self.parser.as_ref());
                state.ledger.reconcile(path, &tally)
            };
            let gate = state.suppression.admit(path);
            state.store.replace_document(path, tasks);
            (triggers, gate)
        };
        self.listeners.notify(&Change::everything());

        debug!(
            path = %path.display(),
            tasks = task_count,
            triggers = triggers.len(),
            "document scanned"
        );

        if let Gate::Suppress(reason) = gate {
            if !triggers.is_empty() {
                debug!(path = %path.display(), %reason, "completions suppressed");
            }
            return Ok(());
        }

        for trigger in &triggers {
            for _ in 0..trigger.count {
                if let Err(e) = self.recurrence.handle_task_completion(&trigger.task).await {
                    warn!(
                        path = %path.display(),
                        line = trigger.task.line + 1,
                        error = %e,
                        "recurrence handler failed"
                    );
                }
            }
        }
        Ok(())
    }

    fn record_failed_write(
        &self,
        category: RecoveryCategory,
        body: &str,
        task: &TaskRecord,
        error: &IndexError,
    ) {
        let Some(dir) = &self.recovery_dir else {
            return;
        };
        log_recovery(
            dir,
            RecoveryEntry {
                timestamp: Utc::now(),
                category,
                description: "task write failed".to_string(),
                fields: vec![
                    (
                        "Target".to_string(),
                        format!("{}:{}", task.path.display(), task.line + 1),
                    ),
                    ("Error".to_string(), error.to_string()),
                ],
                body: body.to_string(),
            },
        );
    }
}
