//! Integration tests for the live index: scanning, completion detection,
//! suppression and the optimistic mutation pipeline.

mod common;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::Harness;
use tally::index::Change;
use tally::model::task::{TaskId, TaskPatch, TaskStatus};

const CHORES: &str = "/vault/chores.md";
const WORK: &str = "/vault/work.md";

const OPEN: &str = "- [ ] Water plants %repeat(weekly)\n";
const DONE: &str = "- [x] Water plants %repeat(weekly)\n";

fn chores() -> &'static Path {
    Path::new(CHORES)
}

fn work() -> &'static Path {
    Path::new(WORK)
}

/// A harness whose initial load has finished over `docs`.
async fn loaded(docs: &[(&Path, &str)]) -> Harness {
    let h = Harness::new();
    for (path, text) in docs {
        h.vault.put(path, text);
    }
    h.engine.on_layout_ready().await;
    h
}

// ---------------------------------------------------------------------------
// Completion detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rescanning_unchanged_document_is_idempotent() {
    let h = loaded(&[(chores(), OPEN)]).await;

    h.write(chores(), DONE).await;
    assert_eq!(h.fired(), vec!["Water plants"]);
    let counts = h.engine.completion_counts(chores());

    for _ in 0..3 {
        h.engine.on_document_modified(chores()).wait().await;
    }
    assert_eq!(h.fired().len(), 1);
    assert_eq!(h.engine.completion_counts(chores()), counts);
    assert_eq!(h.engine.for_document(chores()).len(), 1);
}

#[tokio::test]
async fn test_completion_fires_exactly_once() {
    let h = loaded(&[(chores(), OPEN)]).await;
    assert!(h.fired().is_empty());

    h.write(chores(), DONE).await;
    h.write(chores(), DONE).await;

    assert_eq!(h.fired(), vec!["Water plants"]);
    assert_eq!(h.completions(chores()), 1);
}

#[tokio::test]
async fn test_multiplicity_increase_fires_difference() {
    let h = loaded(&[(chores(), OPEN)]).await;

    h.write(chores(), DONE).await;
    assert_eq!(h.fired().len(), 1);

    h.write(chores(), &DONE.repeat(3)).await;
    assert_eq!(h.fired().len(), 3);
    assert_eq!(h.completions(chores()), 3);

    // Falling back lowers the mark, so rising again fires again
    h.write(chores(), DONE).await;
    assert_eq!(h.fired().len(), 3);
    assert_eq!(h.completions(chores()), 1);

    h.write(chores(), &DONE.repeat(2)).await;
    assert_eq!(h.fired().len(), 4);
}

#[tokio::test]
async fn test_tasks_without_commands_never_fire() {
    let h = loaded(&[(chores(), "- [ ] Buy milk\n")]).await;
    h.write(chores(), "- [x] Buy milk\n").await;

    assert!(h.fired().is_empty());
    assert_eq!(h.engine.all()[0].status, TaskStatus::Done);
}

#[tokio::test]
async fn test_cancelled_counts_as_completion() {
    let h = loaded(&[(chores(), OPEN)]).await;
    h.write(chores(), "- [-] Water plants %repeat(weekly)\n").await;
    assert_eq!(h.fired(), vec!["Water plants"]);
}

#[tokio::test]
async fn test_child_block_travels_with_task() {
    let h = loaded(&[(chores(), OPEN)]).await;
    h.write(
        chores(),
        "- [x] Water plants %repeat(weekly)\n  - [x] nested line stays a child\n\n- [ ] Next\n",
    )
    .await;

    let tasks = h.engine.for_document(chores());
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].children, vec!["  - [x] nested line stays a child", ""]);
    assert_eq!(h.fired(), vec!["Water plants"]);
}

// ---------------------------------------------------------------------------
// Suppression
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_initial_load_is_suppressed() {
    let h = Harness::new();
    h.vault.put(chores(), DONE);
    h.vault.put(work(), "- [x] Send report %repeat(monthly)\n");
    assert!(h.engine.is_loading());

    h.engine.on_layout_ready().await;

    assert!(!h.engine.is_loading());
    assert!(h.fired().is_empty());
    assert_eq!(h.engine.all().len(), 2);
    assert_eq!(h.completions(chores()), 1);
}

#[tokio::test]
async fn test_scans_before_layout_ready_are_suppressed() {
    let h = Harness::new();
    h.write(chores(), OPEN).await;
    h.write(chores(), DONE).await;
    assert!(h.fired().is_empty());

    h.engine.on_layout_ready().await;
    h.write(chores(), &DONE.repeat(2)).await;
    assert_eq!(h.fired().len(), 1);
}

#[tokio::test]
async fn test_first_scan_of_new_document_is_suppressed() {
    let h = loaded(&[(chores(), OPEN)]).await;

    // Created after the initial load with a completion already in it
    h.write(work(), "- [x] Send report %repeat(monthly)\n").await;
    assert!(h.fired().is_empty());

    h.write(
        work(),
        "- [x] Send report %repeat(monthly)\n- [x] File taxes %repeat(yearly)\n",
    )
    .await;
    assert_eq!(h.fired(), vec!["File taxes"]);
}

#[tokio::test]
async fn test_fallback_scan_ends_loading() {
    let h = Harness::new();
    h.vault.put(chores(), DONE);
    h.engine.fallback_scan().await;
    assert!(!h.engine.is_loading());

    // A later layout pass does not reopen the loading phase
    h.engine.on_layout_ready().await;
    assert!(!h.engine.is_loading());
    assert!(h.fired().is_empty());
}

// ---------------------------------------------------------------------------
// Scan queue
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_scans_of_one_document_apply_in_order() {
    let h = loaded(&[(chores(), OPEN)]).await;

    // The first read resolves long after the second would have
    h.vault.script_read(chores(), "- [ ] stale\n", Duration::from_millis(200));
    h.vault.script_read(chores(), "- [ ] fresh\n", Duration::ZERO);
    let first = h.engine.on_document_modified(chores());
    let second = h.engine.on_document_modified(chores());
    first.wait().await;
    second.wait().await;

    let contents: Vec<String> = h.engine.for_document(chores()).into_iter().map(|t| t.content).collect();
    assert_eq!(contents, vec!["fresh"]);
}

#[tokio::test(start_paused = true)]
async fn test_documents_scan_independently() {
    let h = loaded(&[]).await;
    h.vault.script_read(chores(), OPEN, Duration::from_secs(5));
    h.vault.put(work(), "- [ ] Send report\n");

    let slow = h.engine.on_document_modified(chores());
    h.engine.on_document_modified(work()).wait().await;

    assert_eq!(h.engine.for_document(work()).len(), 1);
    assert!(h.engine.for_document(chores()).is_empty());

    slow.wait().await;
    assert_eq!(h.engine.for_document(chores()).len(), 1);
}

#[tokio::test]
async fn test_failed_scan_does_not_block_later_scans() {
    let h = loaded(&[]).await;

    // Nothing at this path yet: the read fails
    h.engine.on_document_modified(chores()).wait().await;
    assert!(h.engine.for_document(chores()).is_empty());

    h.write(chores(), OPEN).await;
    assert_eq!(h.engine.for_document(chores()).len(), 1);
}

// ---------------------------------------------------------------------------
// Documents coming and going
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_deleted_document_keeps_completion_counts() {
    let h = loaded(&[(chores(), OPEN), (work(), "- [ ] Send report\n")]).await;
    h.write(chores(), DONE).await;
    assert_eq!(h.fired().len(), 1);

    h.vault.remove(chores());
    h.engine.on_document_deleted(chores()).wait().await;
    assert!(h.engine.for_document(chores()).is_empty());
    assert_eq!(h.engine.all().len(), 1);
    assert_eq!(h.completions(chores()), 1);

    // Saved back by delete-and-recreate: nothing new completed
    h.write(chores(), DONE).await;
    assert_eq!(h.fired().len(), 1);
}

#[tokio::test]
async fn test_resolve_follows_task_across_reparse() {
    let h = loaded(&[(chores(), OPEN)]).await;
    let before = h.task_at(chores(), 0);

    h.write(chores(), &format!("# Chores\n{}", OPEN)).await;

    let resolved = h.engine.resolve(&before).unwrap();
    assert_ne!(resolved.id, before.id);
    assert_eq!(resolved.line, 1);
    assert_eq!(resolved.content, "Water plants");

    h.write(chores(), "- [ ] Something else\n").await;
    assert!(h.engine.resolve(&before).is_none());
}

// ---------------------------------------------------------------------------
// Optimistic mutations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_uncheck_then_recheck_fires_again() {
    let h = loaded(&[(chores(), DONE)]).await;
    assert_eq!(h.completions(chores()), 1);
    let task = h.task_at(chores(), 0);

    h.engine
        .update(task.id, TaskPatch::status(TaskStatus::Todo))
        .unwrap()
        .finished()
        .await;
    assert_eq!(h.engine.get(task.id).unwrap().status, TaskStatus::Todo);
    assert_eq!(h.vault.text(chores()).unwrap(), OPEN);
    assert_eq!(h.completions(chores()), 0);

    // The watcher reports our own write
    h.engine.on_document_modified(chores()).wait().await;
    assert!(h.fired().is_empty());

    let reopened = h.task_at(chores(), 0);
    h.engine
        .update(reopened.id, TaskPatch::status(TaskStatus::Done))
        .unwrap()
        .finished()
        .await;
    h.engine.on_document_modified(chores()).wait().await;

    assert_eq!(h.fired(), vec!["Water plants"]);
}

#[tokio::test]
async fn test_uncheck_decrements_before_the_write_lands() {
    let h = loaded(&[(chores(), DONE)]).await;
    let task = h.task_at(chores(), 0);

    let pending = h.engine.update(task.id, TaskPatch::status(TaskStatus::Todo)).unwrap();
    assert_eq!(h.completions(chores()), 0);
    assert_eq!(h.engine.get(task.id).unwrap().status, TaskStatus::Todo);
    pending.finished().await;
}

#[tokio::test(start_paused = true)]
async fn test_rescan_after_uncheck_reads_the_written_text() {
    let h = loaded(&[(chores(), DONE)]).await;
    let task = h.task_at(chores(), 0);

    let pending = h.engine.update(task.id, TaskPatch::status(TaskStatus::Todo)).unwrap();
    // Requested before the write is awaited; still runs after it
    h.engine.on_document_modified(chores()).wait().await;
    pending.finished().await;

    assert!(h.fired().is_empty());
    assert_eq!(h.task_at(chores(), 0).status, TaskStatus::Todo);
    assert_eq!(h.completions(chores()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scan_queued_before_uncheck_does_not_refire() {
    let h = loaded(&[(chores(), DONE)]).await;
    let task = h.task_at(chores(), 0);

    // A watcher event already in flight reads the document before our write
    h.vault.script_read(chores(), DONE, Duration::from_millis(100));
    let scan = h.engine.on_document_modified(chores());
    let pending = h.engine.update(task.id, TaskPatch::status(TaskStatus::Todo)).unwrap();
    scan.wait().await;
    pending.finished().await;

    assert!(h.fired().is_empty());
    assert_eq!(h.vault.text(chores()).unwrap(), OPEN);
    assert_eq!(h.completions(chores()), 0);

    h.engine.on_document_modified(chores()).wait().await;
    assert!(h.fired().is_empty());
    let reopened = h.task_at(chores(), 0);
    assert_eq!(reopened.status, TaskStatus::Todo);

    // Checking it again is still a real completion
    h.engine
        .update(reopened.id, TaskPatch::status(TaskStatus::Done))
        .unwrap()
        .finished()
        .await;
    h.engine.on_document_modified(chores()).wait().await;
    assert_eq!(h.fired(), vec!["Water plants"]);
}

#[tokio::test]
async fn test_second_update_before_rescan_finds_its_line() {
    let h = loaded(&[(chores(), OPEN)]).await;
    let task = h.task_at(chores(), 0);

    h.engine
        .update(task.id, TaskPatch::status(TaskStatus::Done))
        .unwrap()
        .finished()
        .await;
    assert_eq!(h.vault.text(chores()).unwrap(), DONE);

    h.engine
        .update(task.id, TaskPatch::status(TaskStatus::Todo))
        .unwrap()
        .finished()
        .await;
    assert_eq!(h.vault.text(chores()).unwrap(), OPEN);
    assert_eq!(h.engine.get(task.id).unwrap().status, TaskStatus::Todo);
    assert_eq!(h.engine.get(task.id).unwrap().raw, OPEN.trim_end());
}

#[tokio::test]
async fn test_failed_uncheck_write_is_rolled_back_in_ledger() {
    let tmp = TempDir::new().unwrap();
    let h = Harness::with_recovery_dir(tmp.path());
    h.vault.put(chores(), DONE);
    h.engine.on_layout_ready().await;
    let task = h.task_at(chores(), 0);

    h.vault.fail_writes(true);
    h.engine
        .update(task.id, TaskPatch::status(TaskStatus::Todo))
        .unwrap()
        .finished()
        .await;

    // Memory keeps the optimistic state until the next scan
    assert_eq!(h.engine.get(task.id).unwrap().status, TaskStatus::Todo);
    assert_eq!(h.vault.text(chores()).unwrap(), DONE);
    assert_eq!(h.completions(chores()), 1);

    let log = std::fs::read_to_string(tmp.path().join("recovery.log")).unwrap();
    assert!(log.contains("- [ ] Water plants %repeat(weekly)"));
    assert!(log.contains("disk full"));

    // Disk still says done: the rescan restores it without firing
    h.engine.on_document_modified(chores()).wait().await;
    assert!(h.fired().is_empty());
    assert_eq!(h.task_at(chores(), 0).status, TaskStatus::Done);
}

#[tokio::test]
async fn test_content_edit_does_not_touch_ledger() {
    let h = loaded(&[(chores(), DONE)]).await;
    let task = h.task_at(chores(), 0);

    let patch = TaskPatch {
        content: Some("Water the plants".to_string()),
        ..Default::default()
    };
    h.engine.update(task.id, patch).unwrap().finished().await;

    assert_eq!(h.completions(chores()), 1);
    assert_eq!(
        h.vault.text(chores()).unwrap(),
        "- [x] Water the plants %repeat(weekly)\n"
    );
}

#[tokio::test]
async fn test_unknown_ids_are_ignored() {
    let h = loaded(&[(chores(), OPEN)]).await;
    let missing = TaskId(9999);

    assert!(h.engine.update(missing, TaskPatch::status(TaskStatus::Done)).is_none());
    assert!(h.engine.delete(missing).is_none());
    h.engine.duplicate(missing).await.unwrap();
    h.engine.duplicate_for_week(missing).await.unwrap();

    assert_eq!(h.vault.text(chores()).unwrap(), OPEN);
    assert!(h.vault.events().iter().all(|e| !e.starts_with("write")));
}

#[tokio::test]
async fn test_delete_removes_task_and_block() {
    let h = loaded(&[(chores(), "- [ ] Water plants\n  in the kitchen\n- [ ] Call mom\n")]).await;
    let task = h.task_at(chores(), 0);

    let pending = h.engine.delete(task.id).unwrap();
    assert!(h.engine.get(task.id).is_none());
    pending.finished().await;

    assert_eq!(h.vault.text(chores()).unwrap(), "- [ ] Call mom\n");
}

#[tokio::test]
async fn test_duplicate_writes_copy_without_touching_store() {
    let h = loaded(&[(chores(), "- [x] Stretch @2025-05-14\n")]).await;
    let task = h.task_at(chores(), 0);

    h.engine.duplicate(task.id).await.unwrap();
    assert_eq!(
        h.vault.text(chores()).unwrap(),
        "- [x] Stretch @2025-05-14\n- [x] Stretch @2025-05-14\n"
    );
    assert_eq!(h.engine.all().len(), 1);

    h.engine.duplicate_for_week(task.id).await.unwrap();
    assert_eq!(
        h.vault.text(chores()).unwrap(),
        "- [x] Stretch @2025-05-14\n- [ ] Stretch @2025-05-21\n- [x] Stretch @2025-05-14\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_update_line_waits_for_pending_scans() {
    let h = loaded(&[(chores(), OPEN)]).await;

    h.vault.script_read(chores(), OPEN, Duration::from_millis(500));
    let scan = h.engine.on_document_modified(chores());
    h.engine
        .update_line(chores(), 0, "- [ ] Water plants %repeat(daily)")
        .await
        .unwrap();

    let events = h.vault.events();
    let tail: Vec<&str> = events.iter().rev().take(2).rev().map(String::as_str).collect();
    assert_eq!(
        tail,
        vec!["read /vault/chores.md", "write /vault/chores.md"]
    );
    assert_eq!(h.vault.text(chores()).unwrap(), "- [ ] Water plants %repeat(daily)\n");
    scan.wait().await;
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_listeners_see_scans_and_field_changes() {
    let h = loaded(&[(chores(), OPEN)]).await;
    let seen: Arc<Mutex<Vec<Change>>> = Arc::default();
    let subscription = {
        let seen = seen.clone();
        h.engine.subscribe(move |change| seen.lock().unwrap().push(change.clone()))
    };

    h.write(chores(), DONE).await;
    let task = h.task_at(chores(), 0);
    h.engine
        .update(task.id, TaskPatch::status(TaskStatus::Todo))
        .unwrap()
        .finished()
        .await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Change::everything(),
            Change::task(task.id, Some(vec!["status"])),
        ]
    );

    drop(subscription);
    h.write(chores(), DONE).await;
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_listener_may_query_engine() {
    let h = loaded(&[(chores(), OPEN)]).await;
    let counts: Arc<Mutex<Vec<usize>>> = Arc::default();
    let _subscription = {
        let counts = counts.clone();
        let engine = h.engine.clone();
        h.engine
            .subscribe(move |_| counts.lock().unwrap().push(engine.all().len()))
    };

    h.write(chores(), &OPEN.repeat(2)).await;
    assert_eq!(*counts.lock().unwrap(), vec![2]);
}
