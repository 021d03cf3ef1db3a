use std::io;
use std::path::Path;

use async_trait::async_trait;
use chrono::Days;

use crate::index::IndexError;
use crate::io::recovery::atomic_write;
use crate::model::task::{TaskRecord, TaskStatus};
use crate::parse::{collect_block, serialize_task_line};

/// Writes task mutations back into documents.
///
/// The engine never edits text itself; it hands every persisted change to a
/// repository and picks the result up again through the next scan.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn update_task_in_file(&self, old: &TaskRecord, new: &TaskRecord) -> Result<(), IndexError>;
    async fn delete_task_from_file(&self, task: &TaskRecord) -> Result<(), IndexError>;
    async fn duplicate_task_in_file(&self, task: &TaskRecord) -> Result<(), IndexError>;
    async fn duplicate_task_for_week(&self, task: &TaskRecord) -> Result<(), IndexError>;
    async fn update_line(&self, path: &Path, line: usize, text: &str) -> Result<(), IndexError>;
}

/// A text edit on one document.
#[derive(Debug, Clone, Copy)]
pub enum Edit<'a> {
    /// Rewrite `old`'s line from `new`
    Update { old: &'a TaskRecord, new: &'a TaskRecord },
    /// Remove the task line and its child block
    Delete(&'a TaskRecord),
    /// Insert a copy of the task and its block right after the block
    Duplicate(&'a TaskRecord),
    /// Like `Duplicate`, reset to todo with explicit dates a week later
    DuplicateForWeek(&'a TaskRecord),
    /// Replace one line by number
    Line { line: usize, text: &'a str },
}

/// Apply `edit` to a document's text. `path` is only used for errors.
pub fn apply_edit(text: &str, path: &Path, edit: &Edit<'_>) -> Result<String, IndexError> {
    let mut lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();

    match *edit {
        Edit::Update { old, new } => {
            let idx = locate(&lines, old)?;
            lines[idx] = serialize_task_line(new);
        }
        Edit::Delete(task) => {
            let idx = locate(&lines, task)?;
            let end = collect_block(&lines, idx).end();
            lines.drain(idx..end);
        }
        Edit::Duplicate(task) => {
            let idx = locate(&lines, task)?;
            let end = collect_block(&lines, idx).end();
            let copy: Vec<String> = lines[idx..end].to_vec();
            lines.splice(end..end, copy);
        }
        Edit::DuplicateForWeek(task) => {
            let idx = locate(&lines, task)?;
            let end = collect_block(&lines, idx).end();
            let mut copy = vec![serialize_task_line(&next_week(task))];
            copy.extend_from_slice(&lines[idx + 1..end]);
            lines.splice(end..end, copy);
        }
        Edit::Line { line, text } => {
            let slot = lines.get_mut(line).ok_or_else(|| IndexError::LineOutOfRange {
                path: path.to_path_buf(),
                line,
            })?;
            *slot = text.to_string();
        }
    }

    let mut out = lines.join("\n");
    if text.ends_with('\n') && !lines.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

/// Find the task's line: its recorded line if that still holds the raw text,
/// otherwise the first line equal to it.
fn locate(lines: &[String], task: &TaskRecord) -> Result<usize, IndexError> {
    if lines.get(task.line) == Some(&task.raw) {
        return Ok(task.line);
    }
    lines
        .iter()
        .position(|l| *l == task.raw)
        .ok_or_else(|| IndexError::TaskNotFound {
            path: task.path.clone(),
            raw: task.raw.clone(),
        })
}

/// The task reset to todo, with every explicit date moved seven days on.
fn next_week(task: &TaskRecord) -> TaskRecord {
    let mut copy = task.clone();
    copy.status = TaskStatus::Todo;
    for date in [&mut copy.start_date, &mut copy.end_date, &mut copy.deadline] {
        if let Some(d) = date.as_mut().filter(|d| d.explicit)
            && let Some(shifted) = d.value.checked_add_days(Days::new(7))
        {
            d.value = shifted;
        }
    }
    copy
}

/// Edits markdown documents in place on the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRepository;

impl MarkdownRepository {
    async fn edit(&self, path: &Path, edit: Edit<'_>) -> Result<(), IndexError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| IndexError::ReadError {
                path: path.to_path_buf(),
                source,
            })?;
        let updated = apply_edit(&text, path, &edit)?;

        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || atomic_write(&target, updated.as_bytes()))
            .await
            .map_err(io::Error::other)
            .and_then(|written| written)
            .map_err(|source| IndexError::WriteError {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[async_trait]
impl Repository for MarkdownRepository {
    async fn update_task_in_file(&self, old: &TaskRecord, new: &TaskRecord) -> Result<(), IndexError> {
        self.edit(&old.path, Edit::Update { old, new }).await
    }

    async fn delete_task_from_file(&self, task: &TaskRecord) -> Result<(), IndexError> {
        self.edit(&task.path, Edit::Delete(task)).await
    }

    async fn duplicate_task_in_file(&self, task: &TaskRecord) -> Result<(), IndexError> {
        self.edit(&task.path, Edit::Duplicate(task)).await
    }

    async fn duplicate_task_for_week(&self, task: &TaskRecord) -> Result<(), IndexError> {
        self.edit(&task.path, Edit::DuplicateForWeek(task)).await
    }

    async fn update_line(&self, path: &Path, line: usize, text: &str) -> Result<(), IndexError> {
        self.edit(path, Edit::Line { line, text }).await
    }
}
