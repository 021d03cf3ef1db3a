use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use indexmap::IndexMap;

use crate::model::task::{TaskId, TaskRecord};

/// The current snapshot of every indexed task, in scan order.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: IndexMap<TaskId, TaskRecord>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values()
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(&id)
    }

    /// Tasks whose primary date is exactly `date`.
    pub fn by_date(&self, date: NaiveDate) -> Vec<&TaskRecord> {
        self.all().filter(|t| t.date() == Some(date)).collect()
    }

    /// Tasks in the visual day that starts at `boundary_hour:00` on `date`
    /// and ends at the same hour the next day.
    ///
    /// Timed tasks on `date` at or after the boundary and timed tasks on the
    /// next day before it are included. Untimed tasks only count on their own
    /// calendar date.
    pub fn for_visual_window(&self, date: NaiveDate, boundary_hour: u32) -> Vec<&TaskRecord> {
        let Some(boundary) = NaiveTime::from_hms_opt(boundary_hour, 0, 0) else {
            return Vec::new();
        };
        let next_day = date.succ_opt();

        self.all()
            .filter(|t| {
                let Some(task_date) = t.date() else {
                    return false;
                };
                match t.time() {
                    None => task_date == date,
                    Some(time) if task_date == date => time >= boundary,
                    Some(time) => Some(task_date) == next_day && time < boundary,
                }
            })
            .collect()
    }

    /// A document's tasks in line order.
    pub fn for_document(&self, path: &Path) -> Vec<&TaskRecord> {
        let mut tasks: Vec<&TaskRecord> = self.all().filter(|t| t.path == path).collect();
        tasks.sort_by_key(|t| t.line);
        tasks
    }

    /// Drop every task of `path`, then insert `tasks`.
    pub fn replace_document(&mut self, path: &Path, tasks: Vec<TaskRecord>) {
        self.remove_document(path);
        for task in tasks {
            self.tasks.insert(task.id, task);
        }
    }

    /// Returns how many tasks were removed.
    pub fn remove_document(&mut self, path: &Path) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, t| t.path != path);
        before - self.tasks.len()
    }

    pub fn remove(&mut self, id: TaskId) -> Option<TaskRecord> {
        self.tasks.shift_remove(&id)
    }

    /// Find the current entry for a task reference that may predate a reparse.
    ///
    /// The id is trusted only if content, path, line and date still match.
    /// Otherwise the first task with the same path, content and date wins,
    /// which is arbitrary when a document repeats the same task verbatim.
    pub fn resolve(&self, stale: &TaskRecord) -> Option<&TaskRecord> {
        if let Some(current) = self.get(stale.id)
            && current.content == stale.content
            && current.path == stale.path
            && current.line == stale.line
            && current.date() == stale.date()
        {
            return Some(current);
        }

        self.all().find(|t| {
            t.path == stale.path && t.content == stale.content && t.date() == stale.date()
        })
    }
}
