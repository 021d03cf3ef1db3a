use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::model::task::{Command, TaskRecord, TaskStatus};
use crate::parse::task_serializer::serialize_command;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TaskJson {
    pub path: String,
    /// 1-indexed
    pub line: usize,
    pub status: TaskStatus,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub date_implied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Command>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

pub fn task_to_json(task: &TaskRecord, root: &Path) -> TaskJson {
    TaskJson {
        path: display_path(&task.path, root),
        line: task.line + 1,
        status: task.status,
        content: task.content.clone(),
        date: task.start_date.map(|d| d.value.to_string()),
        date_implied: task.start_date.is_some_and(|d| !d.explicit),
        time: task.start_time.map(|t| t.value.format("%H:%M").to_string()),
        end_date: task.end_date.map(|d| d.value.to_string()),
        end_time: task.end_time.map(|t| t.value.format("%H:%M").to_string()),
        deadline: task.deadline.map(|d| d.value.to_string()),
        commands: task.commands.clone(),
        children: task.children.clone(),
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

/// Vault-relative path for display.
pub fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Format a single task as a one-line summary
pub fn format_task_line(task: &TaskRecord, root: &Path) -> String {
    let time_str = task
        .time()
        .map(|t| format!("{} ", t.format("%H:%M")))
        .unwrap_or_default();
    format!(
        "{}:{} [{}] {}{}",
        display_path(&task.path, root),
        task.line + 1,
        task.status.checkbox_char(),
        time_str,
        task.content
    )
}

/// Format detailed task view
pub fn format_task_detail(task: &TaskRecord, root: &Path) -> Vec<String> {
    let mut lines = vec![format_task_line(task, root)];

    if let Some(date) = task.start_date {
        let implied = if date.explicit { "" } else { " (from note)" };
        lines.push(format!("date: {}{}", date.value, implied));
    }
    if let Some(end) = task.end_date {
        lines.push(format!("end: {}", end.value));
    }
    if let Some(end) = task.end_time {
        lines.push(format!("until: {}", end.value.format("%H:%M")));
    }
    if let Some(due) = task.deadline {
        lines.push(format!("due: {}", due.value));
    }
    for command in &task.commands {
        lines.push(format!("command: {}", serialize_command(command)));
    }

    if !task.children.is_empty() {
        lines.push(String::new());
        lines.push("block:".to_string());
        lines.extend(task.children.iter().cloned());
    }

    lines
}

/// Split a `PATH:LINE` argument. The line is 1-indexed on the command line
/// and 0-indexed in the result.
pub fn parse_location(s: &str, root: &Path) -> Result<(PathBuf, usize), String> {
    let (path, line) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected PATH:LINE, got '{}'", s))?;
    let line: usize = line
        .parse()
        .map_err(|_| format!("invalid line number '{}'", line))?;
    if line == 0 {
        return Err("line numbers start at 1".to_string());
    }
    let path = Path::new(path);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    Ok((path, line - 1))
}

/// Parse a status string into TaskStatus
pub fn parse_task_status(s: &str) -> Result<TaskStatus, String> {
    TaskStatus::from_name(s).ok_or_else(|| {
        format!(
            "unknown status '{}' (expected: todo, done, cancelled, exception, in-progress, deferred, or one character)",
            s
        )
    })
}
