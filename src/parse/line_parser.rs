use std::path::Path;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;

use crate::model::task::{Command, Dated, TaskRecord, TaskStatus};
use crate::parse::block::count_indent;

/// Turns one line of text into a task record.
///
/// Implementations are pure: the same line at the same location always
/// yields the same record (apart from the id, which the scan assigns).
pub trait LineParser: Send + Sync {
    fn parse_line(&self, text: &str, path: &Path, line: usize) -> Option<TaskRecord>;

    /// Whether the record's status is one that can fire recurrence.
    fn is_triggerable(&self, task: &TaskRecord) -> bool {
        task.status.is_completed()
    }
}

/// Checkbox list items: `- [x] 09:00-10:00 Content @2025-05-14 due:2025-05-20 %repeat(weekly)`
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownLineParser;

static TASK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*[-*+] \[(.)\](?:[ \t]+(.*))?$").expect("valid task regex"));

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%([A-Za-z][\w-]*)(?:\(([^)]*)\))?").expect("valid command regex")
});

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

impl LineParser for MarkdownLineParser {
    fn parse_line(&self, text: &str, path: &Path, line: usize) -> Option<TaskRecord> {
        let caps = TASK_RE.captures(text)?;
        let status_char = caps.get(1)?.as_str().chars().next()?;
        let body = caps.get(2).map_or("", |m| m.as_str());

        let mut task = TaskRecord::new(path, line, text, TaskStatus::from_checkbox_char(status_char));
        task.indent = count_indent(text);

        // Commands first: their arguments may contain spaces
        for c in COMMAND_RE.captures_iter(body) {
            let name = c[1].to_string();
            let args = c
                .get(2)
                .map(|m| {
                    m.as_str()
                        .split(',')
                        .map(|a| a.trim().to_string())
                        .filter(|a| !a.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            task.commands.push(Command::new(name, args));
        }
        let body = COMMAND_RE.replace_all(body, " ");

        let mut content = Vec::new();
        for (i, token) in body.split_whitespace().enumerate() {
            if i == 0
                && let Some((start, end)) = parse_time_range(token)
            {
                task.start_time = Some(Dated::explicit(start));
                task.end_time = end.map(Dated::explicit);
                continue;
            }
            if let Some(date) = token.strip_prefix('@').and_then(parse_date)
                && task.start_date.is_none()
            {
                task.start_date = Some(Dated::explicit(date));
                continue;
            }
            if let Some(date) = token.strip_prefix("end:").and_then(parse_date) {
                task.end_date = Some(Dated::explicit(date));
                continue;
            }
            if let Some(date) = token.strip_prefix("due:").and_then(parse_date) {
                task.deadline = Some(Dated::explicit(date));
                continue;
            }
            content.push(token);
        }
        task.content = content.join(" ");

        if task.start_date.is_none() {
            task.start_date = daily_note_date(path).map(Dated::implied);
        }

        Some(task)
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT).ok()
}

/// `09:00` or `09:00-10:30`
fn parse_time_range(token: &str) -> Option<(NaiveTime, Option<NaiveTime>)> {
    match token.split_once('-') {
        Some((start, end)) => Some((parse_time(start)?, Some(parse_time(end)?))),
        None => Some((parse_time(token)?, None)),
    }
}

/// Daily notes are named after their date, e.g. `journal/2025-05-14.md`.
pub fn daily_note_date(path: &Path) -> Option<NaiveDate> {
    path.file_stem().and_then(|s| s.to_str()).and_then(parse_date)
}
