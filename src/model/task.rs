use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque identity assigned to a task each time its document is parsed.
///
/// Ids are generations, not keys: the same line gets a fresh id on every
/// rescan. Use `TaskStore::resolve` to follow a task across reparses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out task ids. Zero is never issued, so a default `TaskId` always
/// means "not indexed yet".
#[derive(Debug)]
pub struct TaskIdGen(AtomicU64);

impl TaskIdGen {
    pub fn new() -> Self {
        TaskIdGen(AtomicU64::new(1))
    }

    pub fn next(&self) -> TaskId {
        TaskId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TaskIdGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Task checkbox state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Todo,
    Done,
    /// `[X]`, kept distinct so the line round-trips
    DoneUpper,
    Cancelled,
    Exception,
    InProgress,
    Deferred,
    Other(char),
}

impl TaskStatus {
    /// The character used inside the checkbox `[ ]`
    pub fn checkbox_char(self) -> char {
        match self {
            TaskStatus::Todo => ' ',
            TaskStatus::Done => 'x',
            TaskStatus::DoneUpper => 'X',
            TaskStatus::Cancelled => '-',
            TaskStatus::Exception => '!',
            TaskStatus::InProgress => '/',
            TaskStatus::Deferred => '>',
            TaskStatus::Other(c) => c,
        }
    }

    /// Parse a checkbox character into a status. Unknown characters are kept
    /// as `Other` rather than rejected.
    pub fn from_checkbox_char(c: char) -> TaskStatus {
        match c {
            ' ' => TaskStatus::Todo,
            'x' => TaskStatus::Done,
            'X' => TaskStatus::DoneUpper,
            '-' => TaskStatus::Cancelled,
            '!' => TaskStatus::Exception,
            '/' => TaskStatus::InProgress,
            '>' => TaskStatus::Deferred,
            other => TaskStatus::Other(other),
        }
    }

    /// Parse a status from a user-facing name (`done`, `todo`, ...) or a
    /// single checkbox character.
    pub fn from_name(s: &str) -> Option<TaskStatus> {
        match s {
            "todo" => Some(TaskStatus::Todo),
            "done" => Some(TaskStatus::Done),
            "cancelled" => Some(TaskStatus::Cancelled),
            "exception" => Some(TaskStatus::Exception),
            "in-progress" => Some(TaskStatus::InProgress),
            "deferred" => Some(TaskStatus::Deferred),
            _ => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(TaskStatus::from_checkbox_char(c)),
                    _ => None,
                }
            }
        }
    }

    /// Terminal states: done (either case), cancelled, exception.
    pub fn is_completed(self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::DoneUpper | TaskStatus::Cancelled | TaskStatus::Exception
        )
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_char(self.checkbox_char())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let c = char::deserialize(deserializer)?;
        Ok(TaskStatus::from_checkbox_char(c))
    }
}

/// A date or time field plus whether it was written on the line or
/// synthesized (e.g. inherited from a daily note's file name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dated<T> {
    pub value: T,
    pub explicit: bool,
}

impl<T> Dated<T> {
    pub fn explicit(value: T) -> Self {
        Dated {
            value,
            explicit: true,
        }
    }

    pub fn implied(value: T) -> Self {
        Dated {
            value,
            explicit: false,
        }
    }
}

/// A structured command on a task line, e.g. `%repeat(weekly, mon)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Command {
            name: name.into(),
            args,
        }
    }
}

/// One parsed task occurrence with its source tracking and child block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    /// Document the task was parsed from
    pub path: PathBuf,
    /// Line in the document (0-indexed)
    pub line: usize,
    /// The task line exactly as read
    pub raw: String,
    /// Leading whitespace width of the task line
    pub indent: usize,
    /// Display text with dates, times and commands stripped
    pub content: String,
    pub status: TaskStatus,
    pub start_date: Option<Dated<NaiveDate>>,
    pub start_time: Option<Dated<NaiveTime>>,
    pub end_date: Option<Dated<NaiveDate>>,
    pub end_time: Option<Dated<NaiveTime>>,
    pub deadline: Option<Dated<NaiveDate>>,
    pub commands: Vec<Command>,
    /// Raw lines indented under the task, blank lines included
    pub children: Vec<String>,
}

impl TaskRecord {
    /// A bare record at the given location; the parser fills in the rest.
    pub fn new(path: &Path, line: usize, raw: &str, status: TaskStatus) -> Self {
        TaskRecord {
            id: TaskId::default(),
            path: path.to_path_buf(),
            line,
            raw: raw.to_string(),
            indent: 0,
            content: String::new(),
            status,
            start_date: None,
            start_time: None,
            end_date: None,
            end_time: None,
            deadline: None,
            commands: Vec::new(),
            children: Vec::new(),
        }
    }

    /// The primary date used for day queries and signatures.
    pub fn date(&self) -> Option<NaiveDate> {
        self.start_date.map(|d| d.value)
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.start_time.map(|t| t.value)
    }
}

/// A partial update applied by `IndexEngine::update`.
///
/// Date and time fields use a nested option: `Some(None)` clears the field,
/// `Some(Some(v))` sets it as an explicit value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub content: Option<String>,
    pub start_date: Option<Option<NaiveDate>>,
    pub start_time: Option<Option<NaiveTime>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub end_time: Option<Option<NaiveTime>>,
    pub deadline: Option<Option<NaiveDate>>,
    pub commands: Option<Vec<Command>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        TaskPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Names of the fields this patch touches, in declaration order.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.status.is_some() {
            fields.push("status");
        }
        if self.content.is_some() {
            fields.push("content");
        }
        if self.start_date.is_some() {
            fields.push("start_date");
        }
        if self.start_time.is_some() {
            fields.push("start_time");
        }
        if self.end_date.is_some() {
            fields.push("end_date");
        }
        if self.end_time.is_some() {
            fields.push("end_time");
        }
        if self.deadline.is_some() {
            fields.push("deadline");
        }
        if self.commands.is_some() {
            fields.push("commands");
        }
        fields
    }

    /// Merge the patch into `task` in place.
    pub fn apply(&self, task: &mut TaskRecord) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(content) = &self.content {
            task.content = content.trim().to_string();
        }
        if let Some(date) = self.start_date {
            task.start_date = date.map(Dated::explicit);
        }
        if let Some(time) = self.start_time {
            task.start_time = time.map(Dated::explicit);
        }
        if let Some(date) = self.end_date {
            task.end_date = date.map(Dated::explicit);
        }
        if let Some(time) = self.end_time {
            task.end_time = time.map(Dated::explicit);
        }
        if let Some(date) = self.deadline {
            task.deadline = date.map(Dated::explicit);
        }
        if let Some(commands) = &self.commands {
            task.commands = commands.clone();
        }
    }
}
