use crate::model::task::{Command, TaskRecord};

/// Render a task back into a single line.
///
/// The indentation and bullet of the original line are kept. Only explicit
/// dates are written; implied ones come back from the file name on reparse.
pub fn serialize_task_line(task: &TaskRecord) -> String {
    let mut out = line_prefix(&task.raw);
    out.push_str(&format!("[{}]", task.status.checkbox_char()));

    let mut parts: Vec<String> = Vec::new();
    if let Some(start) = task.start_time.filter(|t| t.explicit) {
        let mut time = start.value.format("%H:%M").to_string();
        if let Some(end) = task.end_time.filter(|t| t.explicit) {
            time.push('-');
            time.push_str(&end.value.format("%H:%M").to_string());
        }
        parts.push(time);
    }
    if !task.content.is_empty() {
        parts.push(task.content.clone());
    }
    if let Some(date) = task.start_date.filter(|d| d.explicit) {
        parts.push(format!("@{}", date.value.format("%Y-%m-%d")));
    }
    if let Some(date) = task.end_date.filter(|d| d.explicit) {
        parts.push(format!("end:{}", date.value.format("%Y-%m-%d")));
    }
    if let Some(date) = task.deadline.filter(|d| d.explicit) {
        parts.push(format!("due:{}", date.value.format("%Y-%m-%d")));
    }
    parts.extend(task.commands.iter().map(serialize_command));

    for part in parts {
        out.push(' ');
        out.push_str(&part);
    }
    out
}

/// `%name` or `%name(a, b)`
pub fn serialize_command(command: &Command) -> String {
    if command.args.is_empty() {
        format!("%{}", command.name)
    } else {
        format!("%{}({})", command.name, command.args.join(", "))
    }
}

/// Leading whitespace plus bullet, e.g. `"  * "`. Falls back to `"- "` when
/// the raw line is not a list item (new tasks).
fn line_prefix(raw: &str) -> String {
    let trimmed = raw.trim_start_matches([' ', '\t']);
    let indent = &raw[..raw.len() - trimmed.len()];
    let bullet = match trimmed.chars().next() {
        Some(c @ ('-' | '*' | '+')) => c,
        _ => '-',
    };
    format!("{}{} ", indent, bullet)
}
