use std::ops::Range;

/// The lines indented under a task line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildBlock {
    /// Line range in the document (0-indexed, exclusive end)
    pub line_range: Range<usize>,
    /// The raw lines, untrimmed
    pub lines: Vec<String>,
}

impl ChildBlock {
    /// First line after the block, where the outer scan resumes.
    pub fn end(&self) -> usize {
        self.line_range.end
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Collect the child block of the task at `task_idx`.
///
/// Blank lines are always taken. A non-blank line is taken only while it is
/// strictly more indented than the task line; the first one that is not ends
/// the block. Trailing blank lines at the end of the document stay in the
/// block.
pub fn collect_block(lines: &[String], task_idx: usize) -> ChildBlock {
    let task_indent = count_indent(&lines[task_idx]);
    let start = task_idx + 1;
    let mut idx = start;

    while idx < lines.len() {
        let line = &lines[idx];
        if line.trim().is_empty() || count_indent(line) > task_indent {
            idx += 1;
            continue;
        }
        break;
    }

    ChildBlock {
        line_range: start..idx,
        lines: lines[start..idx].to_vec(),
    }
}

/// Count leading whitespace; a tab counts as one column like a space.
pub fn count_indent(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}
