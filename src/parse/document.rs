use std::path::Path;

use crate::model::task::{TaskIdGen, TaskRecord};
use crate::parse::block::collect_block;
use crate::parse::line_parser::LineParser;

/// Parse a whole document into task records, top to bottom.
///
/// Each task takes its child block with it, and the scan resumes after the
/// block, so task lines nested inside a block belong to the parent's
/// children rather than becoming records of their own.
pub fn parse_document(
    text: &str,
    path: &Path,
    parser: &dyn LineParser,
    ids: &TaskIdGen,
) -> Vec<TaskRecord> {
    let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
    let mut tasks = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        let Some(mut task) = parser.parse_line(&lines[idx], path, idx) else {
            idx += 1;
            continue;
        };
        let block = collect_block(&lines, idx);
        task.id = ids.next();
        task.children = block.lines;
        idx = block.line_range.end;
        tasks.push(task);
    }

    tasks
}
