use async_trait::async_trait;
use tracing::info;

use crate::index::IndexError;
use crate::model::task::TaskRecord;

/// Runs when a task with commands newly becomes completed.
///
/// Called once per trigger event, in order, and awaited before the scan that
/// produced it finishes. A handler runs inside its document's scan lane, so
/// it must not wait for that same document's queue to go idle.
#[async_trait]
pub trait RecurrenceHandler: Send + Sync {
    async fn handle_task_completion(&self, task: &TaskRecord) -> Result<(), IndexError>;
}

/// Logs each completion and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRecurrence;

#[async_trait]
impl RecurrenceHandler for LogRecurrence {
    async fn handle_task_completion(&self, task: &TaskRecord) -> Result<(), IndexError> {
        let commands: Vec<&str> = task.commands.iter().map(|c| c.name.as_str()).collect();
        info!(
            path = %task.path.display(),
            line = task.line + 1,
            content = %task.content,
            ?commands,
            "task completed"
        );
        Ok(())
    }
}

/// Adapts a plain closure into a handler.
pub struct FnRecurrence<F>(pub F);

#[async_trait]
impl<F> RecurrenceHandler for FnRecurrence<F>
where
    F: Fn(&TaskRecord) + Send + Sync,
{
    async fn handle_task_completion(&self, task: &TaskRecord) -> Result<(), IndexError> {
        (self.0)(task);
        Ok(())
    }
}
