use std::path::Path;

use tracing::{debug, info};

use super::open_engine;
use crate::io::watcher::{DocumentEvent, VaultWatcher};
use crate::model::config::VaultConfig;

/// Index the vault, then follow file changes until ctrl-c. Completions go to
/// the log through `LogRecurrence`.
pub(super) async fn cmd_watch(root: &Path, config: &VaultConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(root, config);

    // Start watching before the first pass so no edit falls in between
    let mut watcher = VaultWatcher::start(root, &config.index)?;
    let _subscription = engine.subscribe(|change| debug!(?change, "index changed"));

    engine.on_layout_ready().await;
    info!(root = %root.display(), tasks = engine.all().len(), "watching vault");

    loop {
        tokio::select! {
            event = watcher.next() => match event {
                Some(DocumentEvent::Modified(path)) => {
                    engine.on_document_modified(&path);
                }
                Some(DocumentEvent::Deleted(path)) => {
                    engine.on_document_deleted(&path);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("stopping");
                break;
            }
        }
    }
    Ok(())
}
