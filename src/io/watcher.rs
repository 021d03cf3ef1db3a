use std::path::{Path, PathBuf};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::io::source::is_document;
use crate::model::config::IndexSettings;

/// Document-level events forwarded from the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    Modified(PathBuf),
    Deleted(PathBuf),
}

/// A file system watcher over the vault root.
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<DocumentEvent>,
}

impl VaultWatcher {
    /// Start watching `root` recursively.
    pub fn start(root: &Path, settings: &IndexSettings) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let root_owned = root.to_path_buf();
        let settings = settings.clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(e) => e,
                    Err(_) => return,
                };
                for doc_event in classify(&event, &root_owned, &settings) {
                    let _ = tx.send(doc_event);
                }
            },
            Config::default(),
        )?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(VaultWatcher {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next event. `None` once the watcher has shut down.
    pub async fn next(&mut self) -> Option<DocumentEvent> {
        self.rx.recv().await
    }
}

/// Map a raw notify event to document events.
///
/// Editors that save by rename report a remove followed by a create, so the
/// path's existence decides between modified and deleted rather than the
/// event kind alone.
fn classify(event: &Event, root: &Path, settings: &IndexSettings) -> Vec<DocumentEvent> {
    let removed = match event.kind {
        EventKind::Remove(_) => true,
        EventKind::Create(_) | EventKind::Modify(_) => false,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter(|p| is_document(root, p, settings))
        .map(|p| {
            if removed || !p.exists() {
                DocumentEvent::Deleted(p.clone())
            } else {
                DocumentEvent::Modified(p.clone())
            }
        })
        .collect()
}
