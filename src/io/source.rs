use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;
use walkdir::WalkDir;

use crate::model::config::IndexSettings;

/// Where the engine reads document text from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Full text of one document.
    async fn read(&self, path: &Path) -> io::Result<String>;

    /// Every document in the vault, used for full vault passes.
    async fn list(&self) -> io::Result<Vec<PathBuf>>;
}

/// Documents on the local file system under a vault root.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
    settings: IndexSettings,
}

impl FsSource {
    pub fn new(root: &Path, settings: IndexSettings) -> Self {
        FsSource {
            root: root.to_path_buf(),
            settings,
        }
    }
}

#[async_trait]
impl DocumentSource for FsSource {
    async fn read(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn list(&self) -> io::Result<Vec<PathBuf>> {
        let root = self.root.clone();
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || list_documents(&root, &settings))
            .await
            .map_err(io::Error::other)?
    }
}

/// Walk the vault and return every document, sorted.
///
/// Symlinks are not followed and ignored directories are never entered. An
/// entry that cannot be read is skipped; only an unreadable root fails.
pub fn list_documents(root: &Path, settings: &IndexSettings) -> io::Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(root, e.path(), settings));

    let mut docs = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!(path = ?e.path(), error = %e, "skipping unreadable vault entry");
                continue;
            }
        };
        if entry.file_type().is_file() && is_document(root, entry.path(), settings) {
            docs.push(entry.into_path());
        }
    }
    docs.sort();
    Ok(docs)
}

/// Whether `path` is a document the index should track: a configured
/// extension, outside any ignored directory.
pub fn is_document(root: &Path, path: &Path, settings: &IndexSettings) -> bool {
    let has_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| settings.extensions.iter().any(|want| want == ext));
    has_extension && path.starts_with(root) && !is_ignored(root, path, settings)
}

fn is_ignored(root: &Path, path: &Path, settings: &IndexSettings) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| settings.ignore.iter().any(|ignored| ignored == name))
    })
}
