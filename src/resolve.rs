use crate::manifest::{FileEntry, ManifestError, ManifestNode};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A file that has to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Remote source
    pub url: String,
    /// Where the body is written
    pub destination: PathBuf,
}

/// Ordered tasks discovered by one resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadJournal {
    tasks: Vec<DownloadTask>,
}

impl DownloadJournal {
    /// Empty journal
    #[must_use]
    pub const fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Appends a task at the end
    pub fn push(&mut self, task: DownloadTask) {
        self.tasks.push(task);
    }

    /// Appends every task of `other`, keeping its order
    pub fn append(&mut self, other: Self) {
        self.tasks.extend(other.tasks);
    }

    /// Number of pending tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when everything is already in place
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, DownloadTask> {
        self.tasks.iter()
    }
}

impl IntoIterator for DownloadJournal {
    type Item = DownloadTask;
    type IntoIter = std::vec::IntoIter<DownloadTask>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}

impl<'a> IntoIterator for &'a DownloadJournal {
    type Item = &'a DownloadTask;
    type IntoIter = std::slice::Iter<'a, DownloadTask>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

/// Errors that abort a resolution pass
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The manifest names something that cannot live on disk
    #[error("malformed manifest: {0}")]
    Manifest(#[from] ManifestError),

    /// Filesystem inspection, directory creation or stale-file removal failed
    #[error("filesystem error at {path}: {source}")]
    Io {
        /// Path being touched
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
}

impl ResolveError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Walks `node` against the files under `path` and returns what must be fetched
///
/// All names in the manifest are checked before anything on disk changes. Every
/// directory visited is created, empty namespaces included. Entries that exist
/// with the expected size are skipped; entries with a different size are deleted and
/// queued; missing entries are queued. Files the manifest does not mention are left alone.
///
/// # Errors
/// Returns error on an invalid file or directory name, or on any filesystem failure
pub fn resolve(path: &Path, node: &ManifestNode) -> Result<DownloadJournal, ResolveError> {
    node.validate()?;
    resolve_node(path, node)
}

fn resolve_node(path: &Path, node: &ManifestNode) -> Result<DownloadJournal, ResolveError> {
    fs::create_dir_all(path).map_err(|e| ResolveError::io(path, e))?;

    match node {
        ManifestNode::File(entry) => resolve_entries(path, std::slice::from_ref(entry)),
        ManifestNode::List(entries) => resolve_entries(path, entries),
        ManifestNode::Namespace(children) => {
            let mut journal = DownloadJournal::new();
            for (key, child) in children {
                journal.append(resolve_node(&path.join(key), child)?);
            }
            Ok(journal)
        }
    }
}

fn resolve_entries(dir: &Path, entries: &[FileEntry]) -> Result<DownloadJournal, ResolveError> {
    let mut journal = DownloadJournal::new();
    for entry in entries {
        if let Some(task) = check_entry(dir, entry)? {
            journal.push(task);
        }
    }
    Ok(journal)
}

fn check_entry(dir: &Path, entry: &FileEntry) -> Result<Option<DownloadTask>, ResolveError> {
    let file_path = dir.join(&entry.name);

    let task = DownloadTask {
        url: entry.url.clone(),
        destination: file_path.clone(),
    };

    let metadata = match fs::metadata(&file_path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %file_path.display(), "file missing, queued");
            return Ok(Some(task));
        }
        Err(e) => return Err(ResolveError::io(&file_path, e)),
    };

    if metadata.is_dir() {
        return Err(ResolveError::io(
            &file_path,
            io::Error::other("expected a file but found a directory"),
        ));
    }

    if metadata.len() == entry.expected_size {
        tracing::debug!(path = %file_path.display(), "file present with expected size, skipping");
        return Ok(None);
    }

    tracing::info!(
        path = %file_path.display(),
        expected = entry.expected_size,
        actual = metadata.len(),
        "size mismatch, removing stale file"
    );
    fs::remove_file(&file_path).map_err(|e| ResolveError::io(&file_path, e))?;

    Ok(Some(task))
}
