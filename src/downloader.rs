use crate::fetch::{FetchError, Fetcher, HttpFetcher, HttpSettings};
use crate::manifest::ManifestNode;
use crate::resolve::{resolve, DownloadJournal, DownloadTask, ResolveError};
use std::path::{Path, PathBuf};

/// Result of fetching one task
#[derive(Debug)]
pub struct DownloadOutcome {
    /// Remote source
    pub url: String,
    /// Local destination
    pub destination: PathBuf,
    /// Bytes written, or why the fetch failed
    pub result: Result<u64, FetchError>,
}

impl DownloadOutcome {
    /// True when the file was fetched
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of one `download()` call, in journal order
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// One entry per attempted task
    pub outcomes: Vec<DownloadOutcome>,
}

impl DownloadReport {
    /// Outcomes that succeeded
    pub fn succeeded(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_success())
    }

    /// Outcomes that failed
    pub fn failed(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }

    /// True when no fetch failed (also when nothing needed fetching)
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(DownloadOutcome::is_success)
    }

    /// Total bytes written by successful fetches
    #[must_use]
    pub fn bytes_downloaded(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .sum()
    }
}

/// Keeps a directory tree under `root` in line with a manifest
///
/// Nothing touches the filesystem or network until [`resolve`](Self::resolve) or
/// [`download`](Self::download) is called. Byte size is the only integrity check:
/// a corrupted file with the expected size is treated as valid.
pub struct AssetDownloader<F = HttpFetcher> {
    root: PathBuf,
    manifest: ManifestNode,
    fetcher: F,
}

impl AssetDownloader<HttpFetcher> {
    /// Creates a downloader using an [`HttpFetcher`] with default settings
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(root: impl Into<PathBuf>, manifest: ManifestNode) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(&HttpSettings::default())?;
        Ok(Self::with_fetcher(root, manifest, fetcher))
    }
}

impl<F: Fetcher> AssetDownloader<F> {
    /// Creates a downloader with a custom fetcher
    pub fn with_fetcher(root: impl Into<PathBuf>, manifest: ManifestNode, fetcher: F) -> Self {
        Self {
            root: root.into(),
            manifest,
            fetcher,
        }
    }

    /// Directory all resolved files live under
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Manifest this downloader enforces
    #[must_use]
    pub const fn manifest(&self) -> &ManifestNode {
        &self.manifest
    }

    /// Computes which files are missing or stale without fetching anything
    ///
    /// Creates the directory skeleton and removes stale files as a side effect.
    ///
    /// # Errors
    /// Returns error if the manifest is malformed or the filesystem cannot be prepared
    pub fn resolve(&self) -> Result<DownloadJournal, ResolveError> {
        resolve(&self.root, &self.manifest)
    }

    /// Resolves and fetches every missing or stale file, one at a time
    ///
    /// A failed fetch is recorded in the report and does not stop later tasks.
    ///
    /// # Errors
    /// Returns error only if resolution fails
    pub fn download(&self) -> Result<DownloadReport, ResolveError> {
        self.download_with_progress(|_, _, _| {})
    }

    /// Like [`download`](Self::download), calling `progress(index, total, task)` before each fetch
    ///
    /// # Errors
    /// Returns error only if resolution fails
    pub fn download_with_progress<P>(&self, mut progress: P) -> Result<DownloadReport, ResolveError>
    where
        P: FnMut(usize, usize, &DownloadTask),
    {
        let journal = self.resolve()?;
        let total = journal.len();

        if journal.is_empty() {
            tracing::info!(root = %self.root.display(), "all files present, nothing to download");
            return Ok(DownloadReport::default());
        }

        tracing::info!(root = %self.root.display(), files = total, "starting downloads");

        let mut report = DownloadReport::default();
        for (index, task) in journal.into_iter().enumerate() {
            progress(index, total, &task);

            let result = self.fetcher.fetch(&task.url, &task.destination);
            if let Err(e) = &result {
                tracing::warn!(
                    url = %task.url,
                    path = %task.destination.display(),
                    error = %e,
                    "download failed, continuing"
                );
            }

            report.outcomes.push(DownloadOutcome {
                url: task.url,
                destination: task.destination,
                result,
            });
        }

        let failed = report.failed().count();
        tracing::info!(
            root = %self.root.display(),
            succeeded = total - failed,
            failed,
            bytes = report.bytes_downloaded(),
            "downloads finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockFetcher;
    use crate::manifest::FileEntry;
    use mockall::predicate::{always, eq};
    use mockall::Sequence;
    use std::fs;
    use tempfile::TempDir;

    /// Writes `size` bytes to the destination, like a successful fetch would
    fn write_bytes(size: u64) -> impl Fn(&str, &Path) -> Result<u64, FetchError> {
        move |_, destination| {
            fs::write(destination, vec![0_u8; usize::try_from(size).unwrap()]).unwrap();
            Ok(size)
        }
    }

    fn unreachable(url: &str) -> FetchError {
        FetchError::Body {
            url: url.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        }
    }

    #[test]
    fn test_download_fetches_missing_files_in_order() {
        let root = TempDir::new().unwrap();
        let manifest = ManifestNode::list([
            FileEntry::new("w.bin", "http://host/url1", 100),
            FileEntry::new("v.txt", "http://host/url2", 10),
        ]);

        let mut seq = Sequence::new();
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq("http://host/url1"), eq(root.path().join("w.bin")))
            .times(1)
            .in_sequence(&mut seq)
            .returning(write_bytes(100));
        fetcher
            .expect_fetch()
            .with(eq("http://host/url2"), eq(root.path().join("v.txt")))
            .times(1)
            .in_sequence(&mut seq)
            .returning(write_bytes(10));

        let downloader = AssetDownloader::with_fetcher(root.path(), manifest, fetcher);
        let report = downloader.download().unwrap();

        assert!(report.is_complete());
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.bytes_downloaded(), 110);
        assert_eq!(fs::metadata(root.path().join("w.bin")).unwrap().len(), 100);
    }

    #[test]
    fn test_second_download_makes_no_fetches() {
        let root = TempDir::new().unwrap();
        let manifest = ManifestNode::namespace([(
            "a",
            ManifestNode::namespace([("b", ManifestNode::file("f", "http://host/f", 5))]),
        )]);

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .with(always(), always())
            .times(1)
            .returning(write_bytes(5));

        let downloader = AssetDownloader::with_fetcher(root.path(), manifest, fetcher);
        let first = downloader.download().unwrap();
        let second = downloader.download().unwrap();

        assert_eq!(first.outcomes.len(), 1);
        assert!(second.outcomes.is_empty());
        assert!(second.is_complete());
        assert_eq!(fs::metadata(root.path().join("a/b/f")).unwrap().len(), 5);
    }

    #[test]
    fn test_failed_fetch_does_not_stop_later_tasks() {
        let root = TempDir::new().unwrap();
        let manifest = ManifestNode::list([
            FileEntry::new("one", "http://host/1", 1),
            FileEntry::new("two", "http://unreachable/2", 2),
            FileEntry::new("three", "http://host/3", 3),
        ]);

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq("http://host/1"), always())
            .times(1)
            .returning(write_bytes(1));
        fetcher
            .expect_fetch()
            .with(eq("http://unreachable/2"), always())
            .times(1)
            .returning(|url, _| Err(unreachable(url)));
        fetcher
            .expect_fetch()
            .with(eq("http://host/3"), always())
            .times(1)
            .returning(write_bytes(3));

        let downloader = AssetDownloader::with_fetcher(root.path(), manifest, fetcher);
        let report = downloader.download().unwrap();

        assert!(!report.is_complete());
        let failed: Vec<_> = report.failed().map(|o| o.url.as_str()).collect();
        assert_eq!(failed, vec!["http://unreachable/2"]);
        assert_eq!(report.succeeded().count(), 2);
        assert!(root.path().join("one").exists());
        assert!(root.path().join("three").exists());
    }

    #[test]
    fn test_stale_file_is_replaced() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("model.pt"), b"truncated").unwrap();
        let manifest = ManifestNode::file("model.pt", "http://host/model.pt", 64);

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_, destination| {
                assert!(!destination.exists(), "stale file should be removed first");
                fs::write(destination, [1_u8; 64]).unwrap();
                Ok(64)
            });

        let downloader = AssetDownloader::with_fetcher(root.path(), manifest, fetcher);
        let report = downloader.download().unwrap();

        assert!(report.is_complete());
        assert_eq!(fs::metadata(root.path().join("model.pt")).unwrap().len(), 64);
    }

    #[test]
    fn test_failed_fetch_heals_on_next_run() {
        let root = TempDir::new().unwrap();
        let manifest = ManifestNode::file("model.pt", "http://host/model.pt", 8);

        let mut flaky = MockFetcher::new();
        flaky.expect_fetch().times(1).returning(|url, destination| {
            fs::write(destination, b"half").unwrap();
            Err(unreachable(url))
        });
        let report = AssetDownloader::with_fetcher(root.path(), manifest.clone(), flaky)
            .download()
            .unwrap();
        assert_eq!(report.failed().count(), 1);

        let mut healthy = MockFetcher::new();
        healthy.expect_fetch().times(1).returning(write_bytes(8));
        let report = AssetDownloader::with_fetcher(root.path(), manifest, healthy)
            .download()
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(fs::metadata(root.path().join("model.pt")).unwrap().len(), 8);
    }

    #[test]
    fn test_directories_exist_even_if_fetch_fails() {
        let root = TempDir::new().unwrap();
        let manifest = ManifestNode::namespace([(
            "a",
            ManifestNode::namespace([("b", ManifestNode::file("f", "http://host/f", 1))]),
        )]);

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|url, _| Err(unreachable(url)));

        let report = AssetDownloader::with_fetcher(root.path(), manifest, fetcher)
            .download()
            .unwrap();

        assert!(!report.is_complete());
        assert!(root.path().join("a/b").is_dir());
        assert!(!root.path().join("a/b/f").exists());
    }

    #[test]
    fn test_resolution_error_aborts_before_fetching() {
        let root = TempDir::new().unwrap();
        let manifest = ManifestNode::list([
            FileEntry::new("good", "http://host/good", 1),
            FileEntry::new("..", "http://host/bad", 1),
        ]);

        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().never();

        let result = AssetDownloader::with_fetcher(root.path(), manifest, fetcher).download();

        assert!(matches!(result, Err(ResolveError::Manifest(_))));
    }

    #[test]
    fn test_progress_reports_each_task() {
        let root = TempDir::new().unwrap();
        let manifest = ManifestNode::list([
            FileEntry::new("a", "http://host/a", 1),
            FileEntry::new("b", "http://host/b", 1),
        ]);

        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().times(2).returning(write_bytes(1));

        let mut seen = Vec::new();
        AssetDownloader::with_fetcher(root.path(), manifest, fetcher)
            .download_with_progress(|index, total, task| {
                seen.push((index, total, task.url.clone()));
            })
            .unwrap();

        assert_eq!(
            seen,
            vec![
                (0, 2, "http://host/a".to_owned()),
                (1, 2, "http://host/b".to_owned()),
            ]
        );
    }

    #[test]
    fn test_construction_touches_nothing() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("never-created");

        let downloader = AssetDownloader::with_fetcher(
            &root,
            ManifestNode::file("f", "http://host/f", 1),
            MockFetcher::new(),
        );

        assert_eq!(downloader.root(), root.as_path());
        assert_eq!(downloader.manifest().entry_count(), 1);
        assert!(!root.exists());
    }
}
