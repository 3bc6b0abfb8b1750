//! Model downloader - keeps a local cache of ML model weights in line with a manifest
//!
//! A manifest describes files (name, URL, expected byte size), lists of files, and nested
//! namespaces that map to subdirectories. Resolution compares it with what is on disk and
//! yields the files that are missing or have the wrong size; only those are fetched.

/// Built-in catalogs of known model files
pub mod catalog;
/// Configuration management
pub mod config;
/// Resolve-then-fetch orchestration
pub mod downloader;
/// Streamed HTTP fetching
pub mod fetch;
/// Manifest data model and TOML parsing
pub mod manifest;
/// Manifest resolution against the filesystem
pub mod resolve;
/// Logging setup
pub mod telemetry;

pub use catalog::{Catalog, CatalogError, Selection};
pub use downloader::{AssetDownloader, DownloadOutcome, DownloadReport};
pub use fetch::{FetchError, Fetcher, HttpFetcher, HttpSettings};
pub use manifest::{FileEntry, ManifestError, ManifestNode};
pub use resolve::{resolve, DownloadJournal, DownloadTask, ResolveError};
