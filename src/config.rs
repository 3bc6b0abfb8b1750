use crate::catalog::Selection;
use crate::fetch::HttpSettings;
use crate::manifest::ManifestNode;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration, read from `~/.model-downloader.toml`
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// What to download and where
    pub download: DownloadConfig,
    /// Network behaviour
    #[serde(default)]
    pub http: HttpConfig,
    /// Logging
    pub telemetry: TelemetryConfig,
}

/// `[download]` section
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Cache root, `~/` is expanded
    pub root: String,
    /// Catalog selectors such as `sam2` or `whisper/tiny`
    #[serde(default)]
    pub catalogs: Vec<String>,
    /// Optional TOML manifest resolved directly under `root`
    pub manifest: Option<String>,
}

/// `[http]` section
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    /// Seconds allowed to establish a connection
    pub connect_timeout_secs: u64,
    /// Seconds allowed per file, 0 means no limit
    pub timeout_secs: u64,
    /// Skip TLS certificate verification
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            timeout_secs: 0,
            accept_invalid_certs: false,
        }
    }
}

impl HttpConfig {
    /// Fetcher settings for this section
    #[must_use]
    pub fn settings(&self) -> HttpSettings {
        HttpSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            accept_invalid_certs: self.accept_invalid_certs,
            ..HttpSettings::default()
        }
    }
}

/// `[telemetry]` section
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Log to a file instead of stdout
    pub enabled: bool,
    /// Log file, `~/` is expanded
    pub log_path: String,
}

/// A manifest together with the directory it is resolved against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    /// Human-readable label for logs
    pub label: String,
    /// Directory the manifest is rooted at
    pub root: PathBuf,
    /// Files to keep in place
    pub manifest: ManifestNode,
}

const DEFAULT_CONFIG: &str = r#"[download]
root = "~/.model-downloader/models"
catalogs = ["whisper/tiny", "sam2/tiny"]

[http]
connect_timeout_secs = 30
timeout_secs = 0
accept_invalid_certs = false

[telemetry]
enabled = true
log_path = "~/.model-downloader/download.log"
"#;

impl Config {
    /// Load config from ~/.model-downloader.toml, writing the default on first run
    ///
    /// # Errors
    /// Returns error if HOME is unset or the file cannot be read or parsed
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        Self::load_from(&config_path)
    }

    /// Load config from an explicit path
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        toml::from_str(&contents).context("failed to parse config TOML")
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".model-downloader.toml"))
    }

    fn create_default(path: &Path) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        Ok(())
    }

    /// Manifests to resolve, catalogs first, then the custom manifest
    ///
    /// # Errors
    /// Returns error on an unknown catalog selector or an unreadable/malformed manifest file
    pub fn download_jobs(&self) -> Result<Vec<DownloadJob>> {
        let root = Self::expand_path(&self.download.root)?;

        let mut jobs = Vec::with_capacity(self.download.catalogs.len() + 1);
        for selector in &self.download.catalogs {
            let selection = Selection::parse(selector)
                .with_context(|| format!("invalid catalog selector {selector:?}"))?;
            jobs.push(DownloadJob {
                label: selector.clone(),
                root: selection.directory(&root),
                manifest: selection.manifest,
            });
        }

        if let Some(manifest_path) = &self.download.manifest {
            let path = Self::expand_path(manifest_path)?;
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read manifest {}", path.display()))?;
            let manifest = ManifestNode::from_toml_str(&contents)
                .with_context(|| format!("invalid manifest {}", path.display()))?;
            jobs.push(DownloadJob {
                label: path.display().to_string(),
                root,
                manifest,
            });
        }

        Ok(jobs)
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if the path starts with `~/` and HOME is unset
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}
