use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Size of each chunk copied from the response body to disk
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Something that can fetch a URL into a local file
///
/// [`HttpFetcher`] is the production implementation; tests use `MockFetcher` (via `mockall`).
#[cfg_attr(test, mockall::automock)]
pub trait Fetcher {
    /// Fetches `url` into `destination`, replacing any previous content
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    /// Returns error on transport failure, non-success status or local write failure
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError>;
}

/// Errors fetching a single file
#[derive(Debug, Error)]
pub enum FetchError {
    /// Failed to build the HTTP client
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request could not be sent or the connection failed
    #[error("request to {url} failed: {source}")]
    Request {
        /// Requested URL
        url: String,
        /// Underlying error
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("download failed with status {status}: {url}")]
    Status {
        /// Requested URL
        url: String,
        /// Response status
        status: reqwest::StatusCode,
    },

    /// Reading the response body failed midway
    #[error("failed to read response body from {url}: {source}")]
    Body {
        /// Requested URL
        url: String,
        /// Underlying error
        source: io::Error,
    },

    /// Writing the destination file failed
    #[error("failed to write {path}: {source}")]
    Io {
        /// Destination path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
}

/// Network settings for [`HttpFetcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Limit for establishing a connection
    pub connect_timeout: Duration,
    /// Limit for a whole request including the body; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Skip TLS certificate verification
    pub accept_invalid_certs: bool,
    /// `User-Agent` header value
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: None,
            accept_invalid_certs: false,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

/// Streams HTTP(S) GET responses to disk
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Builds a fetcher from `settings`
    ///
    /// # Errors
    /// Returns error if the TLS backend or client cannot be initialised
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        if settings.accept_invalid_certs {
            tracing::warn!("TLS certificate verification disabled for model downloads");
        }

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        tracing::info!(url = %url, path = %destination.display(), "downloading");

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|source| FetchError::Request {
                url: url.to_owned(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status,
            });
        }

        let write_error = |source| FetchError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let mut file = File::create(destination).map_err(write_error)?;
        let mut buffer = [0_u8; CHUNK_SIZE];
        let mut written = 0_u64;
        loop {
            let read = match response.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(FetchError::Body {
                        url: url.to_owned(),
                        source,
                    })
                }
            };
            file.write_all(&buffer[..read]).map_err(write_error)?;
            written += read as u64;
        }
        file.flush().map_err(write_error)?;

        tracing::info!(
            path = %destination.display(),
            size = written,
            "downloaded successfully"
        );

        Ok(written)
    }
}
