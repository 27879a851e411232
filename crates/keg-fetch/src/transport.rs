//! The network capability behind the fetcher, kept swappable for tests.

use std::fs;
use std::path::PathBuf;

use keg_core::{ErrorInfo, KegError};

/// Retrieves the raw bytes behind a source URL.
///
/// Implementations report transport problems as
/// [`KegError::FetchUnavailable`]; integrity is checked by the caller.
pub trait Transport: Send + Sync {
    /// Fetches the full byte stream at `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, KegError>;
}

/// Resolves `file:` URLs (and bare paths) against a root directory.
///
/// Used by tests and by catalogs that ship their source archives alongside
/// the formula definitions.
#[derive(Debug, Clone)]
pub struct FileTransport {
    root: PathBuf,
}

impl FileTransport {
    /// Creates a transport rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Transport for FileTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, KegError> {
        let relative = url.strip_prefix("file:").unwrap_or(url);
        let path = self.root.join(relative.trim_start_matches('/'));
        fs::read(&path).map_err(|err| {
            KegError::FetchUnavailable(
                ErrorInfo::new("keg_fetch.file_read", err.to_string())
                    .with_context("url", url)
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

/// Blocking HTTP transport.
#[cfg(feature = "http")]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpTransport {
    /// Creates a transport with a default client.
    pub fn new() -> Result<Self, KegError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|err| {
                KegError::FetchUnavailable(ErrorInfo::new(
                    "keg_fetch.http_client",
                    err.to_string(),
                ))
            })?;
        Ok(Self { client })
    }

    /// Creates a transport around a caller-configured client.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, KegError> {
        let unavailable = |err: reqwest::Error| {
            KegError::FetchUnavailable(
                ErrorInfo::new("keg_fetch.http_request", err.to_string())
                    .with_context("url", url),
            )
        };
        let response = self.client.get(url).send().map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(KegError::FetchUnavailable(
                ErrorInfo::new(
                    "keg_fetch.http_status",
                    format!("server answered {status}"),
                )
                .with_context("url", url),
            ));
        }
        let bytes = response.bytes().map_err(unavailable)?;
        Ok(bytes.to_vec())
    }
}
