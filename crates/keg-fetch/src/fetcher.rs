//! Retry-aware fetch of one source artifact, verified before use.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use keg_core::{storage_error, Digest, KegError};
use log::{debug, warn};

use crate::transport::Transport;

/// Bounded retry schedule for transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the second attempt; doubles per retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Fetches source artifacts through a [`Transport`] and verifies digests.
pub struct Fetcher<'t> {
    transport: &'t dyn Transport,
    retry: RetryPolicy,
}

impl<'t> Fetcher<'t> {
    /// Creates a fetcher over `transport` with the given retry schedule.
    pub fn new(transport: &'t dyn Transport, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Downloads `url` into `dest_dir/file_name`, verifying `expected`.
    ///
    /// Transient transport failures are retried with exponential backoff up
    /// to the policy's attempt bound. A digest mismatch is fatal, is never
    /// retried, and leaves no artifact file behind.
    pub fn fetch(
        &self,
        url: &str,
        expected: &Digest,
        dest_dir: &Path,
        file_name: &str,
    ) -> Result<PathBuf, KegError> {
        let bytes = self.fetch_with_retry(url)?;
        fs::create_dir_all(dest_dir)
            .map_err(|err| storage_error("keg_fetch.dest_dir", dest_dir.display(), err))?;
        let artifact = dest_dir.join(file_name);
        fs::write(&artifact, &bytes)
            .map_err(|err| storage_error("keg_fetch.artifact_write", artifact.display(), err))?;
        if let Err(err) = expected.verify(&bytes) {
            let _ = fs::remove_file(&artifact);
            return Err(err);
        }
        debug!("fetched {url} -> {} ({} bytes)", artifact.display(), bytes.len());
        Ok(artifact)
    }

    fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>, KegError> {
        let attempts = self.retry.attempts.max(1);
        let mut delay = self.retry.base_delay;
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.transport.fetch(url) {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!("fetch attempt {attempt}/{attempts} for {url} failed: {err}");
                    std::thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        // Unreachable: the loop always returns on its final attempt.
        Err(last_err.unwrap_or_else(|| {
            KegError::FetchUnavailable(keg_core::ErrorInfo::new(
                "keg_fetch.no_attempts",
                "retry policy allowed zero attempts",
            ))
        }))
    }
}

/// Derives an artifact file name from the URL tail, with a formula-based
/// fallback for URLs without a usable final segment.
pub fn artifact_file_name(url: &str, name: &str, version: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|tail| !tail.is_empty() && !tail.contains('?') && !tail.contains(':'))
        .map(str::to_string)
        .unwrap_or_else(|| format!("{name}-{version}.zip"))
}
