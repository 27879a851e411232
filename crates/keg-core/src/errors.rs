//! Structured error types shared across keg crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`KegError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (formula names, digests, paths, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Canonical error type for the keg engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail")]
pub enum KegError {
    /// A formula definition is missing required fields or is internally
    /// inconsistent.
    #[error("malformed formula: {0}")]
    MalformedFormula(ErrorInfo),
    /// A fetched artifact's digest does not match the declared digest.
    #[error("integrity mismatch: {0}")]
    IntegrityMismatch(ErrorInfo),
    /// A transport failure while fetching a source artifact. Retryable.
    #[error("fetch unavailable: {0}")]
    FetchUnavailable(ErrorInfo),
    /// The dependency graph contains a cycle.
    #[error("dependency cycle: {0}")]
    DependencyCycle(ErrorInfo),
    /// A dependency edge names a formula absent from the catalog.
    #[error("unknown dependency: {0}")]
    UnknownDependency(ErrorInfo),
    /// A source artifact could not be extracted.
    #[error("extraction failed: {0}")]
    ExtractionFailed(ErrorInfo),
    /// A build step exited with a non-zero status.
    #[error("build step failed: {0}")]
    BuildStepFailed(ErrorInfo),
    /// An install directive references a file the build did not produce.
    #[error("install artifact missing: {0}")]
    InstallArtifactMissing(ErrorInfo),
    /// An uninstall removed the registry entry but left files behind.
    #[error("partial removal: {0}")]
    PartialRemoval(ErrorInfo),
    /// A fetch or build step exceeded its wall-clock limit. Retryable.
    #[error("timeout: {0}")]
    Timeout(ErrorInfo),
    /// Registry or workspace I/O fault.
    #[error("storage error: {0}")]
    Storage(ErrorInfo),
}

impl KegError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            KegError::MalformedFormula(info)
            | KegError::IntegrityMismatch(info)
            | KegError::FetchUnavailable(info)
            | KegError::DependencyCycle(info)
            | KegError::UnknownDependency(info)
            | KegError::ExtractionFailed(info)
            | KegError::InstallArtifactMissing(info)
            | KegError::BuildStepFailed(info)
            | KegError::PartialRemoval(info)
            | KegError::Timeout(info)
            | KegError::Storage(info) => info,
        }
    }

    /// Whether the caller may retry the failed operation with backoff.
    ///
    /// Integrity and structural errors are never retryable; only transport
    /// failures and wall-clock timeouts are.
    pub fn is_transient(&self) -> bool {
        matches!(self, KegError::FetchUnavailable(_) | KegError::Timeout(_))
    }
}

/// Shorthand for a [`KegError::Storage`] wrapping an I/O failure on a path.
pub fn storage_error(code: &str, path: impl Display, err: impl Display) -> KegError {
    KegError::Storage(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.to_string()),
    )
}
