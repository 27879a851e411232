//! Ephemeral per-build working directory.

use std::path::Path;

use keg_core::{ErrorInfo, KegError};
use tempfile::TempDir;

/// Temporary directory owned by exactly one in-flight build.
///
/// Holds the extracted source and everything the build procedure produces.
/// The directory is removed on drop, on success and failure exit paths
/// alike.
#[derive(Debug)]
pub struct BuildWorkspace {
    dir: TempDir,
}

impl BuildWorkspace {
    /// Creates a fresh workspace under the system temp directory.
    pub fn create() -> Result<Self, KegError> {
        let dir = TempDir::new().map_err(|err| {
            KegError::Storage(ErrorInfo::new(
                "keg_build.workspace_create",
                err.to_string(),
            ))
        })?;
        Ok(Self { dir })
    }

    /// Root path of the workspace.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
