#![deny(missing_docs)]
#![doc = "Persisted record of installed packages: one JSON document under the prefix, upserted on install and diffed on upgrade."]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use keg_core::{storage_error, Digest, ErrorInfo, KegError};
use keg_resolve::{InstalledSummary, InstalledView};
use log::warn;
use serde::{Deserialize, Serialize};

/// Registry record for one installed formula.
///
/// Created after a build+install completes; replaced, never mutated in
/// place, when a different version supersedes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    /// Formula identity.
    pub name: String,
    /// Installed version string.
    pub version: String,
    /// Digest of the source artifact this install was built from.
    pub digest: Digest,
    /// When the install completed.
    pub installed_at: DateTime<Utc>,
    /// Prefix-relative paths of every installed file, for later removal.
    pub files: Vec<PathBuf>,
    /// Whether the post-install test procedure has passed.
    #[serde(default)]
    pub verified: bool,
}

/// Disk-backed map of formula identity to [`InstalledPackage`].
///
/// All writes go through an internal lock so concurrent installers cannot
/// interleave upserts; reads load a consistent snapshot of the store file.
#[derive(Debug)]
pub struct Registry {
    prefix: PathBuf,
    store_path: PathBuf,
    write_lock: Mutex<()>,
}

impl Registry {
    /// Opens (without creating) the registry for an installation prefix.
    pub fn open(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        let store_path = prefix.join("registry.json");
        Self {
            prefix,
            store_path,
            write_lock: Mutex::new(()),
        }
    }

    /// The installation prefix this registry tracks.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    fn load(&self) -> Result<BTreeMap<String, InstalledPackage>, KegError> {
        if !self.store_path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = fs::read(&self.store_path)
            .map_err(|err| storage_error("keg_registry.read", self.store_path.display(), err))?;
        serde_json::from_slice(&bytes).map_err(|err| {
            KegError::Storage(
                ErrorInfo::new("keg_registry.parse", err.to_string())
                    .with_context("path", self.store_path.display().to_string())
                    .with_hint("the registry file is corrupt; restore or delete it"),
            )
        })
    }

    fn save(&self, store: &BTreeMap<String, InstalledPackage>) -> Result<(), KegError> {
        fs::create_dir_all(&self.prefix)
            .map_err(|err| storage_error("keg_registry.prefix_dir", self.prefix.display(), err))?;
        let bytes = serde_json::to_vec_pretty(store).map_err(|err| {
            KegError::Storage(ErrorInfo::new("keg_registry.serialize", err.to_string()))
        })?;
        fs::write(&self.store_path, bytes)
            .map_err(|err| storage_error("keg_registry.write", self.store_path.display(), err))
    }

    /// Upserts `pkg`, removing files only the superseded record installed.
    pub fn record(&self, pkg: InstalledPackage) -> Result<(), KegError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut store = self.load()?;
        if let Some(old) = store.get(&pkg.name) {
            for orphan in old.files.iter().filter(|f| !pkg.files.contains(f)) {
                let path = self.prefix.join(orphan);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => warn!("orphaned file {} not removed: {err}", path.display()),
                }
            }
        }
        store.insert(pkg.name.clone(), pkg);
        self.save(&store)
    }

    /// Returns the record for `name`, if installed.
    pub fn lookup(&self, name: &str) -> Result<Option<InstalledPackage>, KegError> {
        Ok(self.load()?.get(name).cloned())
    }

    /// All records in name order.
    pub fn list(&self) -> Result<Vec<InstalledPackage>, KegError> {
        Ok(self.load()?.into_values().collect())
    }

    /// Deletes every file the entry recorded, then the entry itself.
    ///
    /// Files that cannot be deleted do not keep the entry alive: the entry
    /// is removed and a [`KegError::PartialRemoval`] names the leftovers.
    /// Files already gone from disk count as removed.
    pub fn remove(&self, name: &str) -> Result<(), KegError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut store = self.load()?;
        let Some(entry) = store.remove(name) else {
            return Err(KegError::Storage(
                ErrorInfo::new(
                    "keg_registry.not_installed",
                    format!("{name} is not installed"),
                )
                .with_context("formula", name),
            ));
        };
        let mut leftovers = Vec::new();
        for file in &entry.files {
            let path = self.prefix.join(file);
            match fs::remove_file(&path) {
                Ok(()) => prune_empty_parents(&self.prefix, &path),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(_) => leftovers.push(file.display().to_string()),
            }
        }
        self.save(&store)?;
        if leftovers.is_empty() {
            Ok(())
        } else {
            Err(KegError::PartialRemoval(
                ErrorInfo::new(
                    "keg_registry.partial_removal",
                    format!("{name} removed from the registry but {} file(s) remain", leftovers.len()),
                )
                .with_context("formula", name)
                .with_context("files", leftovers.join(",")),
            ))
        }
    }
}

impl InstalledView for Registry {
    fn installed(&self, name: &str) -> Option<InstalledSummary> {
        self.lookup(name).ok().flatten().map(|pkg| InstalledSummary {
            version: pkg.version,
            digest: pkg.digest,
        })
    }
}

// Best effort: directories emptied by an uninstall should not linger.
fn prune_empty_parents(prefix: &Path, removed: &Path) {
    let mut dir = removed.parent();
    while let Some(current) = dir {
        if current == prefix {
            break;
        }
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}
