//! Source archive extraction into a build workspace.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use keg_core::{storage_error, ErrorInfo, KegError};
use zip::ZipArchive;

fn extraction_error(code: &str, err: impl ToString) -> KegError {
    KegError::ExtractionFailed(ErrorInfo::new(code, err.to_string()))
}

/// Unpacks the zip archive at `artifact` into `dest`.
///
/// Entry names that are absolute or climb out of `dest` are rejected as
/// [`KegError::ExtractionFailed`], as are corrupt archives.
pub fn extract(artifact: &Path, dest: &Path) -> Result<(), KegError> {
    let file = File::open(artifact)
        .map_err(|err| storage_error("keg_build.artifact_open", artifact.display(), err))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| extraction_error("keg_build.archive_parse", err))?;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| extraction_error("keg_build.archive_entry", err))?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(KegError::ExtractionFailed(
                ErrorInfo::new(
                    "keg_build.archive_hostile_path",
                    format!("archive entry `{}` escapes the workspace", entry.name()),
                )
                .with_context("entry", entry.name()),
            ));
        };
        let out_path = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|err| storage_error("keg_build.extract_dir", out_path.display(), err))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| storage_error("keg_build.extract_dir", parent.display(), err))?;
        }
        let mut out = File::create(&out_path)
            .map_err(|err| storage_error("keg_build.extract_write", out_path.display(), err))?;
        io::copy(&mut entry, &mut out)
            .map_err(|err| extraction_error("keg_build.extract_copy", err))?;
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&out_path, fs::Permissions::from_mode(mode));
        }
    }
    Ok(())
}
