//! Build procedure execution and prefix installation.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use keg_core::{storage_error, ErrorInfo, Formula, InstallDirective, KegError};
use keg_registry::InstalledPackage;
use log::{debug, info};
use walkdir::WalkDir;

use crate::exec::{run_step, StepError, StepLimits};
use crate::extract::extract;
use crate::workspace::BuildWorkspace;

const OUTPUT_TAIL: usize = 2048;

/// Extracts, builds and installs one formula's source artifact.
///
/// Side effects are confined to an ephemeral [`BuildWorkspace`] (removed on
/// every exit path) and the installation prefix. Writing the returned
/// record into the registry is the caller's responsibility.
pub fn build_and_install(
    formula: &Formula,
    artifact: &Path,
    prefix: &Path,
    limits: &StepLimits,
) -> Result<InstalledPackage, KegError> {
    let workspace = BuildWorkspace::create()?;
    extract(artifact, workspace.path())?;
    debug!("extracted {} into {}", artifact.display(), workspace.path().display());
    for (idx, step) in formula.build.iter().enumerate() {
        let output = run_step(&step.argv, workspace.path(), limits).map_err(|err| match err {
            StepError::TimedOut(limit) => KegError::Timeout(
                ErrorInfo::new(
                    "keg_build.step_timeout",
                    format!("build step {idx} exceeded {}s", limit.as_secs()),
                )
                .with_context("formula", formula.name.clone())
                .with_context("step", idx.to_string()),
            ),
            StepError::SpawnFailed(reason) => KegError::BuildStepFailed(
                ErrorInfo::new(
                    "keg_build.step_spawn",
                    format!("build step {idx} could not start: {reason}"),
                )
                .with_context("formula", formula.name.clone())
                .with_context("step", idx.to_string()),
            ),
        })?;
        if !output.success {
            return Err(KegError::BuildStepFailed(
                ErrorInfo::new(
                    "keg_build.step_status",
                    format!("build step {idx} exited with status {}", output.code),
                )
                .with_context("formula", formula.name.clone())
                .with_context("step", idx.to_string())
                .with_context("stdout", tail(&output.stdout))
                .with_context("stderr", tail(&output.stderr)),
            ));
        }
    }
    let mut files = Vec::new();
    for directive in &formula.install {
        apply_directive(workspace.path(), prefix, directive, formula, &mut files)?;
    }
    files.sort();
    files.dedup();
    info!(
        "installed {} {} ({} files)",
        formula.name,
        formula.version,
        files.len()
    );
    Ok(InstalledPackage {
        name: formula.name.clone(),
        version: formula.version.clone(),
        digest: formula.digest.clone(),
        installed_at: Utc::now(),
        files,
        verified: false,
    })
}

fn apply_directive(
    workspace: &Path,
    prefix: &Path,
    directive: &InstallDirective,
    formula: &Formula,
    files: &mut Vec<PathBuf>,
) -> Result<(), KegError> {
    let source = workspace.join(&directive.source);
    if !source.exists() {
        return Err(KegError::InstallArtifactMissing(
            ErrorInfo::new(
                "keg_build.install_missing",
                format!("build did not produce `{}`", directive.source),
            )
            .with_context("formula", formula.name.clone())
            .with_context("source", directive.source.clone())
            .with_hint("the build procedure must create every install source"),
        ));
    }
    let dest_rel = PathBuf::from(&directive.dest);
    if source.is_dir() {
        for entry in WalkDir::new(&source) {
            let entry = entry.map_err(|err| {
                KegError::Storage(
                    ErrorInfo::new("keg_build.install_walk", err.to_string())
                        .with_context("source", directive.source.clone()),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&source)
                .map_err(|err| {
                    KegError::Storage(ErrorInfo::new(
                        "keg_build.install_relative",
                        err.to_string(),
                    ))
                })?;
            let target_rel = dest_rel.join(relative);
            copy_into_prefix(entry.path(), prefix, &target_rel)?;
            files.push(target_rel);
        }
    } else {
        copy_into_prefix(&source, prefix, &dest_rel)?;
        files.push(dest_rel);
    }
    Ok(())
}

fn copy_into_prefix(source: &Path, prefix: &Path, target_rel: &Path) -> Result<(), KegError> {
    let target = prefix.join(target_rel);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| storage_error("keg_build.install_dir", parent.display(), err))?;
    }
    fs::copy(source, &target)
        .map_err(|err| storage_error("keg_build.install_copy", target.display(), err))?;
    Ok(())
}

fn tail(output: &str) -> String {
    if output.len() <= OUTPUT_TAIL {
        return output.to_string();
    }
    let mut start = output.len() - OUTPUT_TAIL;
    while !output.is_char_boundary(start) {
        start += 1;
    }
    output[start..].to_string()
}
