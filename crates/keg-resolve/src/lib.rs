#![deny(missing_docs)]
#![doc = "Dependency resolution for the keg engine: deterministic topological ordering with cycle and missing-dependency detection."]

use std::collections::BTreeMap;

use keg_core::{Catalog, Digest, ErrorInfo, Formula, KegError};
use log::debug;
use serde::{Deserialize, Serialize};

/// What the resolver needs to know about an already-installed formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledSummary {
    /// Installed version string.
    pub version: String,
    /// Digest recorded at install time.
    pub digest: Digest,
}

/// Read-only view of the installation registry.
///
/// A seam so the resolver does not depend on the registry's storage; the
/// registry crate implements it, and tests stub it.
pub trait InstalledView {
    /// Returns the installed summary for `name`, if present.
    fn installed(&self, name: &str) -> Option<InstalledSummary>;
}

/// An [`InstalledView`] with nothing installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NothingInstalled;

impl InstalledView for NothingInstalled {
    fn installed(&self, _name: &str) -> Option<InstalledSummary> {
        None
    }
}

/// One entry of a resolved install order.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The formula to install at this position.
    pub formula: Formula,
    /// Whether the registry already holds this exact (version, digest).
    ///
    /// An optimization flag: the executor may skip a satisfied entry, but
    /// re-building one must remain a safe no-op.
    pub satisfied: bool,
}

/// Computes the installation order for `root` over its transitive
/// dependency graph.
///
/// Depth-first, visiting each formula's dependency list in declared order,
/// which makes the resulting topological order (dependencies strictly
/// before dependents) deterministic across runs.
pub fn resolve(
    root: &str,
    catalog: &Catalog,
    installed: &dyn InstalledView,
) -> Result<Vec<Resolution>, KegError> {
    let mut marks: BTreeMap<String, Mark> = BTreeMap::new();
    let mut stack: Vec<String> = Vec::new();
    let mut order: Vec<Resolution> = Vec::new();
    visit(root, None, catalog, installed, &mut marks, &mut stack, &mut order)?;
    debug!(
        "resolved {root}: {} formulas, {} already satisfied",
        order.len(),
        order.iter().filter(|r| r.satisfied).count()
    );
    Ok(order)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InStack,
    Done,
}

fn visit(
    name: &str,
    dependent: Option<&str>,
    catalog: &Catalog,
    installed: &dyn InstalledView,
    marks: &mut BTreeMap<String, Mark>,
    stack: &mut Vec<String>,
    order: &mut Vec<Resolution>,
) -> Result<(), KegError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InStack) => {
            let from = stack.iter().position(|n| n == name).unwrap_or(0);
            let mut members: Vec<String> = stack[from..].to_vec();
            members.push(name.to_string());
            return Err(KegError::DependencyCycle(
                ErrorInfo::new(
                    "keg_resolve.cycle",
                    format!("dependency cycle: {}", members.join(" -> ")),
                )
                .with_context("members", members.join(",")),
            ));
        }
        None => {}
    }
    let formula = catalog.get(name).ok_or_else(|| {
        let mut info = ErrorInfo::new(
            "keg_resolve.unknown",
            format!("formula {name} is not in the catalog"),
        )
        .with_context("dependency", name);
        if let Some(dependent) = dependent {
            info = info.with_context("required_by", dependent);
        }
        KegError::UnknownDependency(info)
    })?;
    marks.insert(name.to_string(), Mark::InStack);
    stack.push(name.to_string());
    for dep in &formula.dependencies {
        visit(dep, Some(name), catalog, installed, marks, stack, order)?;
    }
    stack.pop();
    marks.insert(name.to_string(), Mark::Done);
    let satisfied = installed
        .installed(name)
        .is_some_and(|s| s.version == formula.version && s.digest == formula.digest);
    order.push(Resolution {
        formula: formula.clone(),
        satisfied,
    });
    Ok(())
}
