//! The formula data model and its TOML surface.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::errors::{ErrorInfo, KegError};

/// One opaque external command making up a build procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    /// Program and arguments, executed directly without a shell.
    pub argv: Vec<String>,
}

/// Copies one build output into the installation prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallDirective {
    /// Workspace-relative file or directory produced by the build.
    pub source: String,
    /// Prefix-relative destination path.
    pub dest: String,
}

/// How a test step compares captured output against its expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Output must contain the expected literal.
    #[default]
    Contains,
    /// Output must equal the expected literal after trimming trailing newlines.
    Equals,
}

/// One post-install verification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStep {
    /// Program and arguments, run with the prefix as working directory.
    pub argv: Vec<String>,
    /// Expected output literal; `None` checks exit status only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<String>,
    /// Comparison mode for `expect`.
    #[serde(default, rename = "match")]
    pub match_kind: MatchKind,
}

/// Declarative definition of one installable package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    /// Identity, unique within a catalog.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Informational homepage URL.
    #[serde(default)]
    pub homepage: String,
    /// Version string for the source artifact.
    pub version: String,
    /// Source artifact URL.
    pub url: String,
    /// Declared content digest of the source artifact.
    pub digest: Digest,
    /// Names of formulas that must be installed first, in declared order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Build procedure, run in declared order inside the workspace.
    #[serde(default)]
    pub build: Vec<BuildStep>,
    /// Install directives applied after the build procedure succeeds.
    #[serde(default)]
    pub install: Vec<InstallDirective>,
    /// Post-install verification procedure.
    #[serde(default)]
    pub test: Vec<TestStep>,
}

impl Formula {
    /// Parses a formula from its TOML definition and validates it.
    pub fn from_toml(contents: &str) -> Result<Self, KegError> {
        let formula: Formula = toml::from_str(contents).map_err(|err| {
            KegError::MalformedFormula(ErrorInfo::new(
                "keg_core.formula_parse",
                err.to_string(),
            ))
        })?;
        formula.validate()?;
        Ok(formula)
    }

    /// Checks the structural invariants a parsed formula must satisfy.
    pub fn validate(&self) -> Result<(), KegError> {
        for (field, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("url", &self.url),
        ] {
            if value.trim().is_empty() {
                return Err(self.malformed(
                    "keg_core.formula_field",
                    format!("required field `{field}` is empty"),
                ));
            }
        }
        self.digest.validate(&self.name)?;
        if self.dependencies.iter().any(|dep| dep == &self.name) {
            return Err(self.malformed(
                "keg_core.formula_self_dep",
                "formula depends on itself",
            ));
        }
        for (idx, step) in self.build.iter().enumerate() {
            if step.argv.is_empty() {
                return Err(self.malformed(
                    "keg_core.formula_build_step",
                    format!("build step {idx} has an empty argv"),
                ));
            }
        }
        for (idx, step) in self.test.iter().enumerate() {
            if step.argv.is_empty() {
                return Err(self.malformed(
                    "keg_core.formula_test_step",
                    format!("test step {idx} has an empty argv"),
                ));
            }
        }
        for directive in &self.install {
            if directive.source.trim().is_empty() || directive.dest.trim().is_empty() {
                return Err(self.malformed(
                    "keg_core.formula_install",
                    "install directive with empty source or dest",
                ));
            }
            if escapes_root(&directive.dest) {
                return Err(self.malformed(
                    "keg_core.formula_install_dest",
                    format!("install dest `{}` escapes the prefix", directive.dest),
                ));
            }
            if escapes_root(&directive.source) {
                return Err(self.malformed(
                    "keg_core.formula_install_source",
                    format!("install source `{}` escapes the workspace", directive.source),
                ));
            }
        }
        Ok(())
    }

    fn malformed(&self, code: &str, message: impl Into<String>) -> KegError {
        KegError::MalformedFormula(
            ErrorInfo::new(code, message).with_context("formula", self.name.clone()),
        )
    }
}

/// Whether a relative path is absolute or climbs out of its root.
pub fn escapes_root(path: &str) -> bool {
    let path = Path::new(path);
    if path.is_absolute() {
        return true;
    }
    let mut depth: i64 = 0;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}
