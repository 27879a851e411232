//! A directory of formula definitions, validated as a whole at load time.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::errors::{storage_error, ErrorInfo, KegError};
use crate::formula::Formula;

/// All formulas known to the engine, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    formulas: BTreeMap<String, Formula>,
}

impl Catalog {
    /// Builds a catalog from already-parsed formulas.
    ///
    /// Applies the same cross-formula checks as [`Catalog::load`]: duplicate
    /// names are rejected, and a re-declaration of the same `(name, version)`
    /// with a different digest is a data-quality error, not an update.
    pub fn from_formulas(formulas: impl IntoIterator<Item = Formula>) -> Result<Self, KegError> {
        let mut map: BTreeMap<String, Formula> = BTreeMap::new();
        for formula in formulas {
            formula.validate()?;
            if let Some(existing) = map.get(&formula.name) {
                if existing.version == formula.version
                    && existing.digest != formula.digest
                {
                    return Err(KegError::MalformedFormula(
                        ErrorInfo::new(
                            "keg_core.catalog_digest_conflict",
                            format!(
                                "formula {} v{} declared twice with differing digests",
                                formula.name, formula.version
                            ),
                        )
                        .with_context("first", existing.digest.value.clone())
                        .with_context("second", formula.digest.value.clone())
                        .with_hint("a new digest requires a new version revision"),
                    ));
                }
                return Err(KegError::MalformedFormula(
                    ErrorInfo::new(
                        "keg_core.catalog_duplicate",
                        format!("formula {} declared more than once", formula.name),
                    )
                    .with_context("formula", formula.name.clone()),
                ));
            }
            map.insert(formula.name.clone(), formula);
        }
        let catalog = Self { formulas: map };
        catalog.check_dependency_closure()?;
        Ok(catalog)
    }

    /// Loads every `*.toml` formula under `dir`, sorted by file name so the
    /// duplicate checks see a deterministic order.
    pub fn load(dir: &Path) -> Result<Self, KegError> {
        let mut paths = Vec::new();
        let entries = fs::read_dir(dir)
            .map_err(|err| storage_error("keg_core.catalog_dir", dir.display(), err))?;
        for entry in entries {
            let entry =
                entry.map_err(|err| storage_error("keg_core.catalog_dir", dir.display(), err))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();
        let mut formulas = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = fs::read_to_string(&path)
                .map_err(|err| storage_error("keg_core.catalog_read", path.display(), err))?;
            let formula = Formula::from_toml(&contents).map_err(|err| match err {
                KegError::MalformedFormula(info) => KegError::MalformedFormula(
                    info.with_context("file", path.display().to_string()),
                ),
                other => other,
            })?;
            formulas.push(formula);
        }
        Self::from_formulas(formulas)
    }

    /// Looks up a formula by name.
    pub fn get(&self, name: &str) -> Option<&Formula> {
        self.formulas.get(name)
    }

    /// Iterates over all formulas in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Formula> {
        self.formulas.values()
    }

    /// Number of formulas in the catalog.
    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    /// Whether the catalog holds no formulas.
    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    fn check_dependency_closure(&self) -> Result<(), KegError> {
        for formula in self.formulas.values() {
            for dep in &formula.dependencies {
                if !self.formulas.contains_key(dep) {
                    return Err(KegError::MalformedFormula(
                        ErrorInfo::new(
                            "keg_core.catalog_unknown_dep",
                            format!("formula {} depends on undeclared {dep}", formula.name),
                        )
                        .with_context("formula", formula.name.clone())
                        .with_context("dependency", dep.clone()),
                    ));
                }
            }
        }
        Ok(())
    }
}
