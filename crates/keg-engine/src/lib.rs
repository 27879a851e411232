#![deny(missing_docs)]
#![doc = "Orchestration of the formula pipeline: resolve, fetch, build, record, verify."]

use std::path::PathBuf;
use std::time::Duration;

use keg_build::{build_and_install, verify, StepLimits, TestOutcome};
use keg_core::{Catalog, ErrorInfo, Formula, KegError};
use keg_fetch::{artifact_file_name, Fetcher, RetryPolicy, Transport};
use keg_registry::Registry;
use keg_resolve::resolve;
use log::info;
use serde::{Deserialize, Serialize};

/// Tunable limits for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Wall-clock limit per build or test step.
    pub step_timeout: Duration,
    /// Fetch attempts per artifact, including the first.
    pub fetch_attempts: u32,
    /// Backoff before the second fetch attempt; doubles per retry.
    pub fetch_base_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(600),
            fetch_attempts: 3,
            fetch_base_delay: Duration::from_millis(250),
        }
    }
}

/// What an [`Engine::install`] call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    /// Formulas built and recorded, in installation order.
    pub built: Vec<String>,
    /// Formulas skipped because the registry already satisfied them.
    pub skipped: Vec<String>,
    /// Verdict of the requested formula's test procedure, when it has one.
    pub verification: Option<TestOutcome>,
}

/// The formula interpreter: wires catalog, transport, registry and the
/// build executor into the install pipeline.
pub struct Engine {
    catalog: Catalog,
    transport: Box<dyn Transport>,
    registry: Registry,
    cache_dir: PathBuf,
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine over an installation prefix.
    ///
    /// Fetched artifacts land in `cache_dir`; the registry persists under
    /// the prefix itself.
    pub fn new(
        catalog: Catalog,
        transport: Box<dyn Transport>,
        prefix: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            transport,
            registry: Registry::open(prefix),
            cache_dir: cache_dir.into(),
            config,
        }
    }

    /// Read access to the registry, for listings.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Installs `name` and its transitive dependencies in topological
    /// order, then runs the requested formula's test procedure.
    ///
    /// Already-satisfied resolutions are skipped without running any build
    /// step, which makes re-installation idempotent. A failure mid-batch
    /// surfaces immediately; dependencies already recorded stay installed.
    pub fn install(&self, name: &str) -> Result<InstallReport, KegError> {
        let order = resolve(name, &self.catalog, &self.registry)?;
        let mut report = InstallReport {
            built: Vec::new(),
            skipped: Vec::new(),
            verification: None,
        };
        for resolution in &order {
            let formula = &resolution.formula;
            if resolution.satisfied {
                info!("{} {} already installed, skipping", formula.name, formula.version);
                report.skipped.push(formula.name.clone());
                continue;
            }
            self.install_one(formula)?;
            report.built.push(formula.name.clone());
        }
        let leaf = &order
            .last()
            .ok_or_else(|| {
                KegError::Storage(ErrorInfo::new(
                    "keg_engine.empty_order",
                    "resolver produced an empty order",
                ))
            })?
            .formula;
        if !leaf.test.is_empty() {
            report.verification = Some(self.run_tests(leaf)?);
        }
        Ok(report)
    }

    /// Removes `name` from the prefix and the registry.
    pub fn uninstall(&self, name: &str) -> Result<(), KegError> {
        self.registry.remove(name)
    }

    /// Re-runs the test procedure of an already-installed formula.
    pub fn test(&self, name: &str) -> Result<TestOutcome, KegError> {
        let formula = self.catalog.get(name).ok_or_else(|| {
            KegError::UnknownDependency(
                ErrorInfo::new(
                    "keg_engine.unknown_formula",
                    format!("formula {name} is not in the catalog"),
                )
                .with_context("formula", name),
            )
        })?;
        if self.registry.lookup(name)?.is_none() {
            return Err(KegError::Storage(
                ErrorInfo::new(
                    "keg_engine.not_installed",
                    format!("{name} is not installed"),
                )
                .with_context("formula", name)
                .with_hint("run install first"),
            ));
        }
        self.run_tests(formula)
    }

    fn install_one(&self, formula: &Formula) -> Result<(), KegError> {
        let fetcher = Fetcher::new(
            self.transport.as_ref(),
            RetryPolicy {
                attempts: self.config.fetch_attempts,
                base_delay: self.config.fetch_base_delay,
            },
        );
        let file_name = artifact_file_name(&formula.url, &formula.name, &formula.version);
        let artifact = fetcher.fetch(&formula.url, &formula.digest, &self.cache_dir, &file_name)?;
        let limits = StepLimits {
            timeout: self.config.step_timeout,
        };
        let pkg = build_and_install(formula, &artifact, self.registry.prefix(), &limits)?;
        self.registry.record(pkg)
    }

    // Runs the procedure and records the verdict on the registry entry.
    // The verdict is advisory: a failure marks the entry unverified but
    // never uninstalls it.
    fn run_tests(&self, formula: &Formula) -> Result<TestOutcome, KegError> {
        let limits = StepLimits {
            timeout: self.config.step_timeout,
        };
        let outcome = verify(self.registry.prefix(), &formula.test, &limits);
        if let Some(mut entry) = self.registry.lookup(&formula.name)? {
            entry.verified = outcome.passed();
            self.registry.record(entry)?;
        }
        Ok(outcome)
    }
}
