//! Post-install verification of an installed formula.

use std::path::Path;

use keg_core::{MatchKind, TestStep};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::exec::{run_step, StepError, StepLimits};

/// Verdict of a test procedure. Advisory: a failure never rolls back the
/// install, it only marks the package unverified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum TestOutcome {
    /// Every step passed.
    Passed,
    /// The first failing step, with why it failed.
    Failed {
        /// Zero-based index of the failing step.
        step: usize,
        /// Human readable failure reason.
        reason: String,
    },
}

impl TestOutcome {
    /// Whether the procedure passed.
    pub fn passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }
}

/// Runs each declared test step against the installed prefix.
///
/// Steps run with the prefix as working directory, and a step's `argv[0]`
/// resolves against the prefix first so formulas can invoke what they just
/// installed. The first failing step stops the procedure.
pub fn verify(prefix: &Path, steps: &[TestStep], limits: &StepLimits) -> TestOutcome {
    for (idx, step) in steps.iter().enumerate() {
        let argv = resolve_argv(prefix, &step.argv);
        let output = match run_step(&argv, prefix, limits) {
            Ok(output) => output,
            Err(StepError::TimedOut(limit)) => {
                return TestOutcome::Failed {
                    step: idx,
                    reason: format!("timed out after {}s", limit.as_secs()),
                };
            }
            Err(StepError::SpawnFailed(reason)) => {
                return TestOutcome::Failed {
                    step: idx,
                    reason: format!("could not start: {reason}"),
                };
            }
        };
        if !output.success {
            return TestOutcome::Failed {
                step: idx,
                reason: format!("exited with status {}", output.code),
            };
        }
        if let Some(expected) = &step.expect {
            let matched = match step.match_kind {
                MatchKind::Contains => output.stdout.contains(expected),
                MatchKind::Equals => output.stdout.trim_end_matches('\n') == expected,
            };
            if !matched {
                return TestOutcome::Failed {
                    step: idx,
                    reason: format!(
                        "output mismatch: expected `{expected}`, got `{}`",
                        output.stdout.trim_end_matches('\n')
                    ),
                };
            }
        }
        debug!("test step {idx} passed");
    }
    TestOutcome::Passed
}

fn resolve_argv(prefix: &Path, argv: &[String]) -> Vec<String> {
    let mut argv = argv.to_vec();
    if let Some(program) = argv.first_mut() {
        let candidate = prefix.join(&*program);
        if candidate.is_file() {
            *program = candidate.display().to_string();
        }
    }
    argv
}
