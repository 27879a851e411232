#![deny(missing_docs)]
#![doc = "Build, install and verification execution for the keg engine: ephemeral workspaces, archive extraction, external build steps under a wall-clock limit, and the post-install test runner."]

mod exec;
mod extract;
mod executor;
mod verify;
mod workspace;

pub use exec::{run_step, StepError, StepLimits, StepOutput};
pub use extract::extract;
pub use executor::build_and_install;
pub use verify::{verify, TestOutcome};
pub use workspace::BuildWorkspace;
