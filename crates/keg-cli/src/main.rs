use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use keg_build::TestOutcome;
use keg_core::{Catalog, KegError};
use keg_engine::{Engine, EngineConfig};
use keg_fetch::{FileTransport, HttpTransport, Transport};
use log::error;

#[derive(Parser, Debug)]
#[command(name = "keg", about = "Formula-driven package build engine CLI")]
struct Cli {
    /// Directory holding the formula catalog (*.toml definitions).
    #[arg(long, default_value = "formulas")]
    catalog: PathBuf,
    /// Installation prefix root.
    #[arg(long, default_value = "prefix")]
    prefix: PathBuf,
    /// Download cache for fetched source artifacts.
    #[arg(long)]
    cache: Option<PathBuf>,
    /// Resolve formula URLs against this directory instead of the network.
    #[arg(long)]
    local_sources: Option<PathBuf>,
    /// Per-step wall clock limit in seconds.
    #[arg(long, default_value_t = 600)]
    step_timeout: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, build and install a formula and its dependencies.
    Install {
        /// Formula name from the catalog.
        name: String,
    },
    /// Remove an installed formula's files and registry entry.
    Uninstall {
        /// Installed formula name.
        name: String,
    },
    /// Run a formula's verification procedure against the prefix.
    Test {
        /// Installed formula name.
        name: String,
    },
    /// List installed packages.
    List,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::new().filter("KEG_LOG")).init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            eprintln!("keg: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, KegError> {
    let catalog = Catalog::load(&cli.catalog)?;
    let transport: Box<dyn Transport> = match &cli.local_sources {
        Some(root) => Box::new(FileTransport::new(root)),
        None => Box::new(HttpTransport::new()?),
    };
    let cache = cli
        .cache
        .clone()
        .unwrap_or_else(|| cli.prefix.join(".cache"));
    let config = EngineConfig {
        step_timeout: Duration::from_secs(cli.step_timeout),
        ..EngineConfig::default()
    };
    let engine = Engine::new(catalog, transport, &cli.prefix, cache, config);
    match cli.command {
        Command::Install { name } => {
            let report = engine.install(&name)?;
            for built in &report.built {
                println!("installed {built}");
            }
            for skipped in &report.skipped {
                println!("already installed {skipped}");
            }
            match report.verification {
                Some(TestOutcome::Passed) => println!("{name}: tests passed"),
                Some(TestOutcome::Failed { step, reason }) => {
                    eprintln!("{name}: test step {step} failed: {reason}");
                }
                None => {}
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Uninstall { name } => {
            engine.uninstall(&name)?;
            println!("uninstalled {name}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Test { name } => match engine.test(&name)? {
            TestOutcome::Passed => {
                println!("{name}: tests passed");
                Ok(ExitCode::SUCCESS)
            }
            TestOutcome::Failed { step, reason } => {
                eprintln!("{name}: test step {step} failed: {reason}");
                Ok(ExitCode::FAILURE)
            }
        },
        Command::List => {
            for pkg in engine.registry().list()? {
                let verified = if pkg.verified { "verified" } else { "unverified" };
                println!("{} {} ({verified})", pkg.name, pkg.version);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
