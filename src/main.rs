#![allow(clippy::result_large_err)]

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use miette::Diagnostic;
use miette::Result;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::Cli;
use crate::driver::DriverError;
use crate::driver::run_plan;
use crate::outputter::OutPutter;
use crate::parser::TestPlan;
use crate::runner::Runner;
use crate::runner::RunnerError;
use crate::runner::Session;
use crate::scenario::ScenarioOptions;
use crate::scenario::nbi_scenario;
use crate::validator::IR;
use crate::validator::ValidationError;
use crate::validator::Validator;

mod asserter;
mod cli;
mod driver;
mod outputter;
mod parser;
mod runner;
mod scenario;
#[cfg(test)]
mod test_server;
mod validator;

#[derive(Error, Debug, Diagnostic)]
pub enum NbiSmokeError {
    #[error("Failed to read plan file")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse plan file")]
    TomlParsing(#[from] toml::de::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ValidationError(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(code(nbi_smoke::client))]
    RunnerError(#[from] RunnerError),

    #[error(transparent)]
    #[diagnostic(
        code(nbi_smoke::test_failed),
        help("the run stops at the first failing test, run with -v to see every response")
    )]
    DriverError(#[from] DriverError),
}

/// Sets up `tracing` for the whole run.
///
/// `RUST_LOG` takes precedence when set. Otherwise `--quiet` keeps errors
/// only, the default shows every test as it is sent, `-v` adds response
/// bodies and `-vv` everything else.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("warn,nbi_smoke={level}"))),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// Loads the tests to run: a validated TOML plan when `--plan` is given,
/// the built-in NBI scenario otherwise. Also returns a name for the banner.
fn load_plan(cli: &Cli) -> Result<(IR, String), NbiSmokeError> {
    let Some(path) = &cli.plan else {
        let opts = ScenarioOptions {
            user: cli.user.clone(),
            password: cli.password.clone(),
            project: cli.project.clone(),
            vnfd_file: PathBuf::from(&cli.vnfd_file),
            vnfd_package: PathBuf::from(&cli.vnfd_package),
            nsd_file: PathBuf::from(&cli.nsd_file),
            nsd_package: PathBuf::from(&cli.nsd_package),
        };
        return Ok((nbi_scenario(&opts), format!("NBI scenario against {}", cli.url)));
    };

    let contents = std::fs::read_to_string(path).map_err(NbiSmokeError::FileError)?;
    let plan: TestPlan = toml::from_str(&contents).map_err(NbiSmokeError::TomlParsing)?;
    let ir = Validator::new(&plan, &contents, path)
        .validate()
        .map_err(NbiSmokeError::ValidationError)?;

    Ok((ir, format!("test plan {path}")))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let (ir, plan_name) = load_plan(&cli)?;
    let n_tests = ir.n_tests();

    let mut session = Session::new(&cli.url);
    session.headers = ir.global_headers.clone();
    session.verify_tls = !cli.insecure;
    session.timeout = cli.timeout.map(Duration::from_secs);

    let (tx, rx) = flume::unbounded();
    let runner = Runner::new(session)
        .map_err(NbiSmokeError::RunnerError)?
        .with_events(tx);

    // The runner owns the only sender, so the outputter finishes as soon as
    // the run is over, whichever way it ends.
    let (result, summary) = futures::join!(
        async move {
            let mut runner = runner;
            run_plan(ir, &mut runner).await
        },
        OutPutter::start(rx, &plan_name, n_tests),
    );

    tracing::debug!(passed = summary.passed, failed = summary.failed, "run finished");
    result.map_err(NbiSmokeError::DriverError)?;

    println!("PASS");
    Ok(())
}
