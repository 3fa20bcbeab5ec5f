//! `cppld` — the command-line driver. Parses CLI options, wires up a
//! [`Coordinator`], and maps the outcome onto an exit code:
//! `0` success, `1` argument error, `2` build failure.

use cppl_build::childproc::DryRunRunner;
use cppl_build::config;
use cppl_build::Coordinator;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = match config::parse_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cppld: {e}");
            return ExitCode::from(1);
        }
    };

    init_logging(config.verbose, config.trace);

    let dry_run = config.dry_run;
    let mut coordinator = Coordinator::new(config);
    if dry_run {
        coordinator = coordinator.with_runner(Arc::new(DryRunRunner));
    }

    match coordinator.run() {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            eprintln!("cppld: build failed: {e}");
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool, trace: bool) {
    let default_level = if trace { "trace" } else if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
