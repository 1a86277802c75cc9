use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use log::{debug, warn};
use paramcheck_cli::cli_args::Args;
use paramcheck_cli::{driver, interrupt};
use paramcheck_core::coercion::ConnectorContext;
use paramcheck_core::config::Credentials;
use paramcheck_core::error::Error;
use paramcheck_core::input::read_raw_input;
use paramcheck_core::output::Output;
use paramcheck_core::run::{RunStatus, ScopedRun};

fn execute() -> RunStatus {
    let args = Args::parse();
    debug!("Flush mode: {:?}", args.flush_mode());

    // Credentials are loaded by the driver so that a bad file is reported
    // through the run's output.
    let output = Output::to_stdout(args.flush_mode());
    let context = ConnectorContext::from_env(Credentials::default());

    let raw = match read_raw_input(args.input.clone()) {
        Ok(raw) => raw,
        Err(e) => return ScopedRun::start("", output, context).fail(&Error::from(e), None),
    };

    let run = Arc::new(Mutex::new(ScopedRun::start(&raw, output, context)));

    if let Err(e) = interrupt::install(Arc::clone(&run)) {
        warn!("Could not install the Ctrl-C handler: {}", e);
    }

    driver::execute(&args, &run)
}

fn main() -> ExitCode {
    env_logger::init();

    execute().into()
}
