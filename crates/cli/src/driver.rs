//! Runs one schema file against one input and reports the result.
//!
//! The run is shared with the Ctrl-C handler, so it is only locked while it
//! is being written to. Files are loaded and connections closed outside the
//! lock; an interruption at those points flushes everything gathered so far.

use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use itertools::Itertools;
use log::{debug, info, warn};
use paramcheck_core::config::{self, Credentials};
use paramcheck_core::error::Result;
use paramcheck_core::run::{Resolution, RunStatus, ScopedRun};
use paramcheck_core::schema::Schema;

use crate::cli_args::Args;

/// Output key the resolved values are written under
pub const PARAMETERS_KEY: &str = "parameters";

/// Load the credentials store and the schema named on the command line
pub fn initialize_config(args: &Args) -> Result<(Credentials, Schema)> {
    let credentials_path = config::get_credentials_path(&args.credentials_path);
    debug!("Credentials path: `{}`", credentials_path);
    let credentials = Credentials::load(&credentials_path)?;

    let schema_path = config::expand_path(&args.schema);
    debug!("Schema path: `{}`", schema_path);
    let schema = Schema::load(&schema_path)?;

    Ok((credentials, schema))
}

fn lock<W: Write>(run: &Mutex<ScopedRun<W>>) -> MutexGuard<'_, ScopedRun<W>> {
    run.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Validates the run's input against the schema in `args`.
///
/// The resolved values are written under `parameters`, and the run is
/// finished on every path, so the output has been flushed when this returns.
pub fn execute<W: Write>(args: &Args, run: &Mutex<ScopedRun<W>>) -> RunStatus {
    let loaded = initialize_config(args);

    let mut parameters = {
        let mut run = lock(run);
        let (credentials, mut schema) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => return run.fail(&e, None),
        };
        run.context_mut().set_credentials(credentials);

        let resolution = run.resolve(&mut schema);
        match resolution {
            Resolution::Ready(parameters) => parameters,
            Resolution::Finished(status) => return status,
        }
    };

    info!("Resolved parameters: {}", parameters.names().join(", "));
    lock(run).output().write(PARAMETERS_KEY, parameters.to_json());

    if let Some(connection) = parameters.take_database() {
        if let Err(e) = connection.close() {
            warn!("Could not close the database connection cleanly: {}", e);
        }
    }

    lock(run).finish()
}
