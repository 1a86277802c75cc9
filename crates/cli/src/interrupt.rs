//! Ctrl-C handling.
//!
//! The handler flushes the run's output if nothing else holds it. While the
//! main thread is inside the run, a minimal `{"stderr": "Interrupted"}`
//! object is written instead so the caller still receives valid JSON.

use std::io::{self, Write};
use std::process;
use std::sync::{Arc, Mutex, TryLockError};

use log::{error, info};
use paramcheck_core::output::STDERR;
use paramcheck_core::run::{RunStatus, ScopedRun, INTERRUPTED_EXIT_CODE, INTERRUPTED_MESSAGE};
use serde_json::json;

/// Interrupts `run`, or writes the fallback object to `fallback` if the run
/// is busy.
pub fn interrupt<W: Write, F: Write>(run: &Mutex<ScopedRun<W>>, fallback: &mut F) -> RunStatus {
    match run.try_lock() {
        Ok(mut run) => run.interrupt(),
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().interrupt(),
        Err(TryLockError::WouldBlock) => {
            let object = json!({ STDERR: INTERRUPTED_MESSAGE });
            if let Err(e) = writeln!(fallback, "{object}").and_then(|()| fallback.flush()) {
                error!("Could not write interruption notice: {}", e);
            }
            RunStatus::Interrupted
        }
    }
}

/// Installs the process-wide Ctrl-C handler for `run`.
///
/// # Errors
///
/// Returns an error if a handler is already installed or the signal cannot
/// be hooked.
pub fn install<W: Write + Send + 'static>(run: Arc<Mutex<ScopedRun<W>>>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, flushing output");
        interrupt(&*run, &mut io::stdout());
        process::exit(i32::from(INTERRUPTED_EXIT_CODE));
    })
}
