//! One process run, from raw input to the flushed result object.
//!
//! A [`ScopedRun`] owns the output accumulator for the whole run. Every exit
//! path goes through it: a resolved run hands the parameters back to the
//! handler and flushes at [`ScopedRun::finish`], a fatal error is written to
//! `stderr` and flushed by [`ScopedRun::fail`], and a dropped run flushes
//! whatever was accumulated.

use std::io::{Stdout, Write};
use std::process::ExitCode;

use log::error;

use crate::coercion::ConnectorContext;
use crate::error::Error;
use crate::input::Input;
use crate::output::Output;
use crate::schema::Schema;
use crate::validator::{validate, Outcome, Parameters, SCHEMA_KEY};

/// Exit status of an interrupted run
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Message written to `stderr` when a run is interrupted
pub const INTERRUPTED_MESSAGE: &str = "Interrupted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failure,
    Interrupted,
}

impl From<RunStatus> for ExitCode {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Success => ExitCode::SUCCESS,
            RunStatus::Failure => ExitCode::FAILURE,
            RunStatus::Interrupted => ExitCode::from(INTERRUPTED_EXIT_CODE),
        }
    }
}

#[derive(Debug)]
pub enum Resolution {
    /// The handler should continue with these parameters.
    Ready(Parameters),
    /// The run is over and its output has been flushed.
    Finished(RunStatus),
}

pub struct ScopedRun<W: Write = Stdout> {
    input: Input,
    output: Output<W>,
    context: ConnectorContext,
}

impl<W: Write> ScopedRun<W> {
    /// Starts a run over `raw`, seeding the output with it under `stdin`.
    pub fn start(raw: &str, mut output: Output<W>, context: ConnectorContext) -> Self {
        output.record_input(raw);
        Self {
            input: Input::parse(raw),
            output,
            context,
        }
    }

    #[must_use]
    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn output(&mut self) -> &mut Output<W> {
        &mut self.output
    }

    pub fn context_mut(&mut self) -> &mut ConnectorContext {
        &mut self.context
    }

    /// Validates the input against `schema`.
    ///
    /// Echo runs and fatal errors finish the run here; only a successful
    /// resolution hands control back to the caller.
    pub fn resolve(&mut self, schema: &mut Schema) -> Resolution {
        match validate(schema, &self.input, &mut self.context, &mut self.output) {
            Ok(Outcome::Resolved(parameters)) => Resolution::Ready(parameters),
            Ok(Outcome::Echoed) => Resolution::Finished(self.finish()),
            Err(e) if e.is_connection_failure() => Resolution::Finished(self.fail(&e, None)),
            Err(e) => Resolution::Finished(self.fail(&e, Some(schema))),
        }
    }

    /// Records a fatal error, with the schema as it stood, and flushes.
    pub fn fail(&mut self, error: &Error, schema: Option<&Schema>) -> RunStatus {
        error!("{}", error);
        self.output.stderr(&error.to_string());

        if let Some(schema) = schema {
            match schema.to_value() {
                Ok(value) => self.output.write(SCHEMA_KEY, value),
                Err(e) => error!("Could not serialize schema: {}", e),
            }
        }

        self.flush();
        RunStatus::Failure
    }

    pub fn interrupt(&mut self) -> RunStatus {
        self.output.stderr(INTERRUPTED_MESSAGE);
        self.flush();
        RunStatus::Interrupted
    }

    /// Flushes the output of a run that completed normally.
    pub fn finish(&mut self) -> RunStatus {
        if self.flush() {
            RunStatus::Success
        } else {
            RunStatus::Failure
        }
    }

    fn flush(&mut self) -> bool {
        match self.output.flush() {
            Ok(()) => true,
            Err(e) => {
                error!("Could not flush output: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::output::FlushMode;
    use crate::schema::FieldDescriptor;
    use serde_json::{json, Value};

    fn start(raw: &str) -> ScopedRun<Vec<u8>> {
        ScopedRun::start(
            raw,
            Output::new(Vec::new(), FlushMode::Buffered),
            ConnectorContext::new(Credentials::default(), "tester"),
        )
    }

    fn emitted(run: &mut ScopedRun<Vec<u8>>) -> Value {
        let text = String::from_utf8(run.output().get_ref().clone()).unwrap();
        serde_json::from_str(text.trim_end()).unwrap()
    }

    #[test]
    fn test_missing_parameter_fails_with_schema() {
        let mut schema = Schema::new().with_field("count", FieldDescriptor::new("number::int"));
        let mut run = start("{}");

        let Resolution::Finished(status) = run.resolve(&mut schema) else {
            panic!("expected the run to finish");
        };
        assert_eq!(status, RunStatus::Failure);
        assert_eq!(
            emitted(&mut run),
            json!({
                "stdin": "{}",
                "stderr": "count is a required parameter.",
                "schema": {"count": {"type": "number::int", "required": true}},
            })
        );
    }

    #[test]
    fn test_connection_failure_omits_schema() {
        let mut schema = Schema::new();
        let mut run = start(r#"{"database": {"psql": "reports"}}"#);

        let Resolution::Finished(RunStatus::Failure) = run.resolve(&mut schema) else {
            panic!("expected a failed run");
        };
        let result = emitted(&mut run);
        assert!(result.get("schema").is_none());
        assert!(result["stderr"]
            .as_str()
            .unwrap()
            .starts_with("Unable to connect to the database `reports`"));
    }

    #[test]
    fn test_unreadable_input_still_emits_an_object() {
        let mut run = start("");
        let error = Error::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin closed"));

        assert_eq!(run.fail(&error, None), RunStatus::Failure);
        assert_eq!(
            emitted(&mut run),
            json!({"stdin": "", "stderr": "STDIO error: stdin closed"})
        );
    }

    #[test]
    fn test_interrupt_flushes_once() {
        let mut run = start("{}");
        assert_eq!(run.interrupt(), RunStatus::Interrupted);
        assert_eq!(run.finish(), RunStatus::Success);

        assert_eq!(emitted(&mut run), json!({"stdin": "{}", "stderr": "Interrupted"}));
    }

    #[test]
    fn test_resolved_run_leaves_output_open() {
        let mut schema = Schema::new().with_field("name", FieldDescriptor::new("text::str"));
        let mut run = start(r#"{"name": "ada"}"#);

        let Resolution::Ready(parameters) = run.resolve(&mut schema) else {
            panic!("expected parameters");
        };
        assert_eq!(parameters.get("name").and_then(|v| v.as_str()), Some("ada"));
        assert!(!run.output().is_flushed());
        assert_eq!(run.input().value("name"), Some("ada".to_string()));
    }
}
