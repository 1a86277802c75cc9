//! The output accumulator.
//!
//! Every diagnostic and result a run produces goes through [`Output`]. Writes
//! are merged key by key into one JSON object which is emitted exactly once,
//! either on [`Output::flush`] or when the accumulator is dropped. In
//! streaming mode each write is emitted on its own line as it happens instead.

use std::env;
use std::io::{self, Write};

use log::{debug, error};
use serde_json::map::Entry;
use serde_json::{Map, Value};

use crate::config::UNBUFFERED_VAR;

/// Category for informational text and plain string writes
pub const STDOUT: &str = "stdout";
/// Category for errors and warnings
pub const STDERR: &str = "stderr";
/// Category holding the raw input of the run
pub const STDIN: &str = "stdin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Merge every write and emit a single object at flush
    #[default]
    Buffered,
    /// Emit each write immediately as a standalone JSON line
    Streaming,
}

impl FlushMode {
    /// Streaming when `PARAMCHECK_UNBUFFERED` is set to anything non-empty.
    pub fn from_env() -> Self {
        match env::var(UNBUFFERED_VAR) {
            Ok(value) if !value.is_empty() => Self::Streaming,
            _ => Self::Buffered,
        }
    }
}

pub struct Output<W: Write = io::Stdout> {
    result: Option<Map<String, Value>>,
    mode: FlushMode,
    writer: W,
}

impl Output<io::Stdout> {
    pub fn to_stdout(mode: FlushMode) -> Self {
        Self::new(io::stdout(), mode)
    }
}

impl<W: Write> Output<W> {
    pub fn new(writer: W, mode: FlushMode) -> Self {
        Self {
            result: Some(Map::new()),
            mode,
            writer,
        }
    }

    #[must_use]
    pub fn mode(&self) -> FlushMode {
        self.mode
    }

    /// Records the raw input under `stdin` without emitting anything.
    pub fn record_input(&mut self, raw: &str) {
        if let Some(result) = self.result.as_mut() {
            result.insert(STDIN.to_string(), Value::String(raw.to_string()));
        }
    }

    /// Plain text goes to `stdout`, newline terminated.
    pub fn write_str(&mut self, text: &str) {
        self.write(STDOUT, format!("{text}\n"));
    }

    pub fn stdout(&mut self, text: &str) {
        self.write(STDOUT, text);
    }

    pub fn stderr(&mut self, text: &str) {
        self.write(STDERR, text);
    }

    pub fn write(&mut self, key: &str, value: impl Into<Value>) {
        let mut object = Map::new();
        object.insert(key.to_string(), value.into());
        self.write_object(object);
    }

    /// Merges `object` into the result, key by key.
    ///
    /// Strings written to an existing string key are appended and arrays are
    /// extended; any other collision replaces the previous value.
    pub fn write_object(&mut self, object: Map<String, Value>) {
        let Some(result) = self.result.as_mut() else {
            debug!("Output already flushed, dropping write of {:?}", object.keys());
            return;
        };

        if self.mode == FlushMode::Streaming {
            if let Err(e) = emit(&mut self.writer, &object) {
                error!("Could not stream output: {}", e);
            }
        }

        for (key, value) in object {
            merge(result, key, value);
        }
    }

    /// Looks up what has been accumulated so far under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.result.as_ref().and_then(|result| result.get(key))
    }

    #[must_use]
    pub fn is_flushed(&self) -> bool {
        self.result.is_none()
    }

    /// Emits the accumulated object once. Later calls do nothing.
    ///
    /// In streaming mode every write has already been emitted, so this only
    /// closes the accumulator.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the underlying writer fails.
    pub fn flush(&mut self) -> io::Result<()> {
        let Some(result) = self.result.take() else {
            return Ok(());
        };

        if self.mode == FlushMode::Buffered {
            emit(&mut self.writer, &result)?;
        }

        self.writer.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: Write> Drop for Output<W> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("Could not flush output: {}", e);
        }
    }
}

fn emit<W: Write>(writer: &mut W, object: &Map<String, Value>) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, object)?;
    writeln!(writer)
}

fn merge(result: &mut Map<String, Value>, key: String, value: Value) {
    match result.entry(key) {
        Entry::Occupied(mut entry) => match (entry.get_mut(), value) {
            (Value::String(existing), Value::String(addition)) => existing.push_str(&addition),
            (Value::Array(existing), Value::Array(addition)) => existing.extend(addition),
            (existing, value) => *existing = value,
        },
        Entry::Vacant(entry) => {
            entry.insert(value);
        }
    }
}
