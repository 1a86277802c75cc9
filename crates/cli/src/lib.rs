//! Paramcheck CLI Library
//!
//! This crate provides the `paramcheck` binary, a generic front end to the
//! validator for handlers that are not written in Rust. It loads a schema
//! file, reads the raw input, validates it, and prints one JSON object with
//! the diagnostics and the resolved `parameters`.
//!
//! # Architecture
//!
//! - [`cli_args`]: Command-line argument parsing
//! - [`driver`]: Loads configuration and drives one run
//! - [`interrupt`]: Ctrl-C handling that keeps the output well formed
//!
//! # Examples
//!
//! ```bash
//! # Input as an argument
//! paramcheck --schema report.yml '{"count": "42"}'
//!
//! # Input on stdin, one JSON line per write
//! echo '{"count": "42"}' | paramcheck -s report.yml --unbuffered
//!
//! # Dry run, prints the schema with the supplied values
//! paramcheck -s report.yml '{"echo": true, "count": "42"}'
//! ```

pub mod cli_args;
pub mod driver;
pub mod interrupt;
