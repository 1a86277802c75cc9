//! Paramcheck Core Library
//!
//! This crate provides the parameter validation layer for script-style command
//! handlers. A handler declares the named parameters it accepts, and the
//! library reads a JSON object from stdin (or a single argument), validates
//! each field against its pattern, converts it to a typed value, optionally
//! connects to a database, and reports everything it did as one JSON object.
//!
//! # Key Features
//!
//! - **Schemas**: YAML or JSON field descriptors with type, pattern and help text
//! - **Precedence**: Supplied input wins over seeded defaults
//! - **Coercion Registry**: Numbers, dates, strings, booleans, string lists,
//!   file streams and object storage handles
//! - **Connections**: PostgreSQL and MySQL from named credentials sections
//! - **Output Accumulator**: One merged JSON result per run, or one line per
//!   write in streaming mode
//! - **Echo Runs**: Dry runs that report the resolved schema without coercing
//!
//! # Examples
//!
//! Resolving parameters inside a handler:
//!
//! ```no_run
//! use paramcheck_core::coercion::ConnectorContext;
//! use paramcheck_core::config::{get_credentials_path, Credentials};
//! use paramcheck_core::input::read_raw_input;
//! use paramcheck_core::output::{FlushMode, Output};
//! use paramcheck_core::run::{Resolution, ScopedRun};
//! use paramcheck_core::schema::{FieldDescriptor, Schema};
//!
//! let credentials = Credentials::load(&get_credentials_path(&None))?;
//! let mut schema = Schema::new()
//!     .with_field("count", FieldDescriptor::new("number::int").verify("^[0-9]+$"));
//!
//! let raw = read_raw_input(None)?;
//! let mut run = ScopedRun::start(
//!     &raw,
//!     Output::to_stdout(FlushMode::from_env()),
//!     ConnectorContext::from_env(credentials),
//! );
//!
//! if let Resolution::Ready(parameters) = run.resolve(&mut schema) {
//!     let count = parameters.get("count").and_then(|v| v.as_integer());
//!     run.output().write("doubled", count.map(|c| c * 2));
//!     run.finish();
//! }
//! # Ok::<(), paramcheck_core::error::Error>(())
//! ```

pub mod coercion;
pub mod config;
pub mod database;
pub mod error;
pub mod input;
pub mod output;
pub mod run;
pub mod schema;
pub mod storage;
pub mod validator;
