//! Command-line argument parsing.
//!
//! This module defines the command-line interface of the `paramcheck` binary
//! using the `clap` crate.

use clap::Parser;
use paramcheck_core::output::FlushMode;

/// Command-line arguments for the paramcheck CLI tool.
///
/// # Examples
///
/// ```rust
/// use clap::Parser;
/// use paramcheck_cli::cli_args::Args;
///
/// let args = Args::parse_from(["paramcheck", "--schema", "report.yml", r#"{"count": "42"}"#]);
/// assert_eq!(args.input.as_deref(), Some(r#"{"count": "42"}"#));
/// ```
#[derive(Parser, Debug)] // requires `derive` feature
#[command(term_width = 0)] // Just to make testing across clap features easier
pub struct Args {
    /// Path to the schema file (YAML or JSON) declaring the parameters.
    #[arg(long, short = 's')]
    pub schema: String,

    /// Path to the credentials file YAML.
    ///
    /// If not provided, `PARAMCHECK_CREDENTIALS` is used, then
    /// `~/.paramcheck/credentials.yml`.
    #[arg(long, short = 'c')]
    pub credentials_path: Option<String>,

    /// Emit every write as its own JSON line instead of one object at exit.
    ///
    /// Also enabled by setting `PARAMCHECK_UNBUFFERED`.
    #[arg(long, short = 'u', action)]
    pub unbuffered: bool,

    /// The raw JSON input. If not provided, stdin is read.
    #[arg(num_args(1))]
    pub input: Option<String>,
}

impl Args {
    /// The flag wins; otherwise the environment decides.
    #[must_use]
    pub fn flush_mode(&self) -> FlushMode {
        if self.unbuffered {
            FlushMode::Streaming
        } else {
            FlushMode::from_env()
        }
    }
}
