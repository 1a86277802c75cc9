//! Reading and decoding the raw input of a run.

use std::io::{self, IsTerminal, Read};

use log::debug;
use serde_json::{Map, Value};

use crate::database::DatabaseDescriptor;
use crate::error::Result;
use crate::output::STDIN;

/// Input key that turns the run into a dry run
pub const ECHO_KEY: &str = "echo";
/// Input key selecting a database, `{"psql": section}` or `{"mysql": section}`
pub const DATABASE_KEY: &str = "database";

const EMPTY_INPUT: &str = "{}";

/// Reads the raw input for a run.
///
/// A command-line argument wins. Otherwise stdin is read, unless it is an
/// interactive terminal, in which case the input is `{}` rather than
/// blocking on a prompt. Piped-but-empty stdin is also `{}`. Bytes that are
/// not UTF-8 are replaced with U+FFFD.
///
/// # Errors
///
/// Returns an error if stdin cannot be read.
pub fn read_raw_input(argument: Option<String>) -> io::Result<String> {
    if let Some(argument) = argument {
        return Ok(argument);
    }

    let stdin = io::stdin();
    let is_terminal = stdin.is_terminal();
    read_from(stdin.lock(), is_terminal)
}

fn read_from<R: Read>(mut reader: R, is_terminal: bool) -> io::Result<String> {
    if is_terminal {
        debug!("stdin is a terminal, using empty input");
        return Ok(EMPTY_INPUT.to_string());
    }

    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let raw = String::from_utf8_lossy(&bytes).into_owned();

    if raw.trim().is_empty() {
        debug!("stdin was empty, using empty input");
        return Ok(EMPTY_INPUT.to_string());
    }

    Ok(raw)
}

/// A decoded input object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Input {
    values: Map<String, Value>,
}

impl Input {
    /// Decodes `raw` as a JSON object.
    ///
    /// Anything that is not a JSON object becomes `{"stdin": raw}`, so a
    /// handler with a single `stdin` field can take its value unquoted.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(values)) => Self { values },
            Ok(_) | Err(_) => {
                debug!("Input is not a JSON object, treating it as `{}`", STDIN);
                let mut values = Map::new();
                values.insert(STDIN.to_string(), Value::String(raw.to_string()));
                Self { values }
            }
        }
    }

    /// The supplied value for `name` as text; empty strings count as absent.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<String> {
        self.values.get(name).and_then(scalar_text)
    }

    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Whether the dry-run flag is set.
    ///
    /// `true`, any non-zero number, and any string other than `""`, `"0"` or
    /// `"false"` (in any case) turn it on.
    #[must_use]
    pub fn echo(&self) -> bool {
        match self.values.get(ECHO_KEY) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(text)) => {
                let text = text.trim();
                !(text.is_empty() || text == "0" || text.eq_ignore_ascii_case("false"))
            }
            _ => false,
        }
    }

    /// The database selected by the caller, if any.
    ///
    /// # Errors
    ///
    /// `InvalidDatabaseDescriptor` if the `database` key is present but does
    /// not name exactly one backend.
    pub fn database(&self) -> Result<Option<DatabaseDescriptor>> {
        match self.values.get(DATABASE_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => DatabaseDescriptor::from_value(value).map(Some),
        }
    }
}

/// Scalar JSON as text. Empty strings, null, arrays and objects give `None`.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_stdin_is_not_read() {
        let raw = read_from(io::repeat(b'x').take(u64::MAX), true).unwrap();
        assert_eq!(raw, "{}");
    }

    #[test]
    fn test_empty_pipe_is_empty_object() {
        let raw = read_from("  \n".as_bytes(), false).unwrap();
        assert_eq!(raw, "{}");
    }

    #[test]
    fn test_piped_input_is_read() {
        let raw = read_from(r#"{"a": "b"}"#.as_bytes(), false).unwrap();
        assert_eq!(raw, r#"{"a": "b"}"#);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let raw = read_from(&[0x7b, 0xff, 0x7d][..], false).unwrap();
        assert_eq!(raw, "{\u{fffd}}");

        let input = Input::parse(&raw);
        assert_eq!(input.value("stdin"), Some(raw.clone()));
    }

    #[test]
    fn test_argument_wins() {
        let raw = read_raw_input(Some("{\"x\": 1}".to_string())).unwrap();
        assert_eq!(raw, "{\"x\": 1}");
    }

    #[test]
    fn test_non_json_falls_back_to_stdin_field() {
        let input = Input::parse("just some text");
        assert_eq!(input.value("stdin"), Some("just some text".to_string()));
    }

    #[test]
    fn test_non_object_json_falls_back_to_stdin_field() {
        let input = Input::parse("42");
        assert_eq!(input.value("stdin"), Some("42".to_string()));
        assert!(input.raw("42").is_none());
    }

    #[test]
    fn test_scalars_are_stringified_and_empty_is_absent() {
        let input = Input::parse(r#"{"n": 7, "flag": true, "blank": "", "none": null}"#);
        assert_eq!(input.value("n"), Some("7".to_string()));
        assert_eq!(input.value("flag"), Some("true".to_string()));
        assert_eq!(input.value("blank"), None);
        assert_eq!(input.value("none"), None);
    }

    #[test]
    fn test_echo_truthiness() {
        assert!(Input::parse(r#"{"echo": true}"#).echo());
        assert!(Input::parse(r#"{"echo": 1}"#).echo());
        assert!(Input::parse(r#"{"echo": "yes"}"#).echo());
        assert!(!Input::parse(r#"{"echo": false}"#).echo());
        assert!(!Input::parse(r#"{"echo": "False"}"#).echo());
        assert!(!Input::parse(r#"{"echo": "0"}"#).echo());
        assert!(!Input::parse(r#"{"echo": null}"#).echo());
        assert!(!Input::parse("{}").echo());
    }

    #[test]
    fn test_database_selection() {
        let input = Input::parse(r#"{"database": {"psql": "reports"}}"#);
        assert_eq!(
            input.database().unwrap(),
            Some(DatabaseDescriptor::Postgres("reports".to_string()))
        );
        assert_eq!(Input::parse("{}").database().unwrap(), None);

        let both = Input::parse(&json!({"database": {"psql": "a", "mysql": "b"}}).to_string());
        assert!(both.database().is_err());
    }
}
