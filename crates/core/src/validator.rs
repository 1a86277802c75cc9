//! Merges the raw input with the schema and resolves every field.
//!
//! Fields are resolved in declaration order. For each one the supplied input
//! wins over a seeded `value`, the candidate is searched with the field's
//! `verify` pattern, and the match is handed to the coercion registry. A
//! required field that is missing or fails its pattern aborts the run; an
//! optional one that fails is discarded with a warning on `stderr`.

use std::io::Write;

use indexmap::IndexMap;
use log::{debug, info, warn};
use regex::Regex;
use serde_json::{Map, Value};

use crate::coercion::{coerce, CoercedValue, CoercionError, ConnectorContext, TypeTag};
use crate::database::{self, DatabaseConnection};
use crate::error::{Error, Result};
use crate::input::Input;
use crate::output::Output;
use crate::schema::Schema;

/// Output key the echoed schema is written under
pub const SCHEMA_KEY: &str = "schema";

#[derive(Debug)]
pub enum Outcome {
    /// Every field resolved; the handler continues with these.
    Resolved(Parameters),
    /// Dry run. The schema with the supplied values has been written to the
    /// output; nothing was coerced or opened.
    Echoed,
}

/// The resolved parameter object.
#[derive(Debug, Default)]
pub struct Parameters {
    values: IndexMap<String, CoercedValue>,
    database: Option<DatabaseConnection>,
}

impl Parameters {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CoercedValue> {
        self.values.get(name)
    }

    /// The value for `name`, or `default` if the field was not resolved.
    #[must_use]
    pub fn get_or<'a>(&'a self, name: &str, default: &'a CoercedValue) -> &'a CoercedValue {
        self.values.get(name).unwrap_or(default)
    }

    /// Moves a value out, e.g. to take ownership of a stream.
    pub fn take(&mut self, name: &str) -> Option<CoercedValue> {
        self.values.shift_remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn database(&mut self) -> Option<&mut DatabaseConnection> {
        self.database.as_mut()
    }

    pub fn take_database(&mut self) -> Option<DatabaseConnection> {
        self.database.take()
    }

    /// JSON summary of the resolved values, in declaration order.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let values: Map<String, Value> = self
            .values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        Value::Object(values)
    }
}

struct FieldPlan {
    name: String,
    tag: TypeTag,
    pattern: Option<Regex>,
    seeded: Option<String>,
    required: bool,
    info: String,
    help: String,
}

/// Checks every descriptor up front so a malformed schema fails before any
/// field is coerced. Seeded values are captured before the input is echoed
/// into the descriptors.
fn plan(schema: &Schema) -> Result<Vec<FieldPlan>> {
    schema
        .fields()
        .map(|(name, descriptor)| {
            Ok(FieldPlan {
                name: name.clone(),
                tag: descriptor.resolve_type(name)?,
                pattern: descriptor.compile_pattern(name)?,
                seeded: descriptor.seeded_value(),
                required: descriptor.required,
                info: descriptor.info.clone().unwrap_or_default(),
                help: descriptor.help.clone().unwrap_or_default(),
            })
        })
        .collect()
}

/// The first capture group if the pattern has one and it took part in the
/// match, otherwise the whole match.
fn first_match(pattern: &Regex, candidate: &str) -> Option<String> {
    let captures = pattern.captures(candidate)?;
    captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|matched| matched.as_str().to_string())
}

/// Resolves `schema` against `input`.
///
/// Diagnostics go to `output` as they happen. In echo mode the schema, with
/// the supplied values copied into it, is written under `schema` and nothing
/// is coerced or connected.
///
/// # Errors
///
/// `MalformedSchema`, `MissingRequiredParameter`, `ValidationFailed`,
/// `Coercion`, `InvalidDatabaseDescriptor`, or a connection failure from the
/// database or object storage connectors. Processing stops at the first one.
pub fn validate<W: Write>(
    schema: &mut Schema,
    input: &Input,
    context: &mut ConnectorContext,
    output: &mut Output<W>,
) -> Result<Outcome> {
    let plans = plan(schema)?;

    for key in input.keys() {
        if let Some(descriptor) = schema.field_mut(key) {
            descriptor.value = input.raw(key).cloned();
        }
    }

    let echo = input.echo();
    let mut values = IndexMap::new();

    for field in plans {
        let Some(candidate) = input.value(&field.name).or(field.seeded) else {
            if field.required {
                return Err(Error::MissingRequiredParameter(field.name));
            }
            debug!("Optional field `{}` was not supplied", field.name);
            continue;
        };

        output.write_str(&format!("Using '{}' for {}", candidate, field.name));

        let matched = match &field.pattern {
            None => candidate.clone(),
            Some(pattern) => match first_match(pattern, &candidate) {
                Some(matched) => matched,
                None if field.required => {
                    return Err(Error::ValidationFailed {
                        field: field.name,
                        value: candidate,
                        info: field.info,
                        pattern: pattern.as_str().to_string(),
                        help: field.help,
                    });
                }
                None => {
                    warn!("Discarding optional field `{}`", field.name);
                    output.stderr(&format!(
                        "Optional value {} will be discarded because it did not match required regex:\n{}\n{}\n",
                        candidate,
                        pattern.as_str(),
                        field.help
                    ));
                    continue;
                }
            },
        };

        if echo {
            continue;
        }

        let value = coerce(&field.tag, &matched, context).map_err(|e| match e {
            CoercionError::Connector(error) => error,
            other => Error::coercion(&field.name, field.tag, &matched, other),
        })?;
        values.insert(field.name, value);
    }

    if echo {
        info!("Echo requested, skipping coercion and connections");
        output.write(SCHEMA_KEY, schema.to_value()?);
        return Ok(Outcome::Echoed);
    }

    let selected = match input.database()? {
        Some(descriptor) => Some(descriptor),
        None => schema.database().cloned(),
    };

    let database = match selected {
        Some(descriptor) => {
            let connection = database::connect(&descriptor, context.credentials())?;
            output.write_str("Connection Established");
            Some(connection)
        }
        None => None,
    };

    Ok(Outcome::Resolved(Parameters { values, database }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::output::{FlushMode, STDERR, STDOUT};
    use crate::schema::FieldDescriptor;
    use serde_json::json;

    fn run(schema: &mut Schema, raw: &str) -> (Result<Outcome>, Output<Vec<u8>>) {
        let mut context = ConnectorContext::new(Credentials::default(), "tester");
        let mut output = Output::new(Vec::new(), FlushMode::Buffered);
        let result = validate(schema, &Input::parse(raw), &mut context, &mut output);
        (result, output)
    }

    fn resolved(result: Result<Outcome>) -> Parameters {
        match result {
            Ok(Outcome::Resolved(parameters)) => parameters,
            other => panic!("expected resolved parameters, got {other:?}"),
        }
    }

    #[test]
    fn test_first_match_prefers_capture_group() {
        let pattern = Regex::new(r"id=(\d+)").unwrap();
        assert_eq!(first_match(&pattern, "x id=17 y"), Some("17".to_string()));

        let pattern = Regex::new(r"\d+").unwrap();
        assert_eq!(first_match(&pattern, "a12b34"), Some("12".to_string()));

        let pattern = Regex::new(r"(x)?\d+").unwrap();
        assert_eq!(first_match(&pattern, "42"), Some("42".to_string()));

        assert_eq!(first_match(&pattern, "none"), None);
    }

    #[test]
    fn test_seeded_value_is_used_when_input_is_absent() {
        let mut schema = Schema::new().with_field("limit", FieldDescriptor::new("number::int").value(10));
        let (result, output) = run(&mut schema, "{}");

        let parameters = resolved(result);
        assert_eq!(parameters.get("limit").and_then(CoercedValue::as_integer), Some(10));
        assert_eq!(output.get(STDOUT), Some(&json!("Using '10' for limit\n")));
    }

    #[test]
    fn test_input_wins_over_seeded_value() {
        let mut schema = Schema::new().with_field("limit", FieldDescriptor::new("number::int").value(10));
        let (result, _) = run(&mut schema, r#"{"limit": "25"}"#);

        assert_eq!(resolved(result).get("limit").and_then(CoercedValue::as_integer), Some(25));
        assert_eq!(schema.field("limit").unwrap().value, Some(json!("25")));
    }

    #[test]
    fn test_seeded_value_is_validated() {
        let mut schema = Schema::new().with_field(
            "code",
            FieldDescriptor::new("text::str").verify("^[A-Z]+$").value("abc"),
        );
        let (result, _) = run(&mut schema, "{}");
        assert!(matches!(result, Err(Error::ValidationFailed { .. })));
    }

    #[test]
    fn test_malformed_field_fails_before_anything_is_announced() {
        let mut schema = Schema::new()
            .with_field("first", FieldDescriptor::new("text::str"))
            .with_field("second", FieldDescriptor::new("text::nope"));
        let (result, output) = run(&mut schema, r#"{"first": "a", "second": "b"}"#);

        assert!(matches!(result, Err(Error::MalformedSchema { ref field, .. }) if field == "second"));
        assert_eq!(output.get(STDOUT), None);
    }

    #[test]
    fn test_bad_coercion_names_field_and_tag() {
        let mut schema = Schema::new().with_field("when", FieldDescriptor::new("date::date"));
        let (result, _) = run(&mut schema, r#"{"when": "tomorrow"}"#);

        let Err(Error::Coercion { field, tag, value, .. }) = result else {
            panic!("expected a coercion error");
        };
        assert_eq!(field, "when");
        assert_eq!(tag, "date::date");
        assert_eq!(value, "tomorrow");
    }

    #[test]
    fn test_optional_warning_text() {
        let mut schema = Schema::new().with_field(
            "limit",
            FieldDescriptor::new("number::int")
                .verify("^[0-9]+$")
                .help("a whole number")
                .optional(),
        );
        let (result, output) = run(&mut schema, r#"{"limit": "ten"}"#);

        assert!(resolved(result).is_empty());
        assert_eq!(
            output.get(STDERR),
            Some(&json!(
                "Optional value ten will be discarded because it did not match required regex:\n^[0-9]+$\na whole number\n"
            ))
        );
    }

    #[test]
    fn test_input_database_overrides_schema() {
        let mut schema = Schema::new().with_database(crate::database::DatabaseDescriptor::Postgres(
            "reports".to_string(),
        ));
        let (result, _) = run(&mut schema, r#"{"database": {"mysql": "primary"}}"#);

        let Err(Error::DatabaseConnection { section, .. }) = result else {
            panic!("expected a connection failure");
        };
        assert_eq!(section, "primary");
    }

    #[test]
    fn test_to_json_keeps_declaration_order() {
        let mut schema = Schema::new()
            .with_field("b", FieldDescriptor::new("text::tuple"))
            .with_field("a", FieldDescriptor::new("text::bool"));
        let (result, _) = run(&mut schema, r#"{"a": "True", "b": "x, y"}"#);

        let summary = resolved(result).to_json();
        assert_eq!(serde_json::to_string(&summary).unwrap(), r#"{"b":["x","y"],"a":true}"#);
    }

    #[test]
    fn test_get_or_and_take() {
        let mut schema = Schema::new()
            .with_field("name", FieldDescriptor::new("text::str"))
            .with_field("nick", FieldDescriptor::new("text::str").optional());
        let (result, _) = run(&mut schema, r#"{"name": "ada"}"#);
        let mut parameters = resolved(result);

        let fallback = CoercedValue::String("none".to_string());
        assert_eq!(parameters.get_or("nick", &fallback).as_str(), Some("none"));
        assert!(parameters.contains("name"));

        let taken = parameters.take("name").unwrap();
        assert_eq!(taken.as_str(), Some("ada"));
        assert!(!parameters.contains("name"));
        assert!(parameters.database().is_none());
    }
}
