//! The declared parameter schema.
//!
//! A schema maps field names to [`FieldDescriptor`]s, in declaration order.
//! Two layouts are accepted: a uniform mapping where each descriptor carries
//! its own `required` flag (default `true`), and the sectioned layout with
//! separate `required` and `optional` containers plus top-level `psql` /
//! `mysql` keys. Both normalize to the same [`Schema`], which remembers its
//! layout so that echoing it back reproduces the shape the caller wrote.

use std::fs::File;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coercion::TypeTag;
use crate::database::DatabaseDescriptor;
use crate::error::{Error, Result};
use crate::input::scalar_text;

const REQUIRED_SECTION: &str = "required";
const OPTIONAL_SECTION: &str = "optional";
const DATABASE_KEY: &str = "database";
const SECTIONED_KEYS: [&str; 4] = [REQUIRED_SECTION, OPTIONAL_SECTION, "psql", "mysql"];

fn default_required() -> bool {
    true
}

/// Description of one named parameter.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Coercion registry tag, e.g. `number::int`. Mandatory.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Seeded default; overwritten with the supplied input during validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default = "default_required")]
    pub required: bool,
}

impl FieldDescriptor {
    pub fn new(type_tag: &str) -> Self {
        Self {
            type_tag: Some(type_tag.to_string()),
            verify: None,
            info: None,
            help: None,
            value: None,
            required: true,
        }
    }

    #[must_use]
    pub fn verify(mut self, pattern: &str) -> Self {
        self.verify = Some(pattern.to_string());
        self
    }

    #[must_use]
    pub fn info(mut self, info: &str) -> Self {
        self.info = Some(info.to_string());
        self
    }

    #[must_use]
    pub fn help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    #[must_use]
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Resolves the `type` tag against the coercion registry.
    ///
    /// # Errors
    ///
    /// `MalformedSchema` naming `name` if the tag is absent or unknown.
    pub fn resolve_type(&self, name: &str) -> Result<TypeTag> {
        let Some(type_tag) = &self.type_tag else {
            return Err(Error::malformed_schema(name, "no `type` was declared"));
        };

        type_tag
            .parse::<TypeTag>()
            .map_err(|e| Error::malformed_schema(name, e))
    }

    /// Compiles the `verify` pattern, if one is declared.
    ///
    /// # Errors
    ///
    /// `MalformedSchema` naming `name` if the pattern does not compile.
    pub fn compile_pattern(&self, name: &str) -> Result<Option<Regex>> {
        self.verify
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::malformed_schema(name, e))
    }

    /// The seeded default as text, if it is a non-empty scalar.
    #[must_use]
    pub fn seeded_value(&self) -> Option<String> {
        self.value.as_ref().and_then(scalar_text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaLayout {
    #[default]
    Uniform,
    Sectioned,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: IndexMap<String, FieldDescriptor>,
    database: Option<DatabaseDescriptor>,
    layout: SchemaLayout,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name.to_string(), descriptor);
        self
    }

    #[must_use]
    pub fn with_database(mut self, descriptor: DatabaseDescriptor) -> Self {
        self.database = Some(descriptor);
        self
    }

    /// Loads a schema from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not YAML/JSON, or
    /// describes a malformed schema.
    pub fn load(path: &str) -> Result<Self> {
        let reader = File::open(path)
            .map_err(|e| Error::io_error("schema".to_string(), path.to_string(), e))?;

        let value: Value = serde_yaml::from_reader(reader).map_err(|e| {
            Error::yaml_error(
                "reading".to_string(),
                "schema".to_string(),
                path.to_string(),
                e,
            )
        })?;

        Self::from_value(value)
    }

    /// Builds a schema from a decoded document in either layout.
    ///
    /// # Errors
    ///
    /// `MalformedSchema` if a descriptor is not a mapping, and
    /// `InvalidDatabaseDescriptor` if the database selection is invalid.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(object) if is_sectioned(&object) => Self::from_sections(object),
            Value::Object(object) => Self::from_uniform(object),
            other => Err(Error::malformed_schema(
                "<schema>",
                format!("expected a mapping of field names to descriptors, found `{other}`"),
            )),
        }
    }

    fn from_uniform(object: Map<String, Value>) -> Result<Self> {
        let mut schema = Self::default();

        for (name, value) in object {
            if name == DATABASE_KEY {
                schema.database = Some(DatabaseDescriptor::from_value(&value)?);
                continue;
            }

            let descriptor: FieldDescriptor =
                serde_json::from_value(value).map_err(|e| Error::malformed_schema(&name, e))?;
            schema.fields.insert(name, descriptor);
        }

        Ok(schema)
    }

    fn from_sections(mut object: Map<String, Value>) -> Result<Self> {
        let mut schema = Self {
            layout: SchemaLayout::Sectioned,
            ..Self::default()
        };

        for (section, required) in [(REQUIRED_SECTION, true), (OPTIONAL_SECTION, false)] {
            let Some(Value::Object(fields)) = object.remove(section) else {
                continue;
            };

            for (name, value) in fields {
                let mut descriptor: FieldDescriptor =
                    serde_json::from_value(value).map_err(|e| Error::malformed_schema(&name, e))?;
                descriptor.required = required;
                schema.fields.insert(name, descriptor);
            }
        }

        let psql = object.get("psql").and_then(scalar_text);
        let mysql = object.get("mysql").and_then(scalar_text);
        schema.database = DatabaseDescriptor::from_legacy(psql, mysql)?;

        Ok(schema)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldDescriptor)> {
        self.fields.iter()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldDescriptor> {
        self.fields.get_mut(name)
    }

    #[must_use]
    pub fn database(&self) -> Option<&DatabaseDescriptor> {
        self.database.as_ref()
    }

    #[must_use]
    pub fn layout(&self) -> SchemaLayout {
        self.layout
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serializes the schema, with any echoed values, in its original layout.
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor cannot be serialized.
    pub fn to_value(&self) -> Result<Value> {
        let mut object = Map::new();

        match self.layout {
            SchemaLayout::Uniform => {
                for (name, descriptor) in &self.fields {
                    object.insert(name.clone(), serde_json::to_value(descriptor)?);
                }
                if let Some(database) = &self.database {
                    object.insert(DATABASE_KEY.to_string(), serde_json::to_value(database)?);
                }
            }
            SchemaLayout::Sectioned => {
                let mut required = Map::new();
                let mut optional = Map::new();
                for (name, descriptor) in &self.fields {
                    let mut value = serde_json::to_value(descriptor)?;
                    if let Value::Object(fields) = &mut value {
                        fields.remove(REQUIRED_SECTION);
                    }
                    let section = if descriptor.required {
                        &mut required
                    } else {
                        &mut optional
                    };
                    section.insert(name.clone(), value);
                }
                object.insert(REQUIRED_SECTION.to_string(), Value::Object(required));
                object.insert(OPTIONAL_SECTION.to_string(), Value::Object(optional));
                if let Some(database) = &self.database {
                    object.insert(
                        database.backend().to_string(),
                        Value::String(database.section().to_string()),
                    );
                }
            }
        }

        Ok(Value::Object(object))
    }
}

/// The sectioned layout only has section keys, and its sections hold
/// mappings of descriptors rather than descriptor attributes.
fn is_sectioned(object: &Map<String, Value>) -> bool {
    let has_section = object.contains_key(REQUIRED_SECTION) || object.contains_key(OPTIONAL_SECTION);
    let only_section_keys = object.keys().all(|key| SECTIONED_KEYS.contains(&key.as_str()));
    let sections_hold_descriptors = [REQUIRED_SECTION, OPTIONAL_SECTION]
        .iter()
        .filter_map(|section| object.get(*section))
        .all(|section| match section {
            Value::Object(fields) => fields.values().all(Value::is_object),
            _ => false,
        });

    has_section && only_section_keys && sections_hold_descriptors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uniform_layout_defaults_to_required() {
        let schema = Schema::from_value(json!({
            "count": {"type": "number::int", "verify": "^[0-9]+$"},
            "label": {"type": "text::str", "required": false},
        }))
        .unwrap();

        assert_eq!(schema.layout(), SchemaLayout::Uniform);
        assert!(schema.field("count").unwrap().required);
        assert!(!schema.field("label").unwrap().required);
        let names: Vec<&String> = schema.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["count", "label"]);
    }

    #[test]
    fn test_sectioned_layout_sets_required_flags() {
        let schema = Schema::from_value(json!({
            "required": {"name": {"type": "text::str"}},
            "optional": {"limit": {"type": "number::int"}},
            "psql": "warehouse",
        }))
        .unwrap();

        assert_eq!(schema.layout(), SchemaLayout::Sectioned);
        assert!(schema.field("name").unwrap().required);
        assert!(!schema.field("limit").unwrap().required);
        assert_eq!(
            schema.database(),
            Some(&DatabaseDescriptor::Postgres("warehouse".to_string()))
        );
    }

    #[test]
    fn test_field_named_required_is_not_a_section() {
        let schema = Schema::from_value(json!({
            "required": {"type": "text::bool"},
        }))
        .unwrap();

        assert_eq!(schema.layout(), SchemaLayout::Uniform);
        assert!(schema.field("required").is_some());
    }

    #[test]
    fn test_uniform_database_entry() {
        let schema = Schema::from_value(json!({
            "database": {"mysql": "primary"},
        }))
        .unwrap();

        assert!(schema.is_empty());
        assert_eq!(
            schema.database(),
            Some(&DatabaseDescriptor::MySql("primary".to_string()))
        );
    }

    #[test]
    fn test_missing_type_names_the_field() {
        let schema = Schema::from_value(json!({"count": {"verify": "^[0-9]+$"}})).unwrap();
        let result = schema.field("count").unwrap().resolve_type("count");
        assert!(matches!(result, Err(Error::MalformedSchema { ref field, .. }) if field == "count"));
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        let descriptor = FieldDescriptor::new("number::complex");
        let result = descriptor.resolve_type("ratio");
        assert!(matches!(result, Err(Error::MalformedSchema { .. })));
    }

    #[test]
    fn test_bad_pattern_is_malformed() {
        let descriptor = FieldDescriptor::new("text::str").verify("([a-z");
        let result = descriptor.compile_pattern("name");
        assert!(matches!(result, Err(Error::MalformedSchema { ref field, .. }) if field == "name"));
    }

    #[test]
    fn test_descriptor_must_be_a_mapping() {
        let result = Schema::from_value(json!({"count": "number::int"}));
        assert!(matches!(result, Err(Error::MalformedSchema { ref field, .. }) if field == "count"));
    }

    #[test]
    fn test_sectioned_echo_keeps_layout() {
        let mut schema = Schema::from_value(json!({
            "required": {"name": {"type": "text::str"}},
            "mysql": "primary",
        }))
        .unwrap();
        schema.field_mut("name").unwrap().value = Some(json!("ada"));

        let echoed = schema.to_value().unwrap();
        assert_eq!(
            echoed,
            json!({
                "required": {"name": {"type": "text::str", "value": "ada"}},
                "optional": {},
                "mysql": "primary",
            })
        );
    }

    #[test]
    fn test_uniform_echo_round_trips_through_from_value() {
        let schema = Schema::new()
            .with_field("when", FieldDescriptor::new("date::date").info("a date").optional())
            .with_database(DatabaseDescriptor::Postgres("reports".to_string()));

        let reparsed = Schema::from_value(schema.to_value().unwrap()).unwrap();
        assert_eq!(reparsed, schema);
    }
}
