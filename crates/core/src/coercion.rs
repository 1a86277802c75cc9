//! The type coercion registry.
//!
//! Type tags have the form `category::primitive`. The category is a hint for
//! how a caller-facing form would render the field (`number`, `date`, `text`,
//! `file`); the pair selects one entry of a closed table of coercions.

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{self, BufReader};
use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::config::Credentials;
use crate::error::Error;
use crate::storage::{ObjectReader, ObjectWriter, ResourceConnector};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormCategory {
    Number,
    Date,
    Text,
    File,
}

impl FormCategory {
    fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Date => "date",
            Self::Text => "text",
            Self::File => "file",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coercion {
    Integer,
    Float,
    Date,
    String,
    StringTuple,
    Boolean,
    ReadableStream,
    WritableStream,
    ReadableObject,
    WritableObject,
}

const REGISTRY: &[(FormCategory, &str, Coercion)] = &[
    (FormCategory::Number, "int", Coercion::Integer),
    (FormCategory::Number, "float", Coercion::Float),
    (FormCategory::Date, "date", Coercion::Date),
    (FormCategory::Text, "str", Coercion::String),
    (FormCategory::Text, "unicode", Coercion::String),
    (FormCategory::Text, "tuple", Coercion::StringTuple),
    (FormCategory::Text, "bool", Coercion::Boolean),
    // named input, the file must exist
    (FormCategory::File, "buffer", Coercion::ReadableStream),
    // named output, created or truncated
    (FormCategory::Text, "buffer", Coercion::WritableStream),
    (FormCategory::File, "s3", Coercion::ReadableObject),
    (FormCategory::Text, "s3", Coercion::WritableObject),
];

fn known_tags() -> String {
    REGISTRY
        .iter()
        .map(|(category, primitive, _)| format!("`{}::{}`", category.as_str(), primitive))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown type `{}`, expected one of {}", .0, known_tags())]
pub struct UnknownTypeTag(pub String);

/// A parsed `category::primitive` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
    category: FormCategory,
    primitive: &'static str,
    coercion: Coercion,
}

impl TypeTag {
    #[must_use]
    pub fn category(&self) -> FormCategory {
        self.category
    }

    #[must_use]
    pub fn coercion(&self) -> Coercion {
        self.coercion
    }
}

impl FromStr for TypeTag {
    type Err = UnknownTypeTag;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let (category, primitive) = tag
            .split_once("::")
            .ok_or_else(|| UnknownTypeTag(tag.to_string()))?;

        REGISTRY
            .iter()
            .find(|(known_category, known_primitive, _)| {
                known_category.as_str() == category.trim() && *known_primitive == primitive.trim()
            })
            .map(|(category, primitive, coercion)| Self {
                category: *category,
                primitive: *primitive,
                coercion: *coercion,
            })
            .ok_or_else(|| UnknownTypeTag(tag.to_string()))
    }
}

impl Display for TypeTag {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}::{}", self.category.as_str(), self.primitive)
    }
}

#[derive(Debug)]
pub struct ReadStream {
    pub path: PathBuf,
    pub reader: BufReader<File>,
}

#[derive(Debug)]
pub struct WriteStream {
    pub path: PathBuf,
    pub writer: File,
}

/// A validated, converted parameter value.
#[derive(Debug)]
pub enum CoercedValue {
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    String(String),
    Strings(Vec<String>),
    Boolean(bool),
    ReadStream(ReadStream),
    WriteStream(WriteStream),
    ObjectReader(ObjectReader),
    ObjectWriter(ObjectWriter),
}

impl CoercedValue {
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Self::Strings(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// JSON summary of the value. Handles are described, not serialized.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(value) => Value::from(*value),
            Self::Float(value) => Value::from(*value),
            Self::Date(value) => Value::String(value.format(DATE_FORMAT).to_string()),
            Self::String(value) => Value::String(value.clone()),
            Self::Strings(values) => Value::from(values.clone()),
            Self::Boolean(value) => Value::Bool(*value),
            Self::ReadStream(stream) => Value::String(format!("file:{}", stream.path.display())),
            Self::WriteStream(stream) => Value::String(format!("file:{}", stream.path.display())),
            Self::ObjectReader(object) => Value::String(object.location.to_string()),
            Self::ObjectWriter(object) => Value::String(object.location.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum CoercionError {
    #[error("not an integer: {}", .0)]
    Integer(#[from] ParseIntError),

    #[error("not a number: {}", .0)]
    Float(#[from] ParseFloatError),

    #[error("not a YYYY-MM-DD date: {}", .0)]
    Date(#[from] chrono::ParseError),

    #[error("could not open `{}`: {}", .path, .original)]
    File { path: String, original: io::Error },

    #[error(transparent)]
    Connector(#[from] Error),
}

/// State the resource-opening coercions need: the credentials store and the
/// caller identity. The object storage connector is built on first use.
#[derive(Debug)]
pub struct ConnectorContext {
    credentials: Credentials,
    identity: String,
    objects: Option<ResourceConnector>,
}

impl ConnectorContext {
    pub fn new(credentials: Credentials, identity: &str) -> Self {
        Self {
            credentials,
            identity: identity.to_string(),
            objects: None,
        }
    }

    /// Identity from `USER`, see [`crate::config::identity_from_env`].
    pub fn from_env(credentials: Credentials) -> Self {
        Self::new(credentials, &crate::config::identity_from_env())
    }

    /// Uses `connector` instead of building one from the credentials.
    #[must_use]
    pub fn with_objects(mut self, connector: ResourceConnector) -> Self {
        self.objects = Some(connector);
        self
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
        self.objects = None;
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn objects(&mut self) -> crate::error::Result<&ResourceConnector> {
        let connector = match self.objects.take() {
            Some(connector) => connector,
            None => ResourceConnector::from_credentials(&self.credentials, &self.identity)?,
        };
        Ok(&*self.objects.insert(connector))
    }
}

/// Applies the coercion `tag` selects to `raw`.
///
/// # Errors
///
/// Numeric and date conversions fail on malformed text; stream and object
/// coercions fail when the target cannot be opened.
pub fn coerce(
    tag: &TypeTag,
    raw: &str,
    context: &mut ConnectorContext,
) -> Result<CoercedValue, CoercionError> {
    let value = match tag.coercion {
        Coercion::Integer => CoercedValue::Integer(raw.trim().parse()?),
        Coercion::Float => CoercedValue::Float(raw.trim().parse()?),
        Coercion::Date => CoercedValue::Date(NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)?),
        Coercion::String => CoercedValue::String(raw.to_string()),
        Coercion::StringTuple => {
            CoercedValue::Strings(raw.split(',').map(|part| part.trim().to_string()).collect())
        }
        Coercion::Boolean => CoercedValue::Boolean(raw.trim().eq_ignore_ascii_case("true")),
        Coercion::ReadableStream => {
            let file = File::open(raw).map_err(|original| CoercionError::File {
                path: raw.to_string(),
                original,
            })?;
            CoercedValue::ReadStream(ReadStream {
                path: PathBuf::from(raw),
                reader: BufReader::new(file),
            })
        }
        Coercion::WritableStream => {
            let writer = File::create(raw).map_err(|original| CoercionError::File {
                path: raw.to_string(),
                original,
            })?;
            CoercedValue::WriteStream(WriteStream {
                path: PathBuf::from(raw),
                writer,
            })
        }
        Coercion::ReadableObject => CoercedValue::ObjectReader(context.objects()?.readable(raw)?),
        Coercion::WritableObject => CoercedValue::ObjectWriter(context.objects()?.writable(raw)?),
    };

    Ok(value)
}
