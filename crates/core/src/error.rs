use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed schema for field `{}`: {}", .field, .reason)]
    MalformedSchema { field: String, reason: String },

    #[error("{} is a required parameter.", .0)]
    MissingRequiredParameter(String),

    #[error(
        "{} did not appear to be {}\nRegex Failed To Match:\n{}\n{}\n",
        .value, .info, .pattern, .help
    )]
    ValidationFailed {
        field: String,
        value: String,
        info: String,
        pattern: String,
        help: String,
    },

    #[error("Could not convert `{}` to `{}` for {}: {}", .value, .tag, .field, .reason)]
    Coercion {
        field: String,
        tag: String,
        value: String,
        reason: String,
    },

    #[error("Invalid database descriptor: {}", .0)]
    InvalidDatabaseDescriptor(String),

    #[error("Unable to connect to the database `{}`: {}", .section, .reason)]
    DatabaseConnection { section: String, reason: String },

    #[error("Database error: {}", .0)]
    Database(#[from] sqlx::Error),

    #[error("Object storage error at `{}`: {}", .path, .reason)]
    ObjectStorage { path: String, reason: String },

    #[error("Error {} {} file at `{}`: {}", .action, .file_description, .path, .original)]
    Yaml {
        action: String,
        file_description: String,
        path: String,
        original: serde_yaml::Error,
    },

    #[error("IO error with {} file at path `{}`: {}", .file_description, .path, .original)]
    Io {
        file_description: String,
        path: String,
        original: std::io::Error,
    },

    #[error("JSON error: {}", .0)]
    Json(#[from] serde_json::Error),

    #[error("STDIO error: {}", .0)]
    Stdio(#[from] std::io::Error),
}

impl Error {
    pub fn malformed_schema(field: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::MalformedSchema {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    pub fn coercion(
        field: impl Into<String>,
        tag: impl std::fmt::Display,
        value: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Coercion {
            field: field.into(),
            tag: tag.to_string(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    pub fn database_connection(section: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::DatabaseConnection {
            section: section.into(),
            reason: reason.to_string(),
        }
    }

    pub fn object_storage(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ObjectStorage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn yaml_error(
        action: String,
        file_description: String,
        path: String,
        original: serde_yaml::Error,
    ) -> Self {
        Self::Yaml {
            action,
            file_description,
            path,
            original,
        }
    }

    pub fn io_error(file_description: String, path: String, original: std::io::Error) -> Self {
        Self::Io {
            file_description,
            path,
            original,
        }
    }

    /// True for failures to reach a database or object store.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::DatabaseConnection { .. } | Self::Database(_) | Self::ObjectStorage { .. }
        )
    }
}
