//! Database selection and connection.
//!
//! A [`DatabaseDescriptor`] names one backend and a credentials section.
//! [`connect`] resolves that section and opens a connection eagerly. Any
//! failure is a `DatabaseConnection` error, which a run treats as fatal.
//!
//! The drivers are async; each [`DatabaseConnection`] owns a current-thread
//! runtime and blocks on it, so callers see a synchronous API.

use std::fmt::{Debug, Formatter};

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tokio::runtime::{Builder, Runtime};

use crate::config::Credentials;
use crate::error::{Error, Result};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseDescriptor {
    #[serde(rename = "psql")]
    Postgres(String),
    #[serde(rename = "mysql")]
    MySql(String),
}

impl DatabaseDescriptor {
    /// Credentials section holding the connection details.
    #[must_use]
    pub fn section(&self) -> &str {
        match self {
            Self::Postgres(section) | Self::MySql(section) => section,
        }
    }

    /// The key this backend is selected with.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "psql",
            Self::MySql(_) => "mysql",
        }
    }

    /// Parses `{"psql": section}` or `{"mysql": section}`.
    ///
    /// # Errors
    ///
    /// `InvalidDatabaseDescriptor` unless exactly one known backend is named.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(|e| {
            Error::InvalidDatabaseDescriptor(format!(
                "expected exactly one of `psql` or `mysql` naming a credentials section ({e})"
            ))
        })
    }

    /// Builds a descriptor from the top-level `psql` / `mysql` keys of a
    /// sectioned schema.
    ///
    /// # Errors
    ///
    /// `InvalidDatabaseDescriptor` if both are given.
    pub fn from_legacy(psql: Option<String>, mysql: Option<String>) -> Result<Option<Self>> {
        match (psql, mysql) {
            (Some(_), Some(_)) => Err(Error::InvalidDatabaseDescriptor(
                "only one of `psql` or `mysql` may be named".to_string(),
            )),
            (Some(section), None) => Ok(Some(Self::Postgres(section))),
            (None, Some(section)) => Ok(Some(Self::MySql(section))),
            (None, None) => Ok(None),
        }
    }
}

/// Connection details resolved from one credentials section.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub port: u16,
}

impl Debug for DatabaseCredentials {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DatabaseCredentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("port", &self.port)
            .finish()
    }
}

impl DatabaseCredentials {
    /// Resolves `section` from the credentials store.
    ///
    /// # Errors
    ///
    /// `DatabaseConnection` if the section or one of its keys is missing, or
    /// the port is not an integer.
    pub fn resolve(credentials: &Credentials, section: &str) -> Result<Self> {
        let Some(values) = credentials.section(section) else {
            return Err(Error::database_connection(
                section,
                format!("no section named `{section}` was found in the credentials file"),
            ));
        };

        let lookup = |key: &str| {
            values.get(key).cloned().ok_or_else(|| {
                Error::database_connection(section, format!("the section has no `{key}` entry"))
            })
        };

        let port = lookup("port")?;
        let port = port.trim().parse::<u16>().map_err(|e| {
            Error::database_connection(section, format!("port `{port}` is not a valid integer: {e}"))
        })?;

        Ok(Self {
            host: lookup("host")?,
            user: lookup("user")?,
            password: lookup("password")?,
            database: lookup("database")?,
            port,
        })
    }
}

enum Backend {
    Postgres(PgConnection),
    MySql(MySqlConnection),
}

/// A live database connection.
pub struct DatabaseConnection {
    runtime: Runtime,
    backend: Backend,
    section: String,
}

impl Debug for DatabaseConnection {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DatabaseConnection")
            .field("backend", &self.backend_name())
            .field("section", &self.section)
            .finish_non_exhaustive()
    }
}

/// Opens the connection `descriptor` selects.
///
/// # Errors
///
/// `DatabaseConnection` if the credentials cannot be resolved or the server
/// refuses the connection. There is no retry.
pub fn connect(descriptor: &DatabaseDescriptor, credentials: &Credentials) -> Result<DatabaseConnection> {
    let section = descriptor.section();
    let resolved = DatabaseCredentials::resolve(credentials, section)?;

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::database_connection(section, e))?;

    let backend = match descriptor {
        DatabaseDescriptor::Postgres(_) => {
            let options = PgConnectOptions::new()
                .host(&resolved.host)
                .port(resolved.port)
                .username(&resolved.user)
                .password(&resolved.password)
                .database(&resolved.database);
            let connection = runtime
                .block_on(PgConnection::connect_with(&options))
                .map_err(|e| Error::database_connection(section, e))?;
            Backend::Postgres(connection)
        }
        DatabaseDescriptor::MySql(_) => {
            let options = MySqlConnectOptions::new()
                .host(&resolved.host)
                .port(resolved.port)
                .username(&resolved.user)
                .password(&resolved.password)
                .database(&resolved.database);
            let connection = runtime
                .block_on(MySqlConnection::connect_with(&options))
                .map_err(|e| Error::database_connection(section, e))?;
            Backend::MySql(connection)
        }
    };

    info!(
        "Connected to {} database `{}` at {}:{}",
        descriptor.backend(),
        resolved.database,
        resolved.host,
        resolved.port
    );

    Ok(DatabaseConnection {
        runtime,
        backend,
        section: section.to_string(),
    })
}

impl DatabaseConnection {
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Postgres(_) => "psql",
            Backend::MySql(_) => "mysql",
        }
    }

    /// Credentials section this connection was opened from.
    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Runs one or more SQL statements, returning the rows affected.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the statement fails.
    pub fn execute(&mut self, sql: &str) -> Result<u64> {
        let rows_affected = match &mut self.backend {
            Backend::Postgres(connection) => self
                .runtime
                .block_on(sqlx::raw_sql(sql).execute(connection))?
                .rows_affected(),
            Backend::MySql(connection) => self
                .runtime
                .block_on(sqlx::raw_sql(sql).execute(connection))?
                .rows_affected(),
        };

        Ok(rows_affected)
    }

    /// Closes the connection cleanly.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the goodbye handshake fails.
    pub fn close(self) -> Result<()> {
        let Self { runtime, backend, .. } = self;
        match backend {
            Backend::Postgres(connection) => runtime.block_on(connection.close())?,
            Backend::MySql(connection) => runtime.block_on(connection.close())?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Section;
    use serde_json::json;

    fn credentials_with(section: &str, entries: &[(&str, &str)]) -> Credentials {
        let mut credentials = Credentials::default();
        let values: Section = entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        credentials.insert_section(section, values);
        credentials
    }

    fn credentials_for_port(port: &str) -> Credentials {
        credentials_with(
            "primary",
            &[
                ("host", "localhost"),
                ("user", "reporter"),
                ("password", "secret"),
                ("database", "reports"),
                ("port", port),
            ],
        )
    }

    #[test]
    fn test_descriptor_parses_one_backend() {
        let descriptor = DatabaseDescriptor::from_value(&json!({"mysql": "primary"})).unwrap();
        assert_eq!(descriptor, DatabaseDescriptor::MySql("primary".to_string()));
        assert_eq!(descriptor.section(), "primary");
        assert_eq!(descriptor.backend(), "mysql");
    }

    #[test]
    fn test_descriptor_rejects_unknown_or_multiple_backends() {
        assert!(DatabaseDescriptor::from_value(&json!({"oracle": "x"})).is_err());
        assert!(DatabaseDescriptor::from_value(&json!({"psql": "a", "mysql": "b"})).is_err());
        assert!(DatabaseDescriptor::from_value(&json!("psql")).is_err());
    }

    #[test]
    fn test_legacy_keys() {
        assert_eq!(
            DatabaseDescriptor::from_legacy(Some("a".to_string()), None).unwrap(),
            Some(DatabaseDescriptor::Postgres("a".to_string()))
        );
        assert_eq!(DatabaseDescriptor::from_legacy(None, None).unwrap(), None);
        assert!(DatabaseDescriptor::from_legacy(Some("a".to_string()), Some("b".to_string())).is_err());
    }

    #[test]
    fn test_resolve_parses_port() {
        let resolved = DatabaseCredentials::resolve(&credentials_for_port(" 5432 "), "primary").unwrap();
        assert_eq!(resolved.port, 5432);
        assert_eq!(resolved.host, "localhost");
        assert!(!format!("{resolved:?}").contains("secret"));
    }

    #[test]
    fn test_resolve_rejects_bad_port() {
        let result = DatabaseCredentials::resolve(&credentials_for_port("fifty"), "primary");
        assert!(matches!(result, Err(Error::DatabaseConnection { .. })));
    }

    #[test]
    fn test_resolve_reports_missing_key() {
        let credentials = credentials_with("primary", &[("host", "localhost"), ("port", "3306")]);
        let error = DatabaseCredentials::resolve(&credentials, "primary").unwrap_err();
        assert!(error.to_string().contains("`user`"));
    }

    #[test]
    fn test_connect_without_section_fails_before_dialing() {
        let descriptor = DatabaseDescriptor::MySql("primary".to_string());
        let error = connect(&descriptor, &Credentials::default()).unwrap_err();

        assert!(error.is_connection_failure());
        assert!(error.to_string().contains("no section named `primary`"));
    }
}
