//! Credentials store and environment settings for paramcheck.
//!
//! Credentials are read once, at startup, from a YAML file of named sections
//! and handed to the connectors as an immutable value.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::error::{Error, Result};

/// Default path for the credentials file
const DEFAULT_CREDENTIALS_PATH: &str = "~/.paramcheck/credentials.yml";

/// Overrides the credentials path when no path is given on the command line
pub const CREDENTIALS_PATH_VAR: &str = "PARAMCHECK_CREDENTIALS";

/// Any non-empty value switches the output accumulator to streaming mode
pub const UNBUFFERED_VAR: &str = "PARAMCHECK_UNBUFFERED";

/// Identity used to scope object storage destinations
pub const IDENTITY_VAR: &str = "USER";

/// Identity used when `USER` is not set
pub const DEFAULT_IDENTITY: &str = "undefined";

/// Resolves the credentials file path.
///
/// An explicit path wins, then `PARAMCHECK_CREDENTIALS`, then the default.
/// Shell expansions like `~` are resolved.
///
/// # Examples
///
/// ```
/// use paramcheck_core::config::get_credentials_path;
///
/// let custom_path = get_credentials_path(&Some("/etc/paramcheck.yml".to_string()));
/// assert_eq!(custom_path, "/etc/paramcheck.yml");
/// ```
pub fn get_credentials_path(credentials_path_arg: &Option<String>) -> String {
    resolve_credentials_path(credentials_path_arg, env::var(CREDENTIALS_PATH_VAR).ok())
}

fn resolve_credentials_path(arg: &Option<String>, from_env: Option<String>) -> String {
    let credentials_path = match (arg, from_env) {
        (Some(path), _) => path.clone(),
        (None, Some(path)) if !path.is_empty() => path,
        _ => DEFAULT_CREDENTIALS_PATH.to_string(),
    };

    shellexpand::tilde(&credentials_path).to_string()
}

/// Expands `~` in a user supplied path.
pub fn expand_path(path: &str) -> String {
    shellexpand::tilde(path).to_string()
}

/// Identity of the caller, from `USER`, falling back to `undefined`.
pub fn identity_from_env() -> String {
    match env::var(IDENTITY_VAR) {
        Ok(identity) if !identity.is_empty() => identity,
        _ => DEFAULT_IDENTITY.to_string(),
    }
}

/// A named key/value section of the credentials store.
pub type Section = HashMap<String, String>;

/// Section name → key → value, read from the credentials file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    sections: HashMap<String, Section>,
}

impl Credentials {
    /// Loads the credentials file at `path`.
    ///
    /// A file that does not exist yields an empty store, so handlers that
    /// never touch a database or object store run without one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a
    /// mapping of sections.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::exists(Path::new(path)) {
            debug!("No credentials file at `{}`, continuing without one", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| Error::io_error("credentials".to_string(), path.to_string(), e))?;

        Self::from_yaml_str(&contents).map_err(|e| {
            Error::yaml_error(
                "reading".to_string(),
                "credentials".to_string(),
                path.to_string(),
                e,
            )
        })
    }

    /// Parses credentials from YAML text. Section names are lowercased.
    ///
    /// # Errors
    ///
    /// Returns the YAML error if the text is not a mapping of mappings.
    pub fn from_yaml_str(contents: &str) -> serde_yaml::Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let raw: Option<HashMap<String, HashMap<String, serde_yaml::Value>>> =
            serde_yaml::from_str(contents)?;

        let mut credentials = Self::default();
        for (name, values) in raw.unwrap_or_default() {
            let mut section = Section::new();
            for (key, value) in values {
                match yaml_scalar_to_string(&value) {
                    Some(value) => {
                        section.insert(key, value);
                    }
                    None => warn!("Ignoring non-scalar credential `{}` in section `{}`", key, name),
                }
            }
            credentials.insert_section(&name, section);
        }

        Ok(credentials)
    }

    pub fn insert_section(&mut self, name: &str, section: Section) {
        self.sections.insert(name.to_lowercase(), section);
    }

    /// Looks up a section, case-insensitively.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(&name.to_lowercase())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}
