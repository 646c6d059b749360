//! Credential sets: the named group of connection parameters behind an alias.
//!
//! A set maps onto five env keys, `{ALIAS}_DBNAME`, `{ALIAS}_HOST`,
//! `{ALIAS}_USER`, `{ALIAS}_PORT` and `{ALIAS}_PASSWORD`. The password is not
//! part of this struct; it only ever comes from a [`CredentialProvider`].
//!
//! [`CredentialProvider`]: crate::prompt::CredentialProvider

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{PsqlHelperError, Result};

/// Alias used when none is given
pub const DEFAULT_ALIAS: &str = "MULTIMODALITY";
/// Database name used when none is given
pub const DEFAULT_DBNAME: &str = "multimodality";
/// Host used when none is given
pub const DEFAULT_HOST: &str = "id-hdb-psgr-ct17.ethz.ch";
/// User used when none is given
pub const DEFAULT_USER: &str = "multimod";
/// Port used when none is given
pub const DEFAULT_PORT: &str = "5432";

/// Suffix of the key whose presence marks an alias as initialized
pub const PASSWORD_SUFFIX: &str = "PASSWORD";

/// The non-password fields of a credential set, in the order they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    DbName,
    Host,
    User,
    Port,
}

impl Field {
    /// All fields in write order
    pub const ALL: [Field; 4] = [Field::DbName, Field::Host, Field::User, Field::Port];

    /// Key suffix for this field
    pub fn suffix(self) -> &'static str {
        match self {
            Field::DbName => "DBNAME",
            Field::Host => "HOST",
            Field::User => "USER",
            Field::Port => "PORT",
        }
    }
}

/// Connection parameters for one database alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub alias: String,
    pub dbname: String,
    pub host: String,
    pub user: String,
    pub port: String,
}

impl Default for CredentialSet {
    fn default() -> Self {
        Self {
            alias: DEFAULT_ALIAS.to_string(),
            dbname: DEFAULT_DBNAME.to_string(),
            host: DEFAULT_HOST.to_string(),
            user: DEFAULT_USER.to_string(),
            port: DEFAULT_PORT.to_string(),
        }
    }
}

impl CredentialSet {
    /// Create a credential set, normalising the alias to upper case and
    /// trimming the other fields
    pub fn new(
        alias: impl Into<String>,
        dbname: impl Into<String>,
        host: impl Into<String>,
        user: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            dbname: dbname.into(),
            host: host.into(),
            user: user.into(),
            port: port.into(),
        }
        .normalized()
    }

    /// Upper-case the alias and strip surrounding whitespace from every field
    pub fn normalized(self) -> Self {
        Self {
            alias: normalize_alias(&self.alias),
            dbname: self.dbname.trim().to_string(),
            host: self.host.trim().to_string(),
            user: self.user.trim().to_string(),
            port: self.port.trim().to_string(),
        }
    }

    /// Value stored for a field
    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::DbName => &self.dbname,
            Field::Host => &self.host,
            Field::User => &self.user,
            Field::Port => &self.port,
        }
    }

    /// Env key for a field, e.g. `TESTDB_HOST`
    pub fn key(&self, field: Field) -> String {
        field_key(&self.alias, field.suffix())
    }

    /// Env key holding the password, e.g. `TESTDB_PASSWORD`
    pub fn password_key(&self) -> String {
        password_key(&self.alias)
    }

    /// All five keys of the set, password last
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Field::ALL.iter().map(|f| self.key(*f)).collect();
        keys.push(self.password_key());
        keys
    }

    /// Non-password key/value pairs in write order
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        Field::ALL
            .iter()
            .map(|f| (self.key(*f), self.value(*f).to_string()))
            .collect()
    }

    /// Validate the set before anything is written
    pub fn validate(&self) -> Result<()> {
        validate_alias(&self.alias)?;

        for field in [Field::DbName, Field::Host, Field::User] {
            if self.value(field).trim().is_empty() {
                return Err(PsqlHelperError::validation(format!(
                    "{} must not be empty",
                    self.key(field)
                )));
            }
        }

        match self.port.parse::<u16>() {
            Ok(0) | Err(_) => {
                return Err(PsqlHelperError::validation(format!(
                    "{} must be a port number between 1 and 65535, got '{}'",
                    self.key(Field::Port),
                    self.port
                )));
            }
            Ok(_) => {}
        }

        for field in Field::ALL {
            validate_value(&self.key(field), self.value(field))?;
        }

        Ok(())
    }

    /// Save the set as JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(())
    }

    /// Load a set from JSON, normalised like [`CredentialSet::new`]
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            PsqlHelperError::config(format!(
                "Failed to read credential set from {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        let set: Self = serde_json::from_str(&content)?;
        Ok(set.normalized())
    }
}

/// Upper-case and trim an alias
pub fn normalize_alias(alias: &str) -> String {
    alias.trim().to_ascii_uppercase()
}

/// `{ALIAS}_{SUFFIX}`
pub fn field_key(alias: &str, suffix: &str) -> String {
    format!("{}_{}", alias, suffix)
}

/// `{ALIAS}_PASSWORD`
pub fn password_key(alias: &str) -> String {
    field_key(alias, PASSWORD_SUFFIX)
}

/// Aliases become key prefixes, so they must be identifiers
pub fn validate_alias(alias: &str) -> Result<()> {
    if alias.is_empty() {
        return Err(PsqlHelperError::validation("Alias must not be empty"));
    }
    if let Some(first) = alias.chars().next() {
        if !first.is_ascii_alphabetic() {
            return Err(PsqlHelperError::validation(format!(
                "Alias '{}' must start with a letter",
                alias
            )));
        }
    }
    if !alias
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(PsqlHelperError::validation(format!(
            "Alias '{}' can only contain letters, numbers, and underscores",
            alias
        )));
    }
    Ok(())
}

/// One value per line: line breaks cannot be stored
pub fn validate_value(key: &str, value: &str) -> Result<()> {
    if value.contains(['\n', '\r']) {
        return Err(PsqlHelperError::validation(format!(
            "{} must not contain line breaks",
            key
        )));
    }
    Ok(())
}
