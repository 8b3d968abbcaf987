//! Dataset catalog and warehouse connection settings.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read dataset catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse dataset catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{dataset}: {field} '{value}' is not a valid SQL identifier")]
    InvalidIdentifier {
        dataset: String,
        field: &'static str,
        value: String,
    },
    #[error("{0}")]
    Invalid(String),
}

/// How input identifiers are compared against a dataset's key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Unmodified identifier against unmodified keys.
    Exact,
    /// Trimmed identifier against trimmed keys, through the fallback chain.
    Fallback,
}

/// Describes one remote dataset and how its columns land in the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub name: String,
    pub table: String,
    pub key_column: String,
    /// Output header for the input identifier column feeding this dataset.
    pub input_label: String,
    pub output_prefix: String,
    #[serde(default)]
    pub strip_column_prefix: Option<String>,
    pub match_policy: MatchPolicy,
}

impl DatasetDescriptor {
    pub fn company_data_feed() -> Self {
        Self {
            name: "pitchbook".to_string(),
            table: "PITCHBOOK.COMPANY_DATA_FEED".to_string(),
            key_column: "COMPANY_ID".to_string(),
            input_label: "pitchbook_id".to_string(),
            output_prefix: "pb_".to_string(),
            strip_column_prefix: None,
            match_policy: MatchPolicy::Exact,
        }
    }

    pub fn firmographics() -> Self {
        Self {
            name: "voldemort".to_string(),
            table: "VOLDEMORT.VOLDEMORT_FIRMOGRAPHICS".to_string(),
            key_column: "BQ_ID".to_string(),
            input_label: "bq_id".to_string(),
            output_prefix: "vd_".to_string(),
            strip_column_prefix: Some("vd_".to_string()),
            match_policy: MatchPolicy::Fallback,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("table", &self.table), ("key_column", &self.key_column)] {
            if !is_sql_identifier(value) {
                return Err(ConfigError::InvalidIdentifier {
                    dataset: self.name.clone(),
                    field,
                    value: value.clone(),
                });
            }
        }
        if self.output_prefix.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{}: output_prefix cannot be empty",
                self.name
            )));
        }
        if self.input_label.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{}: input_label cannot be empty",
                self.name
            )));
        }
        Ok(())
    }
}

/// The primary and secondary datasets driving a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetCatalog {
    pub primary: DatasetDescriptor,
    pub secondary: DatasetDescriptor,
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        Self {
            primary: DatasetDescriptor::company_data_feed(),
            secondary: DatasetDescriptor::firmographics(),
        }
    }
}

impl DatasetCatalog {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let catalog: Self = toml::from_str(contents)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.primary.validate()?;
        self.secondary.validate()?;

        if self.primary.output_prefix == self.secondary.output_prefix {
            return Err(ConfigError::Invalid(format!(
                "datasets share output prefix '{}'",
                self.primary.output_prefix
            )));
        }
        if self.primary.input_label == self.secondary.input_label {
            return Err(ConfigError::Invalid(format!(
                "datasets share input label '{}'",
                self.primary.input_label
            )));
        }
        Ok(())
    }
}

/// Dotted identifier made of ASCII alphanumerics and underscores, e.g. `SCHEMA.TABLE`.
pub fn is_sql_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.split('.').all(|segment| {
            !segment.is_empty()
                && !segment.starts_with(|c: char| c.is_ascii_digit())
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[derive(Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub role: Option<String>,
    pub application_name: String,
}

impl ConnectionSettings {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .application_name(&self.application_name)
    }

    /// The role to assume after connecting. A role is a single bare
    /// identifier, so qualified names are rejected too.
    pub fn checked_role(&self) -> Result<Option<&str>, ConfigError> {
        match self.role.as_deref() {
            None => Ok(None),
            Some(role) if is_sql_identifier(role) && !role.contains('.') => Ok(Some(role)),
            Some(role) => Err(ConfigError::InvalidIdentifier {
                dataset: "connection".to_string(),
                field: "role",
                value: role.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
