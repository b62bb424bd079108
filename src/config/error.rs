use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("required config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[cfg(feature = "json")]
    #[error("failed to parse config file '{path}': {source}")]
    JsonParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("remote source '{name}' did not answer within {timeout:?}")]
    SourceTimeout { name: String, timeout: Duration },

    #[error("remote source '{name}' is unavailable: {reason}")]
    Remote { name: String, reason: String },

    #[error("failed to deserialize config: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("failed to snapshot configured options: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid settings schema for field '{field}': {reason}")]
    InvalidSchema { field: String, reason: String },

    #[error("{0}")]
    Invalid(ConfigurationErrors),

    #[error("circular reference detected in configuration")]
    CircularReference,

    #[error("referenced path not found: {0}")]
    ReferenceNotFound(String),

    #[error("invalid reference path: {0}")]
    InvalidReferencePath(String),

    #[error("unclosed reference (missing '}}')")]
    UnclosedReference,

    #[error("resolution cancelled by shutdown")]
    Cancelled,

    #[error("reload failed: {0}")]
    ReloadFailed(Arc<ConfigError>),

    #[cfg(feature = "watch")]
    #[error("failed to watch config files: {0}")]
    Watch(#[from] notify::Error),
}

impl ConfigError {
    /// True when a source could not be read at all.
    pub fn is_source_unavailable(&self) -> bool {
        match self {
            ConfigError::FileNotFound(_)
            | ConfigError::ReadError { .. }
            | ConfigError::ParseError { .. }
            | ConfigError::SourceTimeout { .. }
            | ConfigError::Remote { .. } => true,
            #[cfg(feature = "json")]
            ConfigError::JsonParseError { .. } => true,
            ConfigError::ReloadFailed(inner) => inner.is_source_unavailable(),
            _ => false,
        }
    }

    /// The aggregated binding and validation problems, if that is what failed.
    pub fn problems(&self) -> Option<&ConfigurationErrors> {
        match self {
            ConfigError::Invalid(problems) => Some(problems),
            ConfigError::ReloadFailed(inner) => inner.problems(),
            _ => None,
        }
    }
}

/// A raw value that could not be converted to its field's declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingError {
    pub field: String,
    pub value: String,
    pub expected: &'static str,
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot convert '{}' to {} for {}",
            self.value, self.expected, self.field
        )
    }
}

/// A bound value that broke a declarative or custom rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub field: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Every problem found in one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationErrors {
    pub type_name: String,
    pub binding: Vec<BindingError>,
    pub validation: Vec<ValidationFailure>,
    /// Why the bound values could not be converted into the options type.
    pub conversion: Option<String>,
}

impl ConfigurationErrors {
    pub fn is_empty(&self) -> bool {
        self.binding.is_empty() && self.validation.is_empty() && self.conversion.is_none()
    }

    pub fn len(&self) -> usize {
        self.binding.len() + self.validation.len() + usize::from(self.conversion.is_some())
    }

    /// Names of every field with at least one problem, in report order.
    pub fn fields(&self) -> Vec<&str> {
        self.binding
            .iter()
            .map(|e| e.field.as_str())
            .chain(self.validation.iter().map(|f| f.field.as_str()))
            .collect()
    }
}

impl fmt::Display for ConfigurationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "found configuration error(s) in {}: ", self.type_name)?;
        let messages = self
            .binding
            .iter()
            .map(ToString::to_string)
            .chain(self.validation.iter().map(ToString::to_string))
            .chain(self.conversion.iter().map(|e| format!("cannot convert bound values: {e}")))
            .collect::<Vec<_>>();
        f.write_str(&messages.join(", "))
    }
}
