//! File-based configuration source.

use std::path::{Path, PathBuf};

use super::key::Key;
use super::source::RawConfigEntry;
use super::ConfigError;

/// Structured text formats a [`FileSource`] understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    #[cfg(feature = "json")]
    Json,
}

impl FileFormat {
    /// Picks the format from the file extension, defaulting to TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            #[cfg(feature = "json")]
            Some(ext) if ext.eq_ignore_ascii_case("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        }
    }
}

/// A configuration source that loads from a TOML or JSON file.
///
/// Files can be marked as required or optional. Required files that don't exist
/// cause an error; optional files that don't exist are silently skipped.
/// Nested tables flatten into `section:key` entries and arrays into
/// `key:0`, `key:1`, ...
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    required: bool,
    format: FileFormat,
}

impl FileSource {
    /// Creates a new file source.
    ///
    /// If `required` is true, the build will fail if the file doesn't exist.
    pub fn new(path: impl AsRef<Path>, required: bool) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = FileFormat::from_path(&path);
        Self {
            path,
            required,
            format,
        }
    }

    /// Overrides the extension-based format detection.
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn entries(&self, rank: usize) -> Result<Vec<RawConfigEntry>, ConfigError> {
        let Some(contents) = read_config_file(&self.path, self.required)? else {
            log::debug!("optional config file {} not found", self.path.display());
            return Ok(Vec::new());
        };

        let origin = self.path.display().to_string();
        let mut flat = Vec::new();
        match self.format {
            FileFormat::Toml => {
                let table: toml::Table =
                    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                        path: self.path.clone(),
                        source: e,
                    })?;
                flatten_toml(&Key::default(), &toml::Value::Table(table), &mut flat);
            }
            #[cfg(feature = "json")]
            FileFormat::Json => {
                let value: serde_json::Value =
                    serde_json::from_str(&contents).map_err(|e| ConfigError::JsonParseError {
                        path: self.path.clone(),
                        source: e,
                    })?;
                flatten_json(&Key::default(), &value, &mut flat);
            }
        }

        Ok(flat
            .into_iter()
            .map(|(key, value)| RawConfigEntry::new(key, value, rank, origin.as_str()).expanding())
            .collect())
    }
}

/// Reads a config file.
///
/// Returns `Ok(None)` if the file doesn't exist and `required` is false.
fn read_config_file(path: &Path, required: bool) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if required {
                Err(ConfigError::FileNotFound(path.to_path_buf()))
            } else {
                Ok(None)
            }
        }
        Err(e) => Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn flatten_toml(prefix: &Key, value: &toml::Value, out: &mut Vec<(Key, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, value) in table {
                flatten_toml(&prefix.join(key), value, out);
            }
        }
        toml::Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                flatten_toml(&prefix.join(&index.to_string()), value, out);
            }
        }
        toml::Value::String(s) => out.push((prefix.clone(), s.clone())),
        toml::Value::Integer(i) => out.push((prefix.clone(), i.to_string())),
        toml::Value::Float(f) => out.push((prefix.clone(), f.to_string())),
        toml::Value::Boolean(b) => out.push((prefix.clone(), b.to_string())),
        toml::Value::Datetime(dt) => out.push((prefix.clone(), dt.to_string())),
    }
}

#[cfg(feature = "json")]
fn flatten_json(prefix: &Key, value: &serde_json::Value, out: &mut Vec<(Key, String)>) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_json(&prefix.join(key), value, out);
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                flatten_json(&prefix.join(&index.to_string()), value, out);
            }
        }
        Value::Null => out.push((prefix.clone(), String::new())),
        Value::String(s) => out.push((prefix.clone(), s.clone())),
        Value::Bool(b) => out.push((prefix.clone(), b.to_string())),
        Value::Number(n) => out.push((prefix.clone(), n.to_string())),
    }
}
