use std::fmt;
use std::path::Path;

use super::env::EnvSource;
use super::file::FileSource;
use super::key::Key;
use super::remote::RemoteSource;
use super::ConfigError;

/// One key/value pair read from a source, tagged with the source's rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfigEntry {
    pub key: Key,
    pub value: String,
    pub rank: usize,
    pub origin: String,
    /// Whether `${...}` references in the value are expanded when bound.
    pub expand_references: bool,
}

impl RawConfigEntry {
    pub fn new(key: Key, value: impl Into<String>, rank: usize, origin: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
            rank,
            origin: origin.into(),
            expand_references: false,
        }
    }

    /// Marks the value as a template whose references are expanded.
    pub fn expanding(mut self) -> Self {
        self.expand_references = true;
        self
    }
}

/// A configuration source in the loading pipeline.
///
/// Every variant produces flat dotted-key entries; its position in the
/// pipeline decides its rank.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(FileSource),
    Environment(EnvSource),
    Memory(MemorySource),
    Remote(RemoteSource),
}

impl ConfigSource {
    /// Reads every entry of this source, stamped with `rank`.
    pub fn entries(&self, rank: usize) -> Result<Vec<RawConfigEntry>, ConfigError> {
        match self {
            ConfigSource::File(source) => source.entries(rank),
            ConfigSource::Environment(source) => Ok(source.entries(rank)),
            ConfigSource::Memory(source) => Ok(source.entries(rank)),
            ConfigSource::Remote(source) => source.entries(rank),
        }
    }

    /// The backing file, for sources that can be watched for changes.
    pub fn watched_path(&self) -> Option<&Path> {
        match self {
            ConfigSource::File(source) => Some(source.path()),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(source) => write!(f, "file '{}'", source.path().display()),
            ConfigSource::Environment(source) => write!(f, "{source}"),
            ConfigSource::Memory(_) => f.write_str("memory"),
            ConfigSource::Remote(source) => write!(f, "remote '{}'", source.name()),
        }
    }
}

impl From<FileSource> for ConfigSource {
    fn from(source: FileSource) -> Self {
        ConfigSource::File(source)
    }
}

impl From<EnvSource> for ConfigSource {
    fn from(source: EnvSource) -> Self {
        ConfigSource::Environment(source)
    }
}

impl From<MemorySource> for ConfigSource {
    fn from(source: MemorySource) -> Self {
        ConfigSource::Memory(source)
    }
}

impl From<RemoteSource> for ConfigSource {
    fn from(source: RemoteSource) -> Self {
        ConfigSource::Remote(source)
    }
}

/// In-memory key/value pairs, used for defaults and overrides.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    values: Vec<(String, String)>,
}

impl MemorySource {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn entries(&self, rank: usize) -> Vec<RawConfigEntry> {
        self.values
            .iter()
            .map(|(key, value)| RawConfigEntry::new(Key::parse(key), value, rank, "memory"))
            .filter(|entry| !entry.key.is_empty())
            .collect()
    }
}
