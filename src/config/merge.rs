//! Layered merging of configuration sources.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::key::Key;
use super::source::{ConfigSource, RawConfigEntry};
use super::ConfigError;

/// The flat result of merging every source: one winning entry per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedConfig {
    entries: BTreeMap<Key, RawConfigEntry>,
}

impl MergedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry unless a higher-ranked one already holds the key.
    ///
    /// Equal ranks replace, so later entries from the same source win.
    pub fn insert(&mut self, entry: RawConfigEntry) {
        match self.entries.get(&entry.key) {
            Some(existing) if existing.rank > entry.rank => {}
            _ => {
                self.entries.insert(entry.key.clone(), entry);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_key(&Key::parse(key))
    }

    pub fn get_key(&self, key: &Key) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    pub fn entry(&self, key: &Key) -> Option<&RawConfigEntry> {
        self.entries.get(key)
    }

    pub(crate) fn entry_mut(&mut self, key: &Key) -> Option<&mut RawConfigEntry> {
        self.entries.get_mut(key)
    }

    /// Where the winning value for `key` came from.
    pub fn origin_of(&self, key: &str) -> Option<&str> {
        self.entries.get(&Key::parse(key)).map(|e| e.origin.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawConfigEntry> {
        self.entries.values()
    }

    /// The sub-tree under `prefix`, re-keyed relative to it.
    pub fn section(&self, prefix: &str) -> MergedConfig {
        let prefix = Key::parse(prefix);
        let entries = self
            .entries
            .values()
            .filter_map(|entry| {
                let key = entry.key.strip_prefix(&prefix)?;
                Some((
                    key.clone(),
                    RawConfigEntry {
                        key,
                        ..entry.clone()
                    },
                ))
            })
            .collect();
        MergedConfig { entries }
    }

    /// Overlays several sections; later sections win on shared keys.
    pub fn sections<S: AsRef<str>>(&self, prefixes: &[S]) -> MergedConfig {
        let mut merged = MergedConfig::new();
        for (position, prefix) in prefixes.iter().enumerate() {
            for entry in self.section(prefix.as_ref()).entries.into_values() {
                merged.insert(RawConfigEntry {
                    rank: position,
                    ..entry
                });
            }
        }
        merged
    }

    /// Whether any key lies under `prefix`.
    pub fn has_section(&self, prefix: &Key) -> bool {
        self.entries
            .keys()
            .any(|key| key.strip_prefix(prefix).is_some_and(|rest| !rest.is_empty()))
    }
}

impl FromIterator<RawConfigEntry> for MergedConfig {
    fn from_iter<I: IntoIterator<Item = RawConfigEntry>>(iter: I) -> Self {
        let mut merged = MergedConfig::new();
        for entry in iter {
            merged.insert(entry);
        }
        merged
    }
}

/// Reads `sources` in order and merges them; later sources win.
pub fn merge(sources: &[ConfigSource]) -> Result<MergedConfig, ConfigError> {
    merge_until(sources, &AtomicBool::new(false))
}

/// Like [`merge`], but gives up with [`ConfigError::Cancelled`] once `cancel`
/// is set. The flag is checked before each source is read.
pub fn merge_until(
    sources: &[ConfigSource],
    cancel: &AtomicBool,
) -> Result<MergedConfig, ConfigError> {
    let mut merged = MergedConfig::new();

    for (rank, source) in sources.iter().enumerate() {
        if cancel.load(Ordering::Acquire) {
            return Err(ConfigError::Cancelled);
        }
        let entries = source.entries(rank)?;
        log::debug!("read {} entries from {source}", entries.len());
        for entry in entries {
            merged.insert(entry);
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySource;

    fn memory(values: &[(&str, &str)]) -> ConfigSource {
        MemorySource::new(values.iter().copied()).into()
    }

    #[test]
    fn test_last_source_wins() {
        let a = memory(&[("Shared", "from a"), ("OnlyA", "a")]);
        let b = memory(&[("shared", "from b"), ("OnlyB", "b")]);
        let merged = merge(&[a, b]).unwrap();

        assert_eq!(merged.get("SHARED"), Some("from b"));
        assert_eq!(merged.get("onlya"), Some("a"));
        assert_eq!(merged.get("onlyb"), Some("b"));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_last_source_wins_for_every_key() {
        let keys = ["a", "b:c", "d:e:f", "G"];
        let a: Vec<(&str, &str)> = keys.iter().map(|k| (*k, "a")).collect();
        let b: Vec<(&str, &str)> = keys.iter().map(|k| (*k, "b")).collect();
        let merged = merge(&[memory(&a), memory(&b)]).unwrap();

        for key in keys {
            assert_eq!(merged.get(key), Some("b"), "key {key}");
        }
    }

    #[test]
    fn test_higher_rank_is_not_overwritten() {
        let mut merged = MergedConfig::new();
        merged.insert(RawConfigEntry::new(Key::parse("k"), "high", 5, "x"));
        merged.insert(RawConfigEntry::new(Key::parse("k"), "low", 1, "y"));

        assert_eq!(merged.get("k"), Some("high"));
        assert_eq!(merged.origin_of("K"), Some("x"));
    }

    #[test]
    fn test_missing_keys_are_not_errors() {
        let merged = merge(&[memory(&[])]).unwrap();
        assert!(merged.is_empty());
        assert_eq!(merged.get("anything"), None);
    }

    #[test]
    fn test_section_rekeys_entries() {
        let merged = merge(&[memory(&[
            ("MyJsonSection:MyNumber", "4"),
            ("MyJsonSection:Nested:Deep", "x"),
            ("Other:MyNumber", "9"),
        ])])
        .unwrap();
        let section = merged.section("myjsonsection");

        assert_eq!(section.len(), 2);
        assert_eq!(section.get("MyNumber"), Some("4"));
        assert_eq!(section.get("nested:deep"), Some("x"));
        assert!(merged.has_section(&Key::parse("Other")));
        assert!(!merged.has_section(&Key::parse("Missing")));
    }

    #[test]
    fn test_later_sections_override_earlier() {
        let merged = merge(&[memory(&[
            ("First:MyString", "first"),
            ("First:MyNumber", "1"),
            ("Second:MyString", "second"),
        ])])
        .unwrap();
        let view = merged.sections(&["First", "Second"]);

        assert_eq!(view.get("MyString"), Some("second"));
        assert_eq!(view.get("MyNumber"), Some("1"));
    }

    #[test]
    fn test_cancelled_merge_reads_nothing() {
        let cancel = AtomicBool::new(true);
        let result = merge_until(&[memory(&[("a", "b")])], &cancel);
        assert!(matches!(result, Err(ConfigError::Cancelled)));
    }
}
