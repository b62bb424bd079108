//! Variable reference resolution for configuration values.
//!
//! Supports `${Section:Key}` (or `${section.key}`) syntax for cross-referencing
//! merged values. Use `$${...}` to escape and produce a literal `${...}`.
//!
//! Only template values (those read from files) are expanded. Values from
//! other sources are taken verbatim, including when a template references
//! them.

use std::collections::HashMap;

use super::key::Key;
use super::merge::MergedConfig;
use super::schema::{FieldKind, Schema};
use super::ConfigError;

/// Expands references in the values `schema` will bind from `view`.
///
/// References name keys of `root`, the full merged configuration, so a
/// section view can still point outside its section. Keys the schema never
/// reads are left alone and cannot fail the pass.
pub fn resolve_bound_references(
    view: &mut MergedConfig,
    root: &MergedConfig,
    schema: &Schema,
) -> Result<(), ConfigError> {
    let mut references = References::new(root);
    expand_fields(view, &Key::default(), schema, &mut references)
}

fn expand_fields(
    view: &mut MergedConfig,
    prefix: &Key,
    schema: &Schema,
    references: &mut References<'_>,
) -> Result<(), ConfigError> {
    for field in schema.fields() {
        let key = prefix.join(field.name());
        if let FieldKind::Section(nested) = field.kind() {
            expand_fields(view, &key, nested, references)?;
            continue;
        }
        if let Some(entry) = view.entry_mut(&key) {
            if entry.expand_references {
                entry.value = references.expand(&entry.value)?;
            }
        }
    }
    Ok(())
}

/// Memoized reference expansion over one merged configuration.
pub(crate) struct References<'a> {
    root: &'a MergedConfig,
    resolved: HashMap<Key, String>,
    stack: Vec<Key>,
}

impl<'a> References<'a> {
    pub(crate) fn new(root: &'a MergedConfig) -> Self {
        Self {
            root,
            resolved: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// The final value of `key`: expanded if it is a template, verbatim otherwise.
    pub(crate) fn resolve_key(&mut self, key: &Key) -> Result<String, ConfigError> {
        if let Some(value) = self.resolved.get(key) {
            return Ok(value.clone());
        }
        if self.stack.contains(key) {
            return Err(ConfigError::CircularReference);
        }

        let root = self.root;
        let entry = root
            .entry(key)
            .ok_or_else(|| ConfigError::ReferenceNotFound(key.to_string()))?;
        if !entry.expand_references {
            return Ok(entry.value.clone());
        }

        self.stack.push(key.clone());
        let value = self.expand(&entry.value);
        self.stack.pop();
        let value = value?;

        self.resolved.insert(key.clone(), value.clone());
        Ok(value)
    }

    /// Resolves all `${...}` references in a string.
    /// Handles `$$` escape sequences.
    pub(crate) fn expand(&mut self, s: &str) -> Result<String, ConfigError> {
        if !s.contains('$') {
            return Ok(s.to_string());
        }

        let mut result = String::with_capacity(s.len());
        let mut chars = s.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch == '$' {
                match chars.peek() {
                    Some('$') => {
                        // Escape sequence: $$ -> $
                        chars.next();
                        result.push('$');
                    }
                    Some('{') => {
                        // Reference: ${Section:Key}
                        chars.next(); // consume '{'
                        let path = consume_until(&mut chars, '}')
                            .ok_or(ConfigError::UnclosedReference)?;

                        let target = lookup_path(self.root, &path)?;
                        result.push_str(&self.resolve_key(&target)?);
                    }
                    _ => {
                        // Just a lone $
                        result.push('$');
                    }
                }
            } else {
                result.push(ch);
            }
        }

        Ok(result)
    }
}

/// Consumes characters until the delimiter, returning the collected string.
fn consume_until(chars: &mut std::iter::Peekable<std::str::Chars>, delim: char) -> Option<String> {
    let mut result = String::new();
    for ch in chars.by_ref() {
        if ch == delim {
            return Some(result);
        }
        result.push(ch);
    }
    None // Delimiter not found
}

/// Checks a referenced path and returns the key it names.
fn lookup_path(root: &MergedConfig, path: &str) -> Result<Key, ConfigError> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed.split([':', '.']).any(|p| p.trim().is_empty()) {
        return Err(ConfigError::InvalidReferencePath(path.to_string()));
    }

    let key = Key::parse(trimmed);
    if root.entry(&key).is_none() {
        return Err(ConfigError::ReferenceNotFound(path.to_string()));
    }
    Ok(key)
}
