use std::fmt;

use super::key::Key;
use super::source::RawConfigEntry;

/// Environment variables mapped onto the dotted-key namespace.
///
/// With prefix `MYAPP` and separator `__`, `MYAPP__LOGGING__FILEPATH` becomes
/// `logging:filepath`. An empty prefix takes every variable and only splits
/// on the separator.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
    separator: String,
    vars: Option<Vec<(String, String)>>,
}

impl EnvSource {
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        assert!(!separator.is_empty(), "separator must not be empty");
        Self {
            prefix: prefix.into(),
            separator,
            vars: None,
        }
    }

    /// Reads from the given variables instead of the process environment.
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub(crate) fn entries(&self, rank: usize) -> Vec<RawConfigEntry> {
        let vars: Vec<(String, String)> = match &self.vars {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        };

        let prefix_with_sep = format!("{}{}", self.prefix, self.separator);
        let mut entries = Vec::new();

        for (name, value) in vars {
            let path_str = if self.prefix.is_empty() {
                name.as_str()
            } else {
                match strip_prefix_ignore_case(&name, &prefix_with_sep) {
                    Some(rest) => rest,
                    None => continue,
                }
            };
            if path_str.is_empty() {
                continue;
            }

            let key = Key::from_segments(path_str.split(self.separator.as_str()));
            if key.is_empty() {
                continue;
            }
            entries.push(RawConfigEntry::new(key, value, rank, format!("env {name}")));
        }

        entries
    }
}

impl fmt::Display for EnvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            f.write_str("environment")
        } else {
            write!(f, "environment '{}{}*'", self.prefix, self.separator)
        }
    }
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        name.get(prefix.len()..)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of<'a>(entries: &'a [RawConfigEntry], key: &str) -> Option<&'a str> {
        let key = Key::parse(key);
        entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    #[test]
    fn test_prefix_filters_and_separator_nests() {
        let source = EnvSource::new("MYAPP", "__").with_vars([
            ("MYAPP__MyEnvVarsSection__MyEnvString", "from env"),
            ("MYAPP__LOGGING__FILEPATH", "/tmp/app.log"),
            ("OTHER__LOGGING__FILEPATH", "ignored"),
            ("MYAPP__", "empty path"),
        ]);
        let entries = source.entries(2);

        assert_eq!(entries.len(), 2);
        assert_eq!(
            value_of(&entries, "MyEnvVarsSection:MyEnvString"),
            Some("from env")
        );
        assert_eq!(value_of(&entries, "Logging:FilePath"), Some("/tmp/app.log"));
        assert!(entries.iter().all(|e| e.rank == 2));
    }

    #[test]
    fn test_prefix_match_ignores_case() {
        let source = EnvSource::new("myapp", "__").with_vars([("MYAPP__PORT", "80")]);
        assert_eq!(value_of(&source.entries(0), "port"), Some("80"));
    }

    #[test]
    fn test_empty_prefix_takes_everything() {
        let source = EnvSource::new("", "__").with_vars([("Logging__Level", "debug"), ("PATH", "/bin")]);
        let entries = source.entries(0);

        assert_eq!(value_of(&entries, "logging:level"), Some("debug"));
        assert_eq!(value_of(&entries, "path"), Some("/bin"));
    }

    #[test]
    #[should_panic(expected = "separator must not be empty")]
    fn test_empty_separator_panics() {
        let _ = EnvSource::new("APP", "");
    }
}
