//! Table-driven settings schema.
//!
//! A [`Schema`] lists the fields of an options type: their semantic type, an
//! optional default and the rules the validator evaluates. It replaces
//! attribute discovery with plain data:
//!
//! ```
//! use options_fnd::{FieldSpec, Rule, Schema};
//!
//! let schema = Schema::new()
//!     .field(FieldSpec::string("MyString").rule(Rule::required()))
//!     .field(
//!         FieldSpec::integer("MyNumber")
//!             .default(5)
//!             .rule(Rule::range(1, 10).message("MyNumber must be between 1 and 10")),
//!     )
//!     .field(FieldSpec::section(
//!         "Logging",
//!         Schema::new().field(FieldSpec::string("FilePath")),
//!     ));
//! assert!(schema.check().is_ok());
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ConfigError;

/// Matches dotted-quad IPv4 addresses with a non-zero first octet.
pub const IPV4_PATTERN: &str = r"^([1-9]|[1-9][0-9]|1[0-9][0-9]|2[0-4][0-9]|25[0-5])(\.([0-9]|[1-9][0-9]|1[0-9][0-9]|2[0-4][0-9]|25[0-5])){3}$";

/// An ordered list of field specifications.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Rejects rules that can never be evaluated: `min > max`, bad regex
    /// patterns, rules on a type they do not apply to, duplicate names and
    /// defaults of the wrong type.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.check_at("")
    }

    fn check_at(&self, prefix: &str) -> Result<(), ConfigError> {
        let mut seen = Vec::new();
        for field in &self.fields {
            let path = field_path(prefix, &field.name);
            let invalid = |reason: String| ConfigError::InvalidSchema {
                field: path.clone(),
                reason,
            };

            let lowered = field.name.to_lowercase();
            if field.name.trim().is_empty() || field.name.contains([':', '.']) {
                return Err(invalid("field names must be a single non-empty segment".into()));
            }
            if seen.contains(&lowered) {
                return Err(invalid("duplicate field name".into()));
            }
            seen.push(lowered);

            if let Some(default) = &field.default {
                if default.kind_name() != field.kind.name() {
                    return Err(invalid(format!(
                        "default is {} but field is {}",
                        default.kind_name(),
                        field.kind.name()
                    )));
                }
            }

            for rule in &field.rules {
                rule.check_for(&field.kind).map_err(invalid)?;
            }

            if let FieldKind::Section(nested) = &field.kind {
                nested.check_at(&path)?;
            }
        }
        Ok(())
    }
}

/// Joins a parent path and a field name the way failures report them.
pub(crate) fn field_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}:{name}")
    }
}

/// Semantic type of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    Uri,
    Section(Schema),
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Uri => "URI",
            FieldKind::Section(_) => "section",
        }
    }
}

/// A default value for a scalar field.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Uri(Uri),
}

impl DefaultValue {
    fn kind_name(&self) -> &'static str {
        match self {
            DefaultValue::String(_) => "string",
            DefaultValue::Integer(_) => "integer",
            DefaultValue::Boolean(_) => "boolean",
            DefaultValue::Uri(_) => "URI",
        }
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        DefaultValue::String(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        DefaultValue::String(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        DefaultValue::Integer(value)
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        DefaultValue::Integer(value.into())
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        DefaultValue::Boolean(value)
    }
}

impl From<Uri> for DefaultValue {
    fn from(value: Uri) -> Self {
        DefaultValue::Uri(value)
    }
}

/// One named field of a [`Schema`].
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) default: Option<DefaultValue>,
    pub(crate) rules: Vec<Rule>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            rules: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn uri(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Uri)
    }

    pub fn section(name: impl Into<String>, schema: Schema) -> Self {
        Self::new(name, FieldKind::Section(schema))
    }

    /// Value used when no source provides the field.
    pub fn default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// A declarative validation rule attached to a field.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Strings must be non-blank, integers non-zero, booleans true and URIs present.
    Required { message: Option<String> },
    /// Inclusive integer range.
    Range {
        min: i64,
        max: i64,
        message: Option<String>,
    },
    /// The string form must match the regular expression.
    Pattern {
        pattern: Pattern,
        message: Option<String>,
    },
    /// Booleans must be `true`.
    MustBeTrue { message: Option<String> },
}

impl Rule {
    pub fn required() -> Self {
        Rule::Required { message: None }
    }

    pub fn must_be_true() -> Self {
        Rule::MustBeTrue { message: None }
    }

    pub fn range(min: i64, max: i64) -> Self {
        Rule::Range {
            min,
            max,
            message: None,
        }
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Rule::Pattern {
            pattern: Pattern::new(pattern),
            message: None,
        }
    }

    pub fn ipv4_address() -> Self {
        Self::pattern(IPV4_PATTERN)
    }

    /// Replaces the default failure message.
    pub fn message(mut self, text: impl Into<String>) -> Self {
        let slot = match &mut self {
            Rule::Required { message }
            | Rule::Range { message, .. }
            | Rule::Pattern { message, .. }
            | Rule::MustBeTrue { message } => message,
        };
        *slot = Some(text.into());
        self
    }

    pub(crate) fn custom_message(&self) -> Option<&str> {
        match self {
            Rule::Required { message }
            | Rule::Range { message, .. }
            | Rule::Pattern { message, .. }
            | Rule::MustBeTrue { message } => message.as_deref(),
        }
    }

    fn check_for(&self, kind: &FieldKind) -> Result<(), String> {
        match (self, kind) {
            (Rule::Required { .. }, FieldKind::Section(_)) => {
                Err("required does not apply to sections".into())
            }
            (Rule::Required { .. }, _) => Ok(()),
            (Rule::Range { min, max, .. }, FieldKind::Integer) => {
                if min > max {
                    Err(format!("min ({min}) cannot be greater than max ({max})"))
                } else {
                    Ok(())
                }
            }
            (Rule::Pattern { pattern, .. }, FieldKind::String | FieldKind::Uri) => {
                pattern.regex().map(|_| ())
            }
            (Rule::MustBeTrue { .. }, FieldKind::Boolean) => Ok(()),
            (rule, kind) => Err(format!(
                "{} rule does not apply to {} fields",
                rule.name(),
                kind.name()
            )),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Rule::Required { .. } => "required",
            Rule::Range { .. } => "range",
            Rule::Pattern { .. } => "pattern",
            Rule::MustBeTrue { .. } => "must-be-true",
        }
    }
}

/// A regular expression compiled on first use.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    compiled: OnceLock<Result<Regex, String>>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            compiled: OnceLock::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> Result<&Regex, String> {
        self.compiled
            .get_or_init(|| {
                Regex::new(&self.source).map_err(|e| format!("invalid regex pattern: {e}"))
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

/// An absolute URI (`scheme:rest`) read from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri(String);

/// Error returned when a string is not an absolute URI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not an absolute URI")]
pub struct InvalidUri(pub String);

fn is_absolute_uri(raw: &str) -> bool {
    static URI: OnceLock<Option<Regex>> = OnceLock::new();
    URI.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:[^\s]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(raw))
}

impl Uri {
    pub fn parse(raw: &str) -> Result<Self, InvalidUri> {
        let trimmed = raw.trim();
        if is_absolute_uri(trimmed) {
            Ok(Uri(trimmed.to_string()))
        } else {
            Err(InvalidUri(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }
}

impl FromStr for Uri {
    type Err = InvalidUri;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::parse(s)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Uri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Uri::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_parse() {
        let uri = Uri::parse("https://example.com/path?q=1").unwrap();
        assert_eq!(uri.scheme(), "https");
        assert!(Uri::parse("mailto:someone@example.com").is_ok());

        assert!(Uri::parse("not a uri").is_err());
        assert!(Uri::parse("/relative/path").is_err());
        assert!(Uri::parse("").is_err());
    }

    #[test]
    fn test_check_accepts_valid_schema() {
        let schema = Schema::new()
            .field(FieldSpec::string("MyIpAddress").rule(Rule::ipv4_address()))
            .field(FieldSpec::integer("MyNumber").default(19).rule(Rule::range(1, 10)))
            .field(FieldSpec::boolean("MyBool").rule(Rule::must_be_true()))
            .field(FieldSpec::uri("MyUri").rule(Rule::required()));

        assert!(schema.check().is_ok());
    }

    #[test]
    fn test_check_rejects_inverted_range() {
        let schema = Schema::new().field(FieldSpec::integer("Port").rule(Rule::range(10, 1)));

        let err = schema.check().unwrap_err();
        assert!(err.to_string().contains("min (10) cannot be greater than max (1)"));
    }

    #[test]
    fn test_check_rejects_bad_pattern() {
        let schema = Schema::new().field(FieldSpec::string("Name").rule(Rule::pattern("([a-z")));

        assert!(matches!(
            schema.check(),
            Err(ConfigError::InvalidSchema { ref field, .. }) if field == "Name"
        ));
    }

    #[test]
    fn test_check_rejects_mismatched_rule_and_default() {
        let range_on_string =
            Schema::new().field(FieldSpec::string("Name").rule(Rule::range(1, 2)));
        assert!(range_on_string.check().is_err());

        let wrong_default = Schema::new().field(FieldSpec::integer("Count").default("many"));
        assert!(wrong_default.check().is_err());
    }

    #[test]
    fn test_check_reports_nested_path_and_duplicates() {
        let schema = Schema::new().field(FieldSpec::section(
            "Logging",
            Schema::new().field(FieldSpec::boolean("Enabled").rule(Rule::range(0, 1))),
        ));
        assert!(matches!(
            schema.check(),
            Err(ConfigError::InvalidSchema { ref field, .. }) if field == "Logging:Enabled"
        ));

        let duplicate = Schema::new()
            .field(FieldSpec::string("Name"))
            .field(FieldSpec::string("name"));
        assert!(duplicate.check().is_err());
    }

    #[test]
    fn test_message_override() {
        let rule = Rule::range(1, 10).message("MyNumber must be between 1 and 10");
        assert_eq!(rule.custom_message(), Some("MyNumber must be between 1 and 10"));
        assert_eq!(Rule::required().custom_message(), None);
    }
}
