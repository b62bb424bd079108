//! Declarative and custom validation of bound settings.
//!
//! Every check runs; failures are collected rather than short-circuited so a
//! caller can report all problems at once.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use toml::{Table, Value};

use super::error::ValidationFailure;
use super::schema::{field_path, FieldKind, Rule, Schema, IPV4_PATTERN};

/// Evaluates the schema's declarative rules against a bound table.
///
/// Missing scalars are judged by their zero value, matching what the binder
/// would have produced. The table is never modified.
pub fn validate(schema: &Schema, bound: &Table) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    validate_table(schema, bound, "", &mut failures);
    failures
}

fn validate_table(schema: &Schema, table: &Table, path: &str, out: &mut Vec<ValidationFailure>) {
    for field in schema.fields() {
        let name = field_path(path, field.name());
        let value = table.get(field.name());

        if let FieldKind::Section(nested) = field.kind() {
            let empty = Table::new();
            let sub = value.and_then(Value::as_table).unwrap_or(&empty);
            validate_table(nested, sub, &name, out);
            continue;
        }

        for rule in field.rules() {
            if let Some(message) = evaluate(rule, field.kind(), value, &name) {
                out.push(ValidationFailure::new(name.as_str(), message));
            }
        }
    }
}

/// Returns the failure message if `rule` does not hold.
fn evaluate(rule: &Rule, kind: &FieldKind, value: Option<&Value>, name: &str) -> Option<String> {
    let message = |default: String| Some(rule.custom_message().map_or(default, str::to_string));

    match rule {
        Rule::Required { .. } => {
            let present = match (kind, value) {
                (FieldKind::Integer, Some(Value::Integer(i))) => *i != 0,
                (FieldKind::Boolean, Some(Value::Boolean(b))) => *b,
                (_, Some(Value::String(s))) => !s.trim().is_empty(),
                _ => false,
            };
            if present {
                None
            } else {
                message(format!("The {name} field is required."))
            }
        }
        Rule::Range { min, max, .. } => {
            let number = value.and_then(Value::as_integer).unwrap_or(0);
            if (*min..=*max).contains(&number) {
                None
            } else {
                message(format!("The field {name} must be between {min} and {max}."))
            }
        }
        Rule::Pattern { pattern, .. } => {
            let text = value.and_then(Value::as_str).unwrap_or("");
            match pattern.regex() {
                Ok(re) if re.is_match(text) => None,
                Ok(_) => message(format!(
                    "The field {name} must match the regular expression '{}'.",
                    pattern.as_str()
                )),
                Err(reason) => Some(format!("The field {name} has an unusable rule: {reason}")),
            }
        }
        Rule::MustBeTrue { .. } => match value.and_then(Value::as_bool) {
            Some(true) => None,
            _ => message(format!("The field {name} must be true.")),
        },
    }
}

/// A predicate over the whole typed instance.
pub struct CustomRule<T> {
    field: String,
    message: String,
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> CustomRule<T> {
    /// A rule that fails with `message`, attributed to `field`, whenever
    /// `predicate` returns false.
    pub fn new<F>(field: impl Into<String>, message: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            field: field.into(),
            message: message.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn check(&self, instance: &T) -> Option<ValidationFailure> {
        if (self.predicate)(instance) {
            None
        } else {
            Some(ValidationFailure::new(self.field.as_str(), self.message.as_str()))
        }
    }
}

impl<T> fmt::Debug for CustomRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRule")
            .field("field", &self.field)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Runs every custom rule, keeping the failures in rule order.
pub fn validate_custom<T>(instance: &T, rules: &[CustomRule<T>]) -> Vec<ValidationFailure> {
    rules.iter().filter_map(|rule| rule.check(instance)).collect()
}

/// Whether `candidate` is a dotted-quad IPv4 address per [`IPV4_PATTERN`].
pub fn is_ipv4_address(candidate: &str) -> bool {
    static IPV4: OnceLock<Option<Regex>> = OnceLock::new();
    IPV4.get_or_init(|| Regex::new(IPV4_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::bind::bind;
    use crate::config::merge::merge;
    use crate::config::schema::FieldSpec;
    use crate::config::MemorySource;

    fn bound(schema: &Schema, values: &[(&str, &str)]) -> Table {
        let merged = merge(&[MemorySource::new(values.iter().copied()).into()]).unwrap();
        bind(&merged, schema).table
    }

    fn my_settings() -> Schema {
        Schema::new()
            .field(FieldSpec::string("MyString").rule(Rule::required()))
            .field(
                FieldSpec::integer("MyNumber")
                    .default(19)
                    .rule(Rule::range(1, 10).message("MyNumber must be between 1 and 10")),
            )
            .field(
                FieldSpec::boolean("MyBool")
                    .rule(Rule::must_be_true().message("Missing config value MyBool")),
            )
            .field(FieldSpec::string("MyIpAddress").rule(Rule::ipv4_address()))
    }

    #[test]
    fn test_valid_instance_has_no_failures() {
        let schema = my_settings();
        let table = bound(
            &schema,
            &[
                ("MyString", "x"),
                ("MyNumber", "5"),
                ("MyBool", "true"),
                ("MyIpAddress", "192.168.1.1"),
            ],
        );

        assert!(validate(&schema, &table).is_empty());
    }

    #[test]
    fn test_default_outside_its_own_range_fails() {
        let schema = my_settings();
        let table = bound(
            &schema,
            &[("MyString", "x"), ("MyBool", "true"), ("MyIpAddress", "10.0.0.1")],
        );

        assert_eq!(table["MyNumber"].as_integer(), Some(19));
        assert_eq!(
            validate(&schema, &table),
            vec![ValidationFailure::new(
                "MyNumber",
                "MyNumber must be between 1 and 10"
            )]
        );
    }

    #[test]
    fn test_all_failures_are_collected() {
        let schema = my_settings();
        let table = bound(&schema, &[("MyIpAddress", "999.1.1.1")]);
        let failures = validate(&schema, &table);

        let fields: Vec<&str> = failures.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["MyString", "MyNumber", "MyBool", "MyIpAddress"]);
        assert_eq!(failures[0].message, "The MyString field is required.");
        assert_eq!(failures[2].message, "Missing config value MyBool");
    }

    #[test]
    fn test_absent_required_field_yields_exactly_one_failure() {
        let schema = Schema::new()
            .field(FieldSpec::string("ConnectionString").rule(Rule::required()))
            .field(FieldSpec::string("Other"));
        let failures = validate(&schema, &bound(&schema, &[("Other", "x")]));

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].field, "ConnectionString");
    }

    #[test]
    fn test_validation_is_idempotent_and_pure() {
        let schema = my_settings();
        let table = bound(&schema, &[("MyNumber", "0")]);
        let before = table.clone();

        let first = validate(&schema, &table);
        let second = validate(&schema, &table);

        assert_eq!(first, second);
        assert_eq!(table, before);
    }

    #[test]
    fn test_nested_failures_use_full_path() {
        let schema = Schema::new().field(FieldSpec::section(
            "Logging",
            Schema::new().field(FieldSpec::string("FilePath").rule(Rule::required())),
        ));
        let failures = validate(&schema, &Table::new());

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].field, "Logging:FilePath");
        assert_eq!(failures[0].message, "The Logging:FilePath field is required.");
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let schema = Schema::new().field(FieldSpec::integer("N").rule(Rule::range(1, 10)));
        for (raw, ok) in [("0", false), ("1", true), ("10", true), ("11", false)] {
            let failures = validate(&schema, &bound(&schema, &[("N", raw)]));
            assert_eq!(failures.is_empty(), ok, "value {raw}");
        }
    }

    #[test]
    fn test_required_on_uri_checks_presence() {
        let schema = Schema::new().field(FieldSpec::uri("MyUri").rule(Rule::required()));

        assert_eq!(validate(&schema, &bound(&schema, &[])).len(), 1);
        assert!(validate(&schema, &bound(&schema, &[("MyUri", "https://a.example")])).is_empty());
    }

    #[test]
    fn test_ipv4_address() {
        assert!(is_ipv4_address("192.168.1.1"));
        assert!(is_ipv4_address("1.0.0.0"));
        assert!(!is_ipv4_address("999.1.1.1"));
        assert!(!is_ipv4_address("0.1.1.1"));
        assert!(!is_ipv4_address("1.2.3"));
        assert!(!is_ipv4_address(""));
    }

    #[test]
    fn test_custom_rules_each_yield_one_failure() {
        struct Endpoint {
            host: String,
            port: i64,
        }

        let rules = vec![
            CustomRule::new("Host", "Valid IP address not supplied for Host", |e: &Endpoint| {
                is_ipv4_address(&e.host)
            }),
            CustomRule::new("Port", "Port must be positive", |e: &Endpoint| e.port > 0),
        ];

        let bad = Endpoint {
            host: "999.1.1.1".into(),
            port: -1,
        };
        let failures = validate_custom(&bad, &rules);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].message, "Valid IP address not supplied for Host");

        let good = Endpoint {
            host: "10.1.2.3".into(),
            port: 80,
        };
        assert!(validate_custom(&good, &rules).is_empty());
    }
}
