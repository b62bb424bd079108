//! Binding of merged key/value pairs onto a schema.

use toml::{Table, Value};

use super::error::BindingError;
use super::key::Key;
use super::merge::MergedConfig;
use super::schema::{field_path, DefaultValue, FieldKind, FieldSpec, Schema, Uri};

/// The outcome of binding: a typed value tree plus every conversion failure.
///
/// The table is keyed by schema field names as written, so it deserializes
/// into a struct whose serde names match the schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bound {
    pub table: Table,
    pub errors: Vec<BindingError>,
}

impl Bound {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Binds `merged` onto `schema`.
///
/// Binding is best effort: a value that does not convert is reported and the
/// field falls back to its default (or zero value) so every sibling is still
/// bound. Absent fields are never an error here.
pub fn bind(merged: &MergedConfig, schema: &Schema) -> Bound {
    let mut bound = Bound::default();
    bind_into(merged, &Key::default(), "", schema, &mut bound.table, &mut bound.errors);
    bound
}

fn bind_into(
    merged: &MergedConfig,
    prefix: &Key,
    path: &str,
    schema: &Schema,
    table: &mut Table,
    errors: &mut Vec<BindingError>,
) {
    for field in schema.fields() {
        let key = prefix.join(field.name());
        let full_name = field_path(path, field.name());

        if let FieldKind::Section(nested) = field.kind() {
            let mut sub = Table::new();
            bind_into(merged, &key, &full_name, nested, &mut sub, errors);
            table.insert(field.name().to_string(), Value::Table(sub));
            continue;
        }

        let raw = merged
            .get_key(&key)
            .filter(|raw| matches!(field.kind(), FieldKind::String) || !raw.trim().is_empty());

        let value = match raw {
            Some(raw) => match parse_scalar(field.kind(), raw) {
                Some(value) => Some(value),
                None => {
                    errors.push(BindingError {
                        field: full_name,
                        value: raw.to_string(),
                        expected: field.kind().name(),
                    });
                    fallback(field)
                }
            },
            None => fallback(field),
        };

        if let Some(value) = value {
            table.insert(field.name().to_string(), value);
        }
    }
}

/// Default if declared, else the type's zero value. URIs have no zero value
/// and stay absent.
fn fallback(field: &FieldSpec) -> Option<Value> {
    if let Some(default) = &field.default {
        return Some(match default {
            DefaultValue::String(s) => Value::String(s.clone()),
            DefaultValue::Integer(i) => Value::Integer(*i),
            DefaultValue::Boolean(b) => Value::Boolean(*b),
            DefaultValue::Uri(uri) => Value::String(uri.to_string()),
        });
    }
    match field.kind() {
        FieldKind::String => Some(Value::String(String::new())),
        FieldKind::Integer => Some(Value::Integer(0)),
        FieldKind::Boolean => Some(Value::Boolean(false)),
        FieldKind::Uri | FieldKind::Section(_) => None,
    }
}

fn parse_scalar(kind: &FieldKind, raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    match kind {
        FieldKind::String => Some(Value::String(raw.to_string())),
        FieldKind::Integer => trimmed.parse::<i64>().ok().map(Value::Integer),
        FieldKind::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") {
                Some(Value::Boolean(true))
            } else if trimmed.eq_ignore_ascii_case("false") {
                Some(Value::Boolean(false))
            } else {
                None
            }
        }
        FieldKind::Uri => Uri::parse(trimmed)
            .ok()
            .map(|uri| Value::String(uri.to_string())),
        FieldKind::Section(_) => None,
    }
}
