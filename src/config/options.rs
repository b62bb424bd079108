use serde::de::DeserializeOwned;

use super::error::ValidationFailure;
use super::schema::Schema;

/// A strongly-typed settings object bound from configuration.
///
/// The schema drives binding and the declarative rules; its field names must
/// match the type's serde field names. `validate` is the hook for checks
/// spanning the whole instance.
///
/// ```
/// use options_fnd::{is_ipv4_address, FieldSpec, Options, Rule, Schema, ValidationFailure};
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// #[serde(rename_all = "PascalCase")]
/// struct ServerSettings {
///     bind_address: String,
///     port: i64,
/// }
///
/// impl Options for ServerSettings {
///     fn schema() -> Schema {
///         Schema::new()
///             .field(FieldSpec::string("BindAddress"))
///             .field(FieldSpec::integer("Port").default(8080).rule(Rule::range(1, 65535)))
///     }
///
///     fn validate(&self) -> Vec<ValidationFailure> {
///         if is_ipv4_address(&self.bind_address) {
///             Vec::new()
///         } else {
///             vec![ValidationFailure::new("BindAddress", "BindAddress must be an IPv4 address")]
///         }
///     }
/// }
/// ```
pub trait Options: DeserializeOwned + Send + Sync + 'static {
    fn schema() -> Schema;

    fn validate(&self) -> Vec<ValidationFailure> {
        Vec::new()
    }

    /// Name used in aggregated error messages.
    fn type_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}
