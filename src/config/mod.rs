//! Configuration loading, binding and validation.

mod bind;
mod builder;
mod env;
mod error;
mod file;
mod key;
mod merge;
mod options;
mod remote;
mod resolve;
mod schema;
mod source;
mod validate;

pub use bind::{bind, Bound};
pub use builder::{Config, Resolver};
pub use env::EnvSource;
pub use error::{BindingError, ConfigError, ConfigurationErrors, ValidationFailure};
pub use file::{FileFormat, FileSource};
pub use key::Key;
pub use merge::{merge, merge_until, MergedConfig};
pub use options::Options;
pub use remote::{RemoteError, RemoteSource, RemoteStore, DEFAULT_REMOTE_TIMEOUT};
pub use resolve::resolve_bound_references;
pub use schema::{DefaultValue, FieldKind, FieldSpec, InvalidUri, Pattern, Rule, Schema, Uri, IPV4_PATTERN};
pub use source::{ConfigSource, MemorySource, RawConfigEntry};
pub use validate::{is_ipv4_address, validate, validate_custom, CustomRule};
