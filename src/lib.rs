//! Typed options bound from layered configuration sources.
//!
//! Sources are merged key by key, bound onto a [`Schema`], validated, and
//! served through a [`SettingsAccessor`] that can reload without ever
//! exposing an invalid instance.

pub mod config;
mod settings;
mod sync;

pub use config::{
    is_ipv4_address, BindingError, Config, ConfigError, ConfigSource, ConfigurationErrors,
    CustomRule, DefaultValue, EnvSource, FieldKind, FieldSpec, FileFormat, FileSource, Key,
    MemorySource, MergedConfig, Options, RemoteError, RemoteSource, RemoteStore, Resolver, Rule,
    Schema, Uri, ValidationFailure,
};
#[cfg(feature = "watch")]
pub use settings::ConfigWatcher;
pub use settings::{GlobalSettings, ResolutionState, SettingsAccessor};
