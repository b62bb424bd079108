use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use serde::Serialize;
use toml::Table;

use super::bind::bind;
use super::env::EnvSource;
use super::error::{ConfigurationErrors, ValidationFailure};
use super::file::FileSource;
use super::merge::merge_until;
use super::options::Options;
use super::remote::RemoteSource;
use super::resolve::resolve_bound_references;
use super::source::{ConfigSource, MemorySource};
use super::validate::{validate, validate_custom, CustomRule};
use super::ConfigError;

/// Builder for loading configuration from layered sources.
///
/// Sources are merged in registration order, with later sources overriding
/// earlier ones key by key. Keys are case-insensitive and `:` or `.`
/// delimited.
///
/// ## Variable References
///
/// Values read from files can reference other config values using
/// `${Section:Key}` syntax. Values from the environment, memory or remote
/// stores are never expanded and are substituted verbatim when referenced.
/// Only the fields being bound are expanded.
///
/// ```toml
/// [Server]
/// Host = "localhost"
/// Port = 8080
/// Url = "http://${Server:Host}:${Server:Port}/api"
/// ```
///
/// Use `$$` to escape a literal `$` (e.g., `$${VAR}` becomes `${VAR}`).
///
/// ## Example
///
/// ```no_run
/// use options_fnd::{Config, FieldSpec, Options, Schema};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct MyConfig {
///     name: String,
///     port: i64,
/// }
///
/// impl Options for MyConfig {
///     fn schema() -> Schema {
///         Schema::new()
///             .field(FieldSpec::string("name"))
///             .field(FieldSpec::integer("port").default(8080))
///     }
/// }
///
/// let config: MyConfig = Config::builder()
///     .with_file("config/default.toml", true)
///     .with_file("config/local.toml", false)
///     .with_env("MYAPP", "__")
///     .build()?;
/// # Ok::<(), options_fnd::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
#[must_use = "builders do nothing until .build() is called"]
pub struct Config {
    sources: Vec<ConfigSource>,
    sections: Vec<String>,
}

impl Config {
    /// Creates a new configuration builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Adds a TOML or JSON file to be loaded.
    ///
    /// If `required` is `true`, the build will fail if the file doesn't exist.
    /// Optional files that are missing are silently skipped.
    pub fn with_file(self, path: impl AsRef<Path>, required: bool) -> Self {
        self.with_source(FileSource::new(path, required))
    }

    /// Loads configuration from environment variables with the given prefix.
    ///
    /// `MYAPP__LOGGING__FILEPATH` with prefix `MYAPP` and separator `__`
    /// sets `Logging:FilePath`. Sources are applied in registration order,
    /// which allows flexible layering:
    ///
    /// ```no_run
    /// # use options_fnd::Config;
    /// // defaults -> env overrides -> local file overrides env
    /// let config = Config::builder()
    ///     .with_file("config/default.toml", true)
    ///     .with_env("MYAPP", "__")
    ///     .with_file("config/local.toml", false);
    /// ```
    pub fn with_env(self, prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        self.with_source(EnvSource::new(prefix, separator))
    }

    /// Adds fixed key/value pairs, e.g. defaults or test overrides.
    pub fn with_values<I, K, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.with_source(MemorySource::new(values))
    }

    /// Adds a remote store, fetched with the source's timeout.
    pub fn with_remote(self, source: RemoteSource) -> Self {
        self.with_source(source)
    }

    pub fn with_source(mut self, source: impl Into<ConfigSource>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Binds from the named section instead of the root.
    ///
    /// Several sections can be bound onto the same options; later sections
    /// override earlier ones for the same field.
    pub fn section(mut self, name: impl Into<String>) -> Self {
        self.sections.push(name.into());
        self
    }

    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    /// Files whose changes should trigger a reload.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.sources
            .iter()
            .filter_map(ConfigSource::watched_path)
            .map(Path::to_path_buf)
            .collect()
    }

    /// Turns this builder into a reusable resolver for `T`.
    pub fn options<T: Options>(self) -> Resolver<T> {
        Resolver {
            config: self,
            configure: Vec::new(),
            snapshot: None,
            rules: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Loads, merges, binds and validates in one pass.
    ///
    /// This performs binding once at build time rather than on each access,
    /// making subsequent config reads zero-cost.
    pub fn build<T: Options>(self) -> Result<T, ConfigError> {
        self.options::<T>().resolve()
    }
}

type Configure<T> = Box<dyn Fn(&mut T) + Send + Sync>;
type Snapshot<T> = fn(&T) -> Result<Table, ConfigError>;

/// One resolution pass for a typed options object, runnable many times.
///
/// A pass reads every source, merges them, selects the configured sections,
/// expands references in the fields about to be bound, binds onto
/// `T::schema()`, applies the configure delegates and finally validates.
/// Binding errors, validation failures and a failed typed conversion are
/// returned together as [`ConfigError::Invalid`].
#[must_use = "a resolver does nothing until .resolve() is called"]
pub struct Resolver<T> {
    config: Config,
    configure: Vec<Configure<T>>,
    snapshot: Option<Snapshot<T>>,
    rules: Vec<CustomRule<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Options> Resolver<T> {
    /// Adjusts the bound instance before it is validated.
    ///
    /// Declarative rules then see the adjusted values, which is why the
    /// options must be serializable to use this.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
        T: Serialize,
    {
        self.configure.push(Box::new(f));
        self.snapshot = Some(snapshot::<T>);
        self
    }

    /// Adds a custom rule over the whole instance.
    pub fn validate_with<F>(
        mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.rules.push(CustomRule::new(field, message, predicate));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolve(&self) -> Result<T, ConfigError> {
        self.resolve_until(&AtomicBool::new(false))
    }

    /// Runs a pass, abandoning it with [`ConfigError::Cancelled`] once
    /// `cancel` is set.
    pub fn resolve_until(&self, cancel: &AtomicBool) -> Result<T, ConfigError> {
        let schema = T::schema();
        schema.check()?;

        let merged = merge_until(&self.config.sources, cancel)?;
        let mut view = if self.config.sections.is_empty() {
            merged.clone()
        } else {
            merged.sections(&self.config.sections)
        };
        resolve_bound_references(&mut view, &merged, &schema)?;

        let bound = bind(&view, &schema);
        let failed: Vec<&str> = bound.errors.iter().map(|e| e.field.as_str()).collect();
        let declarative = |table: &Table| -> Vec<ValidationFailure> {
            validate(&schema, table)
                .into_iter()
                .filter(|failure| !failed.contains(&failure.field.as_str()))
                .collect()
        };

        let mut validation;
        let mut conversion = None;
        let instance = match toml::Value::Table(bound.table.clone()).try_into::<T>() {
            Ok(mut instance) => {
                for configure in &self.configure {
                    configure(&mut instance);
                }
                validation = match self.snapshot {
                    Some(snapshot) if !self.configure.is_empty() => declarative(&snapshot(&instance)?),
                    _ => declarative(&bound.table),
                };
                validation.extend(instance.validate());
                validation.extend(validate_custom(&instance, &self.rules));
                Some(instance)
            }
            Err(e) => {
                validation = declarative(&bound.table);
                if bound.errors.is_empty() && validation.is_empty() {
                    return Err(ConfigError::Deserialize(e));
                }
                log::debug!("skipping custom rules for {}: {e}", T::type_name());
                conversion = Some(e.to_string());
                None
            }
        };

        let problems = ConfigurationErrors {
            type_name: T::type_name().to_string(),
            binding: bound.errors,
            validation,
            conversion,
        };

        match instance {
            Some(instance) if problems.is_empty() => {
                log::debug!("resolved {} from {} sources", T::type_name(), self.config.sources.len());
                Ok(instance)
            }
            _ => Err(ConfigError::Invalid(problems)),
        }
    }
}

fn snapshot<T: Serialize>(instance: &T) -> Result<Table, ConfigError> {
    match toml::Value::try_from(instance)? {
        toml::Value::Table(table) => Ok(table),
        other => Err(ConfigError::InvalidSchema {
            field: String::new(),
            reason: format!("options serialize to a {} instead of a table", other.type_str()),
        }),
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .field("configure", &self.configure.len())
            .field("rules", &self.rules)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{FieldSpec, Rule, Schema, Uri};
    use serde::{Deserialize, Serialize};
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use tempfile::NamedTempFile;

    #[derive(Debug, Deserialize, Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct Service {
        name: String,
        port: i64,
        enabled: bool,
        endpoint: Option<Uri>,
        logging: Logging,
    }

    #[derive(Debug, Deserialize, Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct Logging {
        file_path: String,
    }

    impl Options for Service {
        fn schema() -> Schema {
            Schema::new()
                .field(FieldSpec::string("Name").rule(Rule::required()))
                .field(FieldSpec::integer("Port").default(8080).rule(Rule::range(1, 65535)))
                .field(FieldSpec::boolean("Enabled").default(true))
                .field(FieldSpec::uri("Endpoint"))
                .field(FieldSpec::section(
                    "Logging",
                    Schema::new().field(FieldSpec::string("FilePath").default("app.log")),
                ))
        }
    }

    #[test]
    fn test_build_layers_file_and_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            Name = "from file"
            Port = 9000

            [Logging]
            FilePath = "/var/log/${{Name}}.log"
            "#
        )
        .unwrap();

        let service: Service = Config::builder()
            .with_file(file.path(), true)
            .with_values([("name", "svc"), ("Endpoint", "https://svc.example")])
            .build()
            .unwrap();

        assert_eq!(service.name, "svc");
        assert_eq!(service.port, 9000);
        assert!(service.enabled);
        assert_eq!(service.endpoint.unwrap().as_str(), "https://svc.example");
        assert_eq!(service.logging.file_path, "/var/log/svc.log");
    }

    #[test]
    fn test_sections_are_bound_onto_one_object() {
        let service: Service = Config::builder()
            .with_values([
                ("Defaults:Name", "base"),
                ("Defaults:Port", "81"),
                ("Overrides:Name", "override"),
            ])
            .section("Defaults")
            .section("Overrides")
            .build()
            .unwrap();

        assert_eq!(service.name, "override");
        assert_eq!(service.port, 81);
    }

    #[test]
    fn test_configure_runs_before_validation() {
        let service = Config::builder()
            .options::<Service>()
            .configure(|s| s.name = "Value added via delegate".into())
            .resolve()
            .unwrap();

        assert_eq!(service.name, "Value added via delegate");
    }

    #[test]
    fn test_configure_cannot_hide_a_rule_violation() {
        let err = Config::builder()
            .with_values([("Name", "svc")])
            .options::<Service>()
            .configure(|s| s.port = 0)
            .resolve()
            .unwrap_err();

        assert_eq!(err.problems().unwrap().fields(), vec!["Port"]);
    }

    #[test]
    fn test_binding_and_validation_errors_are_aggregated() {
        let err = Config::builder()
            .with_values([("Port", "eighty"), ("Enabled", "maybe"), ("Name", "")])
            .options::<Service>()
            .validate_with("Port", "Port must not be 8080", |s| s.port != 8080)
            .resolve()
            .unwrap_err();

        let problems = err.problems().unwrap();
        assert_eq!(problems.binding.len(), 2);
        assert_eq!(problems.type_name, "Service");
        assert_eq!(problems.fields(), vec!["Port", "Enabled", "Name", "Port"]);
        assert!(err.to_string().starts_with("found configuration error(s) in Service: "));
    }

    #[test]
    fn test_invalid_schema_fails_before_reading_sources() {
        #[derive(Debug, Deserialize)]
        struct Broken {}

        impl Options for Broken {
            fn schema() -> Schema {
                Schema::new().field(FieldSpec::integer("N").rule(Rule::range(5, 1)))
            }
        }

        let result = Config::builder()
            .with_file("/nonexistent/config.toml", true)
            .build::<Broken>();
        assert!(matches!(result, Err(ConfigError::InvalidSchema { .. })));
    }

    #[test]
    fn test_schema_and_type_mismatch_is_a_deserialize_error() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Mismatch {
            missing: String,
        }

        impl Options for Mismatch {
            fn schema() -> Schema {
                Schema::new().field(FieldSpec::string("Present"))
            }
        }

        let result = Config::builder().build::<Mismatch>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn test_source_failure_is_returned() {
        let result = Config::builder()
            .with_file("/nonexistent/config.toml", true)
            .build::<Service>();

        let err = result.unwrap_err();
        assert!(err.is_source_unavailable());
    }

    #[test]
    fn test_cancelled_pass() {
        let resolver = Config::builder().with_values([("Name", "x")]).options::<Service>();
        let cancel = AtomicBool::new(false);
        cancel.store(true, Ordering::Release);

        assert!(matches!(
            resolver.resolve_until(&cancel),
            Err(ConfigError::Cancelled)
        ));
    }

    struct Vault(Vec<(&'static str, &'static str)>);

    impl crate::config::RemoteStore for Vault {
        fn name(&self) -> &str {
            "vault"
        }

        fn fetch(&self) -> Result<Vec<(String, String)>, crate::config::RemoteError> {
            Ok(self.0.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
        }
    }

    #[test]
    fn test_remote_values_bind_verbatim() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[Logging]\nFilePath = \"/logs/${{Name}}.log\"").unwrap();

        let service: Service = Config::builder()
            .with_file(file.path(), true)
            .with_remote(RemoteSource::new(Vault(vec![("Name", "pa$$word ${Port}")])))
            .build()
            .unwrap();

        assert_eq!(service.name, "pa$$word ${Port}");
        assert_eq!(service.logging.file_path, "/logs/pa$$word ${Port}.log");
    }

    #[test]
    fn test_unbound_references_do_not_fail_the_pass() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [Svc]
            Name = "svc"
            Scratch = "${{Nowhere}}"

            [Other]
            Loop = "${{Other:Loop}}"
            "#
        )
        .unwrap();
        let env = EnvSource::new("", "__")
            .with_vars([("PROMPT_COMMAND", "echo ${UNSET_THING}"), ("Svc__Port", "81")]);

        let service: Service = Config::builder()
            .with_file(file.path(), true)
            .with_source(env)
            .section("Svc")
            .build()
            .unwrap();

        assert_eq!(service.name, "svc");
        assert_eq!(service.port, 81);
    }

    #[test]
    fn test_bound_reference_to_missing_key_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Name = \"${{Nowhere}}\"").unwrap();

        let result = Config::builder().with_file(file.path(), true).build::<Service>();
        assert!(matches!(result, Err(ConfigError::ReferenceNotFound(_))));
    }

    #[test]
    fn test_conversion_failure_is_aggregated_with_other_problems() {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "PascalCase")]
        #[allow(dead_code)]
        struct Listener {
            name: String,
            port: u16,
        }

        impl Options for Listener {
            fn schema() -> Schema {
                Schema::new()
                    .field(FieldSpec::string("Name").rule(Rule::required()))
                    .field(FieldSpec::integer("Port"))
            }
        }

        let err = Config::builder()
            .with_values([("Port", "70000")])
            .build::<Listener>()
            .unwrap_err();

        let problems = err.problems().unwrap();
        assert_eq!(problems.fields(), vec!["Name"]);
        assert!(problems.conversion.as_deref().unwrap().contains("70000"));
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn test_watched_paths_lists_file_sources() {
        let config = Config::builder()
            .with_file("a.toml", true)
            .with_env("APP", "__")
            .with_file("b.json", false);

        assert_eq!(
            config.watched_paths(),
            vec![PathBuf::from("a.toml"), PathBuf::from("b.json")]
        );
    }
}
