//! Resolves `MySettings` from a file, the environment and a secret store.
//!
//! Run with `RUST_LOG=debug cargo run --example options_demo` from the crate
//! root. Setting `OPTIONS_DEMO__MYSETTINGS__MYNUMBER=42` shows a validation
//! failure.

use std::time::Duration;

use options_fnd::{
    is_ipv4_address, Config, FieldSpec, Options, RemoteError, RemoteSource, RemoteStore, Rule,
    Schema, SettingsAccessor, Uri, ValidationFailure,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MySettings {
    my_string: String,
    my_number: i64,
    my_uri: Option<Uri>,
    my_bool: bool,
    my_ip_address: String,
    my_env_string: String,
    my_secret_string: String,
}

impl Options for MySettings {
    fn schema() -> Schema {
        Schema::new()
            .field(FieldSpec::string("MyString").rule(Rule::required()))
            .field(
                FieldSpec::integer("MyNumber")
                    .default(19)
                    .rule(Rule::range(1, 10).message("MyNumber must be between 1 and 10")),
            )
            .field(FieldSpec::uri("MyUri"))
            .field(
                FieldSpec::boolean("MyBool")
                    .rule(Rule::must_be_true().message("Missing config value MyBool")),
            )
            .field(FieldSpec::string("MyIpAddress"))
            .field(FieldSpec::string("MyEnvString"))
            .field(FieldSpec::string("MySecretString"))
    }

    fn validate(&self) -> Vec<ValidationFailure> {
        if is_ipv4_address(&self.my_ip_address) {
            Vec::new()
        } else {
            vec![ValidationFailure::new(
                "MyIpAddress",
                "Valid IP address not supplied for MyIpAddress",
            )]
        }
    }
}

/// Stands in for a secret vault that cannot store `:` in secret names.
struct LocalVault;

impl RemoteStore for LocalVault {
    fn name(&self) -> &str {
        "local-vault"
    }

    fn fetch(&self) -> Result<Vec<(String, String)>, RemoteError> {
        Ok(vec![
            ("Test-MySettings--MySecretString".into(), "s3cr3t".into()),
            ("Prod-MySettings--MySecretString".into(), "not for this environment".into()),
        ])
    }
}

fn main() {
    env_logger::init();

    let config = Config::builder()
        .with_file("demos/appsettings.toml", false)
        .with_env("OPTIONS_DEMO", "__")
        .with_remote(
            RemoteSource::new(LocalVault)
                .with_timeout(Duration::from_secs(2))
                .with_secret_prefix("Test"),
        )
        .section("MySettings");

    let settings = match SettingsAccessor::<MySettings>::from_config(config) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    settings.on_change(|s| log::info!("settings changed: MyNumber = {}", s.my_number));

    let current = settings.current();
    println!("MyString:         {}", current.my_string);
    println!("MyNumber:         {}", current.my_number);
    println!(
        "MyUri:            {}",
        current.my_uri.as_ref().map_or("<unset>", Uri::as_str)
    );
    println!("MyBool:           {}", current.my_bool);
    println!("MyIpAddress:      {}", current.my_ip_address);
    println!("MyEnvString:      {}", current.my_env_string);
    println!("MySecretString:   {}", current.my_secret_string);

    if let Err(e) = settings.reload() {
        log::warn!("reload failed: {e}");
    }
    settings.shutdown();
}
