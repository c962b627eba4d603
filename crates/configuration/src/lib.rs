use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod credentials;
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use credentials::CredentialStore;
pub use settings::{
    AdmissionSettings, BrokerSettings, ClientSettings, Config, CredentialSettings, DerivSettings,
    DurationPolicy, EventLogSettings, LateTradePolicy, LoggingSettings, MasterSettings,
    PaperSettings, SupervisorSettings,
};

/// File read when no explicit path is given. It may be absent.
pub const DEFAULT_CONFIG_FILE: &str = "copytrader.toml";

/// Prefix of environment overrides, e.g. `COPYTRADER__CLIENT__WORKERS=4`.
pub const ENV_PREFIX: &str = "COPYTRADER";

/// Loads the application configuration.
///
/// An explicit `path` must exist. Without one, `copytrader.toml` in the working
/// directory is used if present. Environment variables are layered on top and the
/// result is validated before it is returned.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };
    let builder = config::Config::builder()
        .add_source(file)
        .add_source(environment());
    let config = finish(builder)?;
    tracing::debug!(
        file = %path.map_or_else(|| DEFAULT_CONFIG_FILE.into(), |p| p.display().to_string()),
        master = config.master.broker.kind(),
        client = config.client.broker.kind(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Same as [`load_config`] but reads the TOML document from a string.
pub fn load_config_from_str(toml: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .add_source(environment());
    finish(builder)
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
}

fn finish(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<Config, ConfigError> {
    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.build()?.try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}
