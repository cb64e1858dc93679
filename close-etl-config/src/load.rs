//! Hierarchical configuration loading.
//!
//! Configuration is assembled from three layered sources, later sources
//! overriding earlier ones:
//!
//! 1. `configuration/base.yaml` (always required),
//! 2. `configuration/{environment}.yaml` (optional, `dev` or `prod` from
//!    `APP_ENVIRONMENT`, defaulting to `dev`),
//! 3. `APP_`-prefixed environment variables, with `__` separating nested keys
//!    (for example `APP_DESTINATION__BIG_QUERY__PROJECT_ID`).

use std::io;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Directory containing configuration files, relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Name of the environment variable selecting the runtime environment.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

/// Supported runtime environment names.
const ENVIRONMENTS: &[&str] = &["dev", "prod"];

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// Failed to determine the current working directory.
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// The `configuration` directory does not exist.
    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    /// `APP_ENVIRONMENT` is set to an unsupported value.
    #[error("`{0}` is not a supported environment; use `dev` or `prod`")]
    UnsupportedEnvironment(String),

    /// A configuration source failed to load or merge.
    #[error("failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),
}

/// Returns the runtime environment name from `APP_ENVIRONMENT`.
///
/// Defaults to `dev` when the variable is unset. Matching is case-insensitive.
fn environment() -> Result<String, LoadConfigError> {
    let raw = std::env::var(APP_ENVIRONMENT_ENV_NAME).unwrap_or_else(|_| "dev".to_owned());
    let name = raw.to_lowercase();

    if !ENVIRONMENTS.contains(&name.as_str()) {
        return Err(LoadConfigError::UnsupportedEnvironment(raw));
    }

    Ok(name)
}

/// Loads a configuration value of type `T` from the layered sources.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let configuration_directory = base_path.join(CONFIGURATION_DIR);

    if !configuration_directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            configuration_directory,
        ));
    }

    let environment = environment()?;
    let environment_file = configuration_directory.join(format!("{environment}.yaml"));

    let mut builder = config::Config::builder().add_source(
        config::File::from(configuration_directory.join("base.yaml")),
    );

    if environment_file.is_file() {
        builder = builder.add_source(config::File::from(environment_file));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR),
        )
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}
