use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Base configuration file loaded for all environments.
const BASE_CONFIG_FILE: &str = "base.yaml";

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
///
/// Example: `APP_FEED__PAGE_SIZE` sets the `feed.page_size` field.
const ENV_SEPARATOR: &str = "__";

/// Separator for list elements in environment variables.
///
/// Example: `APP_FEED__TARGETS=shop.orders,shop.users` sets the `feed.targets` list.
const LIST_SEPARATOR: &str = ",";

/// Errors that can occur while loading a configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("failed to parse APP_ENVIRONMENT: {0}")]
    Environment(#[source] std::io::Error),

    #[error("failed to build the configuration: {0}")]
    Config(#[from] config::ConfigError),
}

/// Trait defining the keys that must be parsed as lists when read from environment variables.
pub trait Config {
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Loads hierarchical configuration from the `configuration` directory of the working directory.
///
/// Sources are merged in this order:
/// 1. `configuration/base.yaml`
/// 2. `configuration/{environment}.yaml`
/// 3. environment variables prefixed with `APP`
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    load_config_from(&base_path.join(CONFIGURATION_DIR), &environment)
}

/// Loads hierarchical configuration from an explicit directory and environment.
pub fn load_config_from<T>(
    configuration_directory: &Path,
    environment: &Environment,
) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let environment_filename = format!("{environment}.yaml");

    let mut environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if !<T as Config>::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source
            .try_parsing(true)
            .list_separator(LIST_SEPARATOR);

        for key in <T as Config>::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join(BASE_CONFIG_FILE),
        ))
        // The environment file is optional so that a single base file is enough for local runs.
        .add_source(
            config::File::from(configuration_directory.join(environment_filename)).required(false),
        )
        .add_source(environment_source)
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}
