//! Configuration loading
//!
//! An optional TOML file overlaid with `AMNIS__*` environment variables,
//! e.g. `AMNIS__NODE_URL` or `AMNIS__RETRY__MAX_BACKOFF_MS`.

use config::{Config, Environment, File};
use std::env;

use amnis_core::AmnisConfig;

const DEFAULT_CONFIG_PATH: &str = "config/amnis.toml";

pub fn config_path() -> String {
    env::var("AMNIS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

pub fn load(path: &str) -> anyhow::Result<AmnisConfig> {
    load_with_prefix(path, "AMNIS")
}

fn load_with_prefix(path: &str, env_prefix: &str) -> anyhow::Result<AmnisConfig> {
    let settings = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: AmnisConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
