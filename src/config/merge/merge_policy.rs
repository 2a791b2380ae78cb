//! Merge rules: defaults sit underneath every other source.

use crate::config::CapesConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder seeded with the built-in defaults.
///
/// Maps merge key by key, so a file that adds a provider keeps the default
/// providers; disabling one takes `enabled = false`.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&CapesConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
