use crate::config::merge::merge_policy;
use crate::config::sources::{env, global_file, workspace_file};
use crate::config::CapesConfig;
use config::{Config, ConfigError, File};
use std::path::{Path, PathBuf};

/// Loads [`CapesConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace rooted at `workspace_root`.
    pub fn load(workspace_root: &Path) -> Result<CapesConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = env::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Load a single file over the defaults, ignoring every other source.
    pub fn load_from_file(path: &Path) -> Result<CapesConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()
    }

    pub fn xdg_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    /// Built-in defaults alone.
    pub fn defaults() -> Result<CapesConfig, ConfigError> {
        Config::try_from(&CapesConfig::default())?.try_deserialize()
    }
}
