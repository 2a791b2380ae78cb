//! CLI route: run context and the single command dispatch table.

use crate::clock::SystemClock;
use crate::cli::parse::Commands;
use crate::cli::presentation::{format_json, format_stats_text, format_types_text};
use crate::config::{CapesConfig, ConfigLoader};
use crate::content::FileContentStore;
use crate::identity::MojangResolver;
use crate::provider::ProviderRegistry;
use crate::record::SledRecordStore;
use crate::resolver::{CapeResolver, ResolverSettings};
use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Runtime context for CLI execution: effective config and a wired resolver.
pub struct RunContext {
    config: CapesConfig,
    resolver: CapeResolver,
}

impl RunContext {
    /// Load configuration and open the stores under `root`.
    pub fn new(root: PathBuf, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = Self::load_config(&root, config_path.as_deref())?;
        let resolver = Self::build_resolver(&config, &root)?;
        Ok(Self { config, resolver })
    }

    pub fn load_config(root: &Path, config_path: Option<&Path>) -> anyhow::Result<CapesConfig> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ConfigLoader::load(root).context("Failed to load configuration")?,
        };
        Ok(config.validated()?)
    }

    fn build_resolver(config: &CapesConfig, root: &Path) -> anyhow::Result<CapeResolver> {
        let records_dir = config.storage.records_dir(root);
        let content_dir = config.storage.content_dir(root);
        std::fs::create_dir_all(&content_dir).with_context(|| {
            format!("Failed to create content directory {}", content_dir.display())
        })?;

        let records = SledRecordStore::new(&records_dir)?;
        let content = FileContentStore::new(&content_dir);
        let identity =
            MojangResolver::from_config(&config.identity, config.resolver.upstream_timeout())?;
        let providers = ProviderRegistry::from_config(config)?;
        info!(
            records = %records_dir.display(),
            content = %content_dir.display(),
            types = ?providers.type_names(),
            "Opened cape stores"
        );

        Ok(CapeResolver::new(
            Arc::new(records),
            Arc::new(content),
            Arc::new(identity),
            providers,
            Arc::new(SystemClock),
            ResolverSettings::from(&config.resolver),
        ))
    }

    pub fn resolver(&self) -> &CapeResolver {
        &self.resolver
    }

    pub async fn execute(&self, command: &Commands) -> anyhow::Result<String> {
        match command {
            Commands::Resolve { player, cape_type } => match cape_type {
                Some(cape_type) => {
                    let info = self.resolver.resolve(cape_type, player).await?;
                    Ok(format_json(&info)?)
                }
                None => {
                    let all = self.resolver.resolve_all(player).await?;
                    Ok(format_json(&all)?)
                }
            },
            Commands::History { player, cape_type } => {
                let history = self.resolver.history(cape_type.as_deref(), player).await?;
                Ok(format_json(&history)?)
            }
            Commands::Get { record_id } => match self.resolver.get(record_id).await? {
                Some(info) => Ok(format_json(&info)?),
                None => bail!("No record with id {}", record_id),
            },
            Commands::Image {
                hash,
                transform,
                out,
            } => {
                let Some(bytes) = self.resolver.image(hash, transform.as_deref()).await? else {
                    bail!("No stored image for {}", hash);
                };
                tokio::fs::write(out, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", out.display()))?;
                Ok(format!("Wrote {} bytes to {}", bytes.len(), out.display()))
            }
            Commands::Types => Ok(format_types_text(&self.resolver.types())),
            Commands::Stats { format } => {
                let stats = self.resolver.stats().await?;
                match format.as_str() {
                    "json" => Ok(format_json(&stats)?),
                    "text" => Ok(format_stats_text(&stats)),
                    other => bail!("Invalid format: {} (must be 'text' or 'json')", other),
                }
            }
            Commands::Config => Ok(self.config.to_toml()?),
        }
    }
}
