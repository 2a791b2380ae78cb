//! Cape Provider Abstraction
//!
//! Each supported cape type is backed by a [`ProviderFetcher`] that knows how
//! to obtain the raw cape bytes for a resolved player and declares static
//! capability metadata (crop regions, animation support). Fetchers are
//! registered once at startup in a [`ProviderRegistry`] that is handed to the
//! resolver.

use crate::config::CapesConfig;
use crate::content::{is_valid_variant_name, ANIMATED_VARIANT, STILL_VARIANT};
use crate::error::ResolveError;
use crate::types::{CapeType, Dimensions, PlayerIdentity};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A crop rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Static layout and animation metadata of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Width / height of a single animation frame.
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f32,

    /// Crop regions are expressed against `coordinate_base` and scale with
    /// the actual image size.
    #[serde(default)]
    pub dynamic_coordinates: bool,

    #[serde(default)]
    pub supports_animation: bool,

    /// Delay between animation frames.
    #[serde(default = "default_frame_delay_ms")]
    pub frame_delay_ms: u32,

    #[serde(default = "default_coordinate_base")]
    pub coordinate_base: Dimensions,

    /// Named transforms (e.g. `front`, `back`) and their crop regions.
    #[serde(default)]
    pub transforms: BTreeMap<String, CropRect>,
}

fn default_aspect_ratio() -> f32 {
    2.0
}

fn default_coordinate_base() -> Dimensions {
    Dimensions::new(64, 32)
}

fn default_frame_delay_ms() -> u32 {
    100
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            transforms: BTreeMap::new(),
            aspect_ratio: default_aspect_ratio(),
            dynamic_coordinates: false,
            coordinate_base: default_coordinate_base(),
            supports_animation: false,
            frame_delay_ms: default_frame_delay_ms(),
        }
    }
}

impl ProviderCapabilities {
    pub fn transform_names(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.aspect_ratio.is_finite() && self.aspect_ratio > 0.0) {
            return Err(format!("aspect_ratio must be positive, got {}", self.aspect_ratio));
        }
        if self.coordinate_base.is_empty() {
            return Err("coordinate_base must be non-zero".to_string());
        }
        for (name, rect) in &self.transforms {
            if !is_valid_variant_name(name) {
                return Err(format!("invalid transform name '{}'", name));
            }
            if name == STILL_VARIANT || name == ANIMATED_VARIANT {
                return Err(format!("transform name '{}' is reserved", name));
            }
            if rect.width == 0 || rect.height == 0 {
                return Err(format!("transform '{}' has an empty crop region", name));
            }
        }
        Ok(())
    }
}

/// Cape fetcher for one provider type
#[async_trait]
pub trait ProviderFetcher: Send + Sync {
    /// Raw cape bytes, or `None` when the provider confirms there is no cape.
    async fn fetch(&self, player: &PlayerIdentity) -> Result<Option<Vec<u8>>, ResolveError>;

    fn capabilities(&self) -> &ProviderCapabilities;
}

/// Provider configuration as loaded from config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// URL template; `{name}`, `{id}` and `{dashed_id}` are substituted.
    pub url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub capabilities: ProviderCapabilities,
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(format!("url must be http(s), got '{}'", self.url));
        }
        if !["{name}", "{id}", "{dashed_id}"]
            .iter()
            .any(|p| self.url.contains(p))
        {
            return Err("url must contain {name}, {id} or {dashed_id}".to_string());
        }
        self.capabilities.validate()
    }
}

/// Built-in provider set used when no providers are configured.
pub fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let mut transforms = BTreeMap::new();
    transforms.insert("front".to_string(), CropRect::new(1, 1, 10, 16));
    transforms.insert("back".to_string(), CropRect::new(12, 1, 10, 16));

    let mut providers = BTreeMap::new();
    providers.insert(
        "optifine".to_string(),
        ProviderConfig {
            url: "http://s.optifine.net/capes/{name}.png".to_string(),
            enabled: true,
            capabilities: ProviderCapabilities {
                transforms,
                aspect_ratio: 2.0,
                dynamic_coordinates: true,
                coordinate_base: Dimensions::new(46, 22),
                supports_animation: false,
                frame_delay_ms: default_frame_delay_ms(),
            },
        },
    );
    providers
}

// Helper function to map HTTP errors to ResolveError
pub(crate) fn map_http_error(error: reqwest::Error, operation: &str) -> ResolveError {
    if error.is_timeout() {
        ResolveError::UpstreamFetchFailure(format!("{}: request timeout: {}", operation, error))
    } else if error.is_connect() {
        ResolveError::UpstreamFetchFailure(format!("{}: connection error: {}", operation, error))
    } else {
        ResolveError::UpstreamFetchFailure(format!("{}: HTTP error: {}", operation, error))
    }
}

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared HTTP client for identity and provider calls.
pub(crate) fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, ResolveError> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .map_err(|e| ResolveError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Fetcher that GETs a per-player URL; 404/204 means "no cape".
pub struct HttpProviderFetcher {
    client: Client,
    cape_type: CapeType,
    url_template: String,
    capabilities: ProviderCapabilities,
}

impl HttpProviderFetcher {
    pub fn new(
        client: Client,
        cape_type: CapeType,
        url_template: String,
        capabilities: ProviderCapabilities,
    ) -> Self {
        Self {
            client,
            cape_type,
            url_template,
            capabilities,
        }
    }

    pub fn url_for(&self, player: &PlayerIdentity) -> String {
        self.url_template
            .replace("{name}", &player.name)
            .replace("{dashed_id}", &player.id.dashed())
            .replace("{id}", player.id.as_str())
    }
}

#[async_trait]
impl ProviderFetcher for HttpProviderFetcher {
    async fn fetch(&self, player: &PlayerIdentity) -> Result<Option<Vec<u8>>, ResolveError> {
        let url = self.url_for(player);
        let operation = format!("{} fetch", self.cape_type);
        debug!(cape_type = %self.cape_type, url = %url, "Fetching cape");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_http_error(e, &operation))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Ok(None),
            status if !status.is_success() => {
                return Err(ResolveError::UpstreamFetchFailure(format!(
                    "{} returned status {}",
                    operation, status
                )));
            }
            _ => {}
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_http_error(e, &operation))?;
        if bytes.is_empty() {
            Ok(None)
        } else {
            Ok(Some(bytes.to_vec()))
        }
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }
}

/// Registry of enabled providers, built once at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<CapeType, Arc<dyn ProviderFetcher>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cape_type: CapeType, fetcher: Arc<dyn ProviderFetcher>) {
        self.providers.insert(cape_type, fetcher);
    }

    /// Build HTTP fetchers for every enabled provider in the configuration.
    pub fn from_config(config: &CapesConfig) -> Result<Self, ResolveError> {
        let client = build_http_client(
            &config.identity.user_agent,
            Duration::from_millis(config.resolver.upstream_timeout_ms),
        )?;

        let mut registry = Self::new();
        for (name, provider) in config.providers.iter().filter(|(_, p)| p.enabled) {
            let cape_type = CapeType::new(name.clone())?;
            let fetcher = HttpProviderFetcher::new(
                client.clone(),
                cape_type.clone(),
                provider.url.clone(),
                provider.capabilities.clone(),
            );
            registry.register(cape_type, Arc::new(fetcher));
        }
        Ok(registry)
    }

    /// Look up a requested type name, failing with `UnsupportedType`.
    pub fn resolve_type(
        &self,
        name: &str,
    ) -> Result<(CapeType, Arc<dyn ProviderFetcher>), ResolveError> {
        self.providers
            .iter()
            .find(|(cape_type, _)| cape_type.as_str() == name)
            .map(|(cape_type, fetcher)| (cape_type.clone(), Arc::clone(fetcher)))
            .ok_or_else(|| ResolveError::UnsupportedType {
                requested: name.to_string(),
                supported: self.type_names(),
            })
    }

    pub fn get(&self, cape_type: &CapeType) -> Option<&Arc<dyn ProviderFetcher>> {
        self.providers.get(cape_type)
    }

    pub fn capabilities(&self, cape_type: &CapeType) -> Option<&ProviderCapabilities> {
        self.providers.get(cape_type).map(|f| f.capabilities())
    }

    pub fn types(&self) -> Vec<CapeType> {
        self.providers.keys().cloned().collect()
    }

    pub fn type_names(&self) -> Vec<String> {
        self.providers.keys().map(|t| t.as_str().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
