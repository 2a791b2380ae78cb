//! Configuration System
//!
//! Layered configuration for the resolver, its storage and its upstreams.
//! Sources, lowest to highest precedence: built-in defaults, the global file
//! (`$XDG_CONFIG_HOME/capes/config.toml`), workspace `config/config.toml`,
//! `config/{CAPES_ENV}.toml`, then `CAPES__SECTION__KEY` environment variables.

use crate::content::is_valid_variant_name;
use crate::error::ResolveError;
use crate::types::CapeType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crate::logging::LoggingConfig;
pub use crate::provider::{default_providers, ProviderConfig};

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapesConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    /// Cape providers keyed by type name
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for CapesConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            storage: StorageConfig::default(),
            identity: IdentityConfig::default(),
            providers: default_providers(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Resolution engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Records younger than this are served without contacting upstreams.
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,

    /// Bound on every identity, provider and content store call.
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    /// Wait after uploads settle before a new record is written.
    #[serde(default)]
    pub publish_delay_ms: u64,

    /// Share one in-flight resolution per (type, player).
    #[serde(default = "default_true")]
    pub coalesce_requests: bool,

    /// Prefix of the URLs in the read model.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_freshness_window_secs() -> u64 {
    600
}

fn default_upstream_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_public_base_url() -> String {
    "https://api.capes.dev".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: default_freshness_window_secs(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
            publish_delay_ms: 0,
            coalesce_requests: true,
            public_base_url: default_public_base_url(),
        }
    }
}

impl ResolverConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn publish_delay(&self) -> Duration {
        Duration::from_millis(self.publish_delay_ms)
    }
}

/// Storage locations; relative paths resolve against the workspace root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,

    #[serde(default = "default_content_path")]
    pub content_path: PathBuf,
}

fn default_records_path() -> PathBuf {
    PathBuf::from(".capes/records")
}

fn default_content_path() -> PathBuf {
    PathBuf::from(".capes/content")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            records_path: default_records_path(),
            content_path: default_content_path(),
        }
    }
}

impl StorageConfig {
    pub fn records_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.records_path)
    }

    pub fn content_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.content_path)
    }
}

/// Player directory endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Name lookup; the lower-cased name is appended.
    #[serde(default = "default_profile_url")]
    pub profile_url: String,

    /// Id lookup; the undashed id is appended.
    #[serde(default = "default_session_url")]
    pub session_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_profile_url() -> String {
    "https://api.mojang.com/users/profiles/minecraft".to_string()
}

fn default_session_url() -> String {
    "https://sessionserver.mojang.com/session/minecraft/profile".to_string()
}

fn default_user_agent() -> String {
    "capes.dev (+https://capes.dev)".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            profile_url: default_profile_url(),
            session_url: default_session_url(),
            user_agent: default_user_agent(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Provider(String, String),
    Resolver(String),
    Storage(String),
    Identity(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(name, msg) => write!(f, "Provider '{}': {}", name, msg),
            ValidationError::Resolver(msg) => write!(f, "Resolver: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Identity(msg) => write!(f, "Identity: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl CapesConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.resolver.upstream_timeout_ms == 0 {
            errors.push(ValidationError::Resolver(
                "upstream_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if !is_http_url(&self.resolver.public_base_url) {
            errors.push(ValidationError::Resolver(format!(
                "public_base_url must be http(s), got '{}'",
                self.resolver.public_base_url
            )));
        }

        if self.storage.records_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage("records_path cannot be empty".to_string()));
        }
        if self.storage.content_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage("content_path cannot be empty".to_string()));
        }

        for (field, url) in [
            ("profile_url", &self.identity.profile_url),
            ("session_url", &self.identity.session_url),
        ] {
            if !is_http_url(url) {
                errors.push(ValidationError::Identity(format!(
                    "{} must be http(s), got '{}'",
                    field, url
                )));
            }
        }
        if self.identity.user_agent.trim().is_empty() {
            errors.push(ValidationError::Identity("user_agent cannot be empty".to_string()));
        }

        for (name, provider) in &self.providers {
            if !CapeType::is_valid_name(name) || !is_valid_variant_name(name) {
                errors.push(ValidationError::Provider(
                    name.clone(),
                    "type names use lower-case letters, digits, '-' and '_'".to_string(),
                ));
            }
            if let Err(e) = provider.validate() {
                errors.push(ValidationError::Provider(name.clone(), e));
            }
        }
        if !self.providers.values().any(|p| p.enabled) {
            errors.push(ValidationError::Provider(
                "*".to_string(),
                "at least one provider must be enabled".to_string(),
            ));
        }

        if let Err(e) = crate::logging::validate(&self.logging) {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into a single error.
    pub fn validated(self) -> Result<Self, ResolveError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ResolveError::Config(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;
        Ok(self)
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ResolveError> {
        toml::to_string_pretty(self)
            .map_err(|e| ResolveError::Config(format!("Failed to render config: {}", e)))
    }
}
