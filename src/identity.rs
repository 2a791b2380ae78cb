//! Player identity resolution
//!
//! Maps a display name or canonical id to the canonical (name, id) pair.

use crate::config::IdentityConfig;
use crate::error::ResolveError;
use crate::provider::{build_http_client, map_http_error};
use crate::types::{PlayerId, PlayerIdentity, PlayerRef};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `None` when the directory has no such player.
    async fn resolve(&self, player: &PlayerRef) -> Result<Option<PlayerIdentity>, ResolveError>;
}

#[derive(Deserialize)]
struct ProfileResponse {
    id: String,
    name: String,
}

/// Resolver backed by the Mojang profile and session APIs.
pub struct MojangResolver {
    client: Client,
    profile_url: String,
    session_url: String,
}

impl MojangResolver {
    pub fn new(client: Client, profile_url: String, session_url: String) -> Self {
        Self {
            client,
            profile_url: profile_url.trim_end_matches('/').to_string(),
            session_url: session_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &IdentityConfig, timeout: Duration) -> Result<Self, ResolveError> {
        let client = build_http_client(&config.user_agent, timeout)?;
        Ok(Self::new(
            client,
            config.profile_url.clone(),
            config.session_url.clone(),
        ))
    }

    fn url_for(&self, player: &PlayerRef) -> String {
        match player {
            PlayerRef::Name(name) => format!("{}/{}", self.profile_url, name),
            PlayerRef::Id(id) => format!("{}/{}", self.session_url, id),
        }
    }
}

#[async_trait]
impl IdentityResolver for MojangResolver {
    async fn resolve(&self, player: &PlayerRef) -> Result<Option<PlayerIdentity>, ResolveError> {
        let url = self.url_for(player);
        debug!(player = %player, url = %url, "Resolving player identity");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_http_error(e, "identity lookup"))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Ok(None),
            status if !status.is_success() => {
                return Err(ResolveError::UpstreamFetchFailure(format!(
                    "identity lookup returned status {}",
                    status
                )));
            }
            _ => {}
        }

        let profile: ProfileResponse = response
            .json()
            .await
            .map_err(|e| map_http_error(e, "identity lookup"))?;

        let id = PlayerId::parse(&profile.id).ok_or_else(|| {
            ResolveError::UpstreamFetchFailure(format!(
                "identity lookup returned malformed id '{}'",
                profile.id
            ))
        })?;
        Ok(Some(PlayerIdentity {
            name: profile.name,
            id,
        }))
    }
}

/// Fixed set of known identities; for offline use and tests.
#[derive(Debug, Default)]
pub struct StaticIdentityResolver {
    players: RwLock<Vec<PlayerIdentity>>,
}

impl StaticIdentityResolver {
    pub fn new(players: impl IntoIterator<Item = PlayerIdentity>) -> Self {
        Self {
            players: RwLock::new(players.into_iter().collect()),
        }
    }

    pub fn add(&self, player: PlayerIdentity) {
        let mut players = self.players.write();
        players.retain(|p| p.id != player.id);
        players.push(player);
    }

    pub fn remove(&self, id: &PlayerId) {
        self.players.write().retain(|p| &p.id != id);
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, player: &PlayerRef) -> Result<Option<PlayerIdentity>, ResolveError> {
        Ok(self
            .players
            .read()
            .iter()
            .find(|p| match player {
                PlayerRef::Id(id) => &p.id == id,
                PlayerRef::Name(name) => &p.lower_name() == name,
            })
            .cloned())
    }
}
