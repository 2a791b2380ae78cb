//! Resolution Engine
//!
//! `resolve(type, player)` serves a stored record while it is fresh and
//! otherwise re-fetches from the provider, deduplicating by content hash:
//!
//! - same hash as the latest record: only `observed_at` moves (`changed = false`)
//! - different hash or no prior record: the derived images are uploaded, then
//!   a new record is inserted (`changed = true`)
//!
//! Concurrent resolutions of the same (type, player) share one in-flight
//! future unless coalescing is disabled.

use crate::clock::Clock;
use crate::config::ResolverConfig;
use crate::content::{ContentKey, ContentStore};
use crate::error::{ResolveError, StorageError};
use crate::hash::{compute_record_id, ContentHash, RecordId};
use crate::identity::IdentityResolver;
use crate::imaging;
use crate::info::{CapeHistory, CapeInfo};
use crate::pipeline::DerivedImagePipeline;
use crate::provider::{ProviderFetcher, ProviderRegistry};
use crate::record::{CapeRecord, RecordStats, RecordStore};
use crate::types::{CapeType, Dimensions, PlayerIdentity, PlayerRef};
use futures::future::{try_join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Engine settings, usually taken from [`ResolverConfig`].
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub freshness_window_secs: u64,
    pub upstream_timeout: Duration,
    pub publish_delay: Duration,
    pub coalesce_requests: bool,
    pub public_base_url: String,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&ResolverConfig::default())
    }
}

impl From<&ResolverConfig> for ResolverSettings {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            freshness_window_secs: config.freshness_window_secs,
            upstream_timeout: config.upstream_timeout(),
            publish_delay: config.publish_delay(),
            coalesce_requests: config.coalesce_requests,
            public_base_url: config.public_base_url.clone(),
        }
    }
}

type SharedResolve = Shared<BoxFuture<'static, Result<CapeInfo, ResolveError>>>;

/// (type, player lookup key)
type InflightKey = (CapeType, String);

#[derive(Clone)]
pub struct CapeResolver {
    inner: Arc<Inner>,
}

struct Inner {
    records: Arc<dyn RecordStore>,
    identity: Arc<dyn IdentityResolver>,
    providers: ProviderRegistry,
    pipeline: DerivedImagePipeline,
    clock: Arc<dyn Clock>,
    settings: ResolverSettings,
    inflight: Mutex<HashMap<InflightKey, SharedResolve>>,
}

impl CapeResolver {
    pub fn new(
        records: Arc<dyn RecordStore>,
        content: Arc<dyn ContentStore>,
        identity: Arc<dyn IdentityResolver>,
        providers: ProviderRegistry,
        clock: Arc<dyn Clock>,
        settings: ResolverSettings,
    ) -> Self {
        let pipeline = DerivedImagePipeline::new(content, settings.upstream_timeout)
            .with_publish_delay(settings.publish_delay);
        Self {
            inner: Arc::new(Inner {
                records,
                identity,
                providers,
                pipeline,
                clock,
                settings,
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.inner.settings
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.inner.providers
    }

    /// Resolve the current cape of `player` for `cape_type`.
    pub async fn resolve(&self, cape_type: &str, player: &str) -> Result<CapeInfo, ResolveError> {
        let (cape_type, fetcher) = self.inner.providers.resolve_type(cape_type)?;
        let player = PlayerRef::parse(player)?;

        if !self.inner.settings.coalesce_requests {
            return self.inner.resolve_once(&cape_type, fetcher, &player).await;
        }

        let key: InflightKey = (cape_type.clone(), player.lookup_key().to_string());
        let shared = {
            let mut inflight = self.inner.inflight.lock();
            match inflight.get(&key).cloned() {
                Some(existing) => {
                    debug!(cape_type = %cape_type, player = %player, "Joining in-flight resolution");
                    existing
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let leader_key = key.clone();
                    let future = async move {
                        let result = inner.resolve_once(&cape_type, fetcher, &player).await;
                        inner.inflight.lock().remove(&leader_key);
                        result
                    }
                    .boxed()
                    .shared();
                    inflight.insert(key, future.clone());
                    future
                }
            }
        };
        shared.await
    }

    /// Resolve every configured type for one player. Any failure fails the call.
    pub async fn resolve_all(
        &self,
        player: &str,
    ) -> Result<BTreeMap<String, CapeInfo>, ResolveError> {
        PlayerRef::parse(player)?;
        let names = self.inner.providers.type_names();
        let infos = try_join_all(names.iter().map(|name| self.resolve(name, player))).await?;
        Ok(names.into_iter().zip(infos).collect())
    }

    /// Recorded capes of a player, newest first; "no cape" observations are skipped.
    pub async fn history(
        &self,
        cape_type: Option<&str>,
        player: &str,
    ) -> Result<CapeHistory, ResolveError> {
        let cape_type = cape_type
            .map(|name| self.inner.providers.resolve_type(name).map(|(t, _)| t))
            .transpose()?;
        let player_ref = PlayerRef::parse(player)?;

        let records = self
            .inner
            .records
            .history(cape_type.as_ref(), &player_ref)
            .await
            .map_err(|e| storage_failure("history", e))?;

        let history = records
            .iter()
            .filter(|r| r.exists())
            .map(|r| self.inner.project(r))
            .collect();

        Ok(CapeHistory {
            cape_type,
            player: player_ref.to_string(),
            history,
        })
    }

    /// Look up a single record by its id.
    pub async fn get(&self, record_id: &str) -> Result<Option<CapeInfo>, ResolveError> {
        let Some(record_id) = RecordId::parse(record_id) else {
            return Ok(None);
        };
        let record = self
            .inner
            .records
            .get(&record_id)
            .await
            .map_err(|e| storage_failure("get", e))?;
        Ok(record.map(|r| self.inner.project(&r).with_message()))
    }

    /// Canonical image bytes, or a derived variant, for a recorded content hash.
    pub async fn image(
        &self,
        content_hash: &str,
        variant: Option<&str>,
    ) -> Result<Option<Vec<u8>>, ResolveError> {
        let Some(hash) = ContentHash::parse(content_hash).filter(|h| !h.is_absent()) else {
            return Ok(None);
        };

        let known = self
            .inner
            .records
            .find_by_content_hash(&hash)
            .await
            .map_err(|e| storage_failure("image lookup", e))?;
        if known.is_none() {
            return Ok(None);
        }

        let key = match variant {
            None => ContentKey::canonical(&hash),
            Some(name) => ContentKey::variant(&hash, name),
        };
        let Ok(key) = key else {
            return Ok(None);
        };

        let content = self.inner.pipeline.content();
        self.inner
            .bounded("content read", async { content.get(&key).await.map_err(ResolveError::from) })
            .await
    }

    pub async fn stats(&self) -> Result<RecordStats, ResolveError> {
        self.inner
            .records
            .stats()
            .await
            .map_err(|e| storage_failure("stats", e))
    }

    pub fn types(&self) -> Vec<String> {
        self.inner.providers.type_names()
    }
}

impl Inner {
    #[instrument(skip_all, fields(cape_type = %cape_type, player = %player))]
    async fn resolve_once(
        &self,
        cape_type: &CapeType,
        fetcher: Arc<dyn ProviderFetcher>,
        player: &PlayerRef,
    ) -> Result<CapeInfo, ResolveError> {
        let latest = self
            .records
            .find_latest(cape_type, player)
            .await
            .map_err(|e| storage_failure("find_latest", e))?;

        let now = self.clock.now();
        if let Some(record) = &latest {
            if self.is_fresh(record, now) {
                debug!(record_id = %record.record_id, "Serving fresh record");
                return Ok(self.project(record));
            }
        }

        let identity = self
            .bounded("identity lookup", self.identity.resolve(player))
            .await?
            .ok_or_else(|| ResolveError::PlayerNotFound(player.to_string()))?;

        let prior = match latest {
            Some(record) if record.player_id == identity.id => Some(record),
            // The name now belongs to someone else (or was never recorded):
            // compare against the canonical id's own lineage.
            _ => self
                .records
                .find_latest(cape_type, &PlayerRef::Id(identity.id.clone()))
                .await
                .map_err(|e| storage_failure("find_latest", e))?,
        };

        let bytes = self
            .bounded(&format!("{} fetch", cape_type), fetcher.fetch(&identity))
            .await?;
        let content_hash = ContentHash::of_optional(bytes.as_deref());
        let observed_at = self
            .clock
            .now()
            .max(prior.as_ref().map_or(i64::MIN, |r| r.observed_at));

        if let Some(prior) = prior.filter(|r| r.content_hash == content_hash) {
            self.records
                .update_observed_at(&prior.record_id, observed_at)
                .await
                .map_err(|e| storage_failure("update_observed_at", e))?;
            info!(
                record_id = %prior.record_id,
                content_hash = %content_hash,
                "Reconfirmed unchanged cape"
            );
            let refreshed = CapeRecord {
                observed_at,
                ..prior
            };
            return Ok(self.project(&refreshed).with_changed(false).with_message());
        }

        let record = self
            .store_new_content(cape_type, fetcher.as_ref(), &identity, bytes, content_hash, observed_at)
            .await?;
        info!(
            record_id = %record.record_id,
            content_hash = %record.content_hash,
            animated = record.animated(),
            "Recorded new cape content"
        );
        Ok(self.project(&record).with_changed(true).with_message())
    }

    async fn store_new_content(
        &self,
        cape_type: &CapeType,
        fetcher: &dyn ProviderFetcher,
        identity: &PlayerIdentity,
        bytes: Option<Vec<u8>>,
        content_hash: ContentHash,
        observed_at: i64,
    ) -> Result<CapeRecord, ResolveError> {
        let capabilities = fetcher.capabilities();

        let (extension, dimensions, animation_frames) = match bytes {
            Some(bytes) => {
                let sniffed = imaging::sniff(&bytes)?;
                let outcome = self
                    .pipeline
                    .run(Arc::new(bytes), &content_hash, capabilities)
                    .await?;
                let frames = (capabilities.supports_animation && outcome.frame_count > 0)
                    .then_some(outcome.frame_count);
                (sniffed.extension, sniffed.dimensions, frames)
            }
            None => (String::new(), Dimensions::ZERO, None),
        };

        let record = CapeRecord {
            record_id: compute_record_id(&content_hash, &identity.id, cape_type, observed_at),
            player_id: identity.id.clone(),
            player_name: identity.name.clone(),
            cape_type: cape_type.clone(),
            observed_at,
            content_hash,
            extension,
            width: dimensions.width,
            height: dimensions.height,
            animation_frames,
        };

        self.records
            .insert(&record)
            .await
            .map_err(|e| storage_failure("insert", e))?;
        Ok(record)
    }

    fn is_fresh(&self, record: &CapeRecord, now: i64) -> bool {
        let age = now.saturating_sub(record.observed_at);
        age < self.settings.freshness_window_secs.min(i64::MAX as u64) as i64
    }

    fn project(&self, record: &CapeRecord) -> CapeInfo {
        let transforms: Vec<&str> = self
            .providers
            .capabilities(&record.cape_type)
            .map(|caps| caps.transform_names().collect())
            .unwrap_or_default();
        CapeInfo::project(record, transforms, &self.settings.public_base_url)
    }

    /// Run an upstream call under the configured timeout.
    async fn bounded<T, F>(&self, operation: &str, future: F) -> Result<T, ResolveError>
    where
        F: Future<Output = Result<T, ResolveError>>,
    {
        let limit = self.settings.upstream_timeout;
        match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => {
                debug!(operation, after_ms = limit.as_millis() as u64, "Upstream call timed out");
                Err(ResolveError::Timeout {
                    operation: operation.to_string(),
                    after_ms: limit.as_millis() as u64,
                })
            }
        }
    }
}

fn storage_failure(operation: &str, err: StorageError) -> ResolveError {
    error!(operation, error = %err, "Record store failure");
    err.into()
}
