//! End-to-end resolution scenarios over in-memory stores

use crate::integration::test_utils::{
    front_back_capabilities, identity, png, Harness, JEB_ID, NOTCH_ID, START,
};
use async_trait::async_trait;
use capes::content::{ContentKey, ContentStore};
use capes::error::{ResolveError, StorageError};
use capes::hash::{ContentHash, RecordId, NO_CAPE};
use capes::imaging;
use capes::provider::ProviderCapabilities;
use capes::record::{CapeRecord, MemoryRecordStore, RecordStats, RecordStore};
use capes::resolver::ResolverSettings;
use capes::types::{CapeType, Dimensions, PlayerRef};
use std::sync::Arc;
use std::time::Duration;

fn record_id(hash: &str) -> RecordId {
    RecordId::parse(hash).unwrap()
}

#[tokio::test]
async fn test_first_ever_lookup_creates_record() {
    let h = Harness::new();
    let bytes = png(64, 32, 1);
    h.fetcher.respond_with(bytes.clone());

    let info = h.resolver.resolve("optifine", "Notch").await.unwrap();

    assert!(info.exists);
    assert_eq!((info.width, info.height), (64, 32));
    assert_eq!(info.extension, "png");
    assert_eq!(info.changed, Some(true));
    assert_eq!(info.msg.as_deref(), Some("Cape found"));
    assert_eq!(info.player, NOTCH_ID);
    assert_eq!(info.player_name, "Notch");
    assert_eq!(info.time, START);
    assert_eq!(info.image_hash.as_deref(), Some(ContentHash::of(&bytes).as_str()));
    assert_eq!(h.records.len(), 1);
}

#[tokio::test]
async fn test_new_content_uploads_canonical_and_transforms() {
    let h = Harness::new();
    let bytes = png(64, 32, 1);
    let hash = ContentHash::of(&bytes);
    h.fetcher.respond_with(bytes.clone());

    h.resolver.resolve("optifine", "Notch").await.unwrap();

    let mut expected = vec![
        hash.to_string(),
        format!("{}_back", hash),
        format!("{}_front", hash),
    ];
    expected.sort();
    assert_eq!(h.content.keys(), expected);

    let canonical = ContentKey::canonical(&hash).unwrap();
    assert_eq!(h.content.get(&canonical).await.unwrap().unwrap(), bytes);
}

#[tokio::test]
async fn test_fresh_record_skips_upstreams() {
    let h = Harness::new();
    h.fetcher.respond_with(png(64, 32, 1));

    let first = h.resolver.resolve("optifine", "Notch").await.unwrap();
    h.clock.advance(h.window() - 1);
    let second = h.resolver.resolve("optifine", "notch").await.unwrap();

    assert_eq!(second.hash, first.hash);
    assert_eq!(second.changed, None);
    assert_eq!(second.msg, None);
    assert_eq!(second.time, START);
    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.identity.calls(), 1);
}

#[tokio::test]
async fn test_fresh_record_found_by_dashed_id() {
    let h = Harness::new();
    h.fetcher.respond_with(png(64, 32, 1));

    h.resolver.resolve("optifine", "Notch").await.unwrap();
    let by_id = h
        .resolver
        .resolve("optifine", "069a79f4-44e9-4726-a5be-fca90e38aaf5")
        .await
        .unwrap();

    assert_eq!(by_id.changed, None);
    assert_eq!(by_id.msg, None);
    assert_eq!(h.fetcher.calls(), 1);
}

#[tokio::test]
async fn test_reconfirmation_updates_time_only() {
    let h = Harness::new();
    h.fetcher.respond_with(png(64, 32, 1));

    let first = h.resolver.resolve("optifine", "Notch").await.unwrap();
    h.clock.advance(h.window() + 1);
    let second = h.resolver.resolve("optifine", "Notch").await.unwrap();

    assert_eq!(second.hash, first.hash);
    assert_eq!(second.changed, Some(false));
    assert_eq!(second.time, START + h.window() + 1);
    assert_eq!(h.fetcher.calls(), 2);
    assert_eq!(h.records.len(), 1);

    let stored = h.records.get(&record_id(&first.hash)).await.unwrap().unwrap();
    assert_eq!(stored.observed_at, START + h.window() + 1);
}

#[tokio::test]
async fn test_content_change_creates_new_record_and_keeps_history() {
    let h = Harness::new();
    h.fetcher.respond_with(png(64, 32, 1));
    let first = h.resolver.resolve("optifine", "Notch").await.unwrap();

    h.clock.advance(h.window() + 1);
    h.fetcher.respond_with(png(64, 32, 2));
    let second = h.resolver.resolve("optifine", "Notch").await.unwrap();

    assert_ne!(second.hash, first.hash);
    assert_ne!(second.image_hash, first.image_hash);
    assert_eq!(second.changed, Some(true));
    assert_eq!(h.records.len(), 2);

    let prior = h.records.get(&record_id(&first.hash)).await.unwrap().unwrap();
    assert_eq!(prior.observed_at, START);

    let history = h.resolver.history(Some("optifine"), "Notch").await.unwrap();
    let hashes: Vec<&str> = history.history.iter().map(|i| i.hash.as_str()).collect();
    assert_eq!(hashes, vec![second.hash.as_str(), first.hash.as_str()]);
}

#[tokio::test]
async fn test_absent_cape_is_recorded_with_sentinel() {
    let h = Harness::new();
    h.fetcher.respond_absent();

    let info = h.resolver.resolve("optifine", "Notch").await.unwrap();

    assert!(!info.exists);
    assert_eq!(info.image_hash, None);
    let stored = h.records.get(&record_id(&info.hash)).await.unwrap().unwrap();
    assert_eq!(stored.content_hash.as_str(), NO_CAPE);
    assert_eq!((info.width, info.height), (0, 0));
    assert_eq!(info.extension, "");
    assert!(info.image_url.is_none());
    assert_eq!(info.msg.as_deref(), Some("Player has no cape"));
    assert!(h.content.keys().is_empty());

    let stored = h.records.all();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].content_hash.is_absent());
}

#[tokio::test]
async fn test_cape_removed_after_having_one() {
    let h = Harness::new();
    h.fetcher.respond_with(png(64, 32, 1));
    let had = h.resolver.resolve("optifine", "Notch").await.unwrap();

    h.clock.advance(h.window() + 1);
    h.fetcher.respond_absent();
    let gone = h.resolver.resolve("optifine", "Notch").await.unwrap();

    assert!(!gone.exists);
    assert_eq!(gone.changed, Some(true));
    assert_ne!(gone.hash, had.hash);
    assert_eq!(h.records.len(), 2);

    // history lists only observations with a cape
    let history = h.resolver.history(None, "Notch").await.unwrap();
    assert_eq!(history.history.len(), 1);
    assert_eq!(history.history[0].hash, had.hash);
}

#[tokio::test]
async fn test_observed_at_never_moves_backwards() {
    let h = Harness::new();
    h.fetcher.respond_with(png(64, 32, 1));
    h.resolver.resolve("optifine", "Notch").await.unwrap();

    // A clock step back past the window still must not produce an older record
    h.clock.set(START - 10 * h.window());
    h.fetcher.respond_with(png(64, 32, 2));
    let info = h.resolver.resolve("optifine", "Notch").await;
    // Negative age counts as fresh, so nothing is fetched
    assert_eq!(info.unwrap().changed, None);

    h.clock.set(START + h.window());
    let newer = h.resolver.resolve("optifine", "Notch").await.unwrap();
    assert!(newer.time >= START);
}

#[tokio::test]
async fn test_name_moved_to_another_player() {
    let h = Harness::new();
    let bytes = png(64, 32, 1);
    h.fetcher.respond_with(bytes.clone());
    let original = h.resolver.resolve("optifine", "Notch").await.unwrap();
    assert_eq!(original.player, NOTCH_ID);

    // "Notch" now belongs to jeb_'s account
    let notch = capes::types::PlayerId::parse(NOTCH_ID).unwrap();
    h.identity.directory.remove(&notch);
    h.identity.directory.add(identity("Notch", JEB_ID));
    h.clock.advance(h.window() + 1);

    let moved = h.resolver.resolve("optifine", "Notch").await.unwrap();

    // Same bytes, but compared against the new owner's (empty) lineage
    assert_eq!(moved.player, JEB_ID);
    assert_eq!(moved.changed, Some(true));
    assert_ne!(moved.hash, original.hash);
    assert_eq!(h.records.len(), 2);

    let old = h.records.get(&record_id(&original.hash)).await.unwrap().unwrap();
    assert_eq!(old.observed_at, START);
}

#[tokio::test]
async fn test_unknown_player_is_not_found() {
    let h = Harness::new();
    let err = h.resolver.resolve("optifine", "Dinnerbone").await.unwrap_err();

    assert!(matches!(err, ResolveError::PlayerNotFound(_)));
    assert_eq!(err.status_code(), 404);
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_unsupported_type() {
    let h = Harness::new();
    let err = h.resolver.resolve("minecraftcapes", "Notch").await.unwrap_err();

    match err {
        ResolveError::UnsupportedType { requested, supported } => {
            assert_eq!(requested, "minecraftcapes");
            assert_eq!(supported, vec!["optifine".to_string()]);
        }
        other => panic!("expected UnsupportedType, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upstream_failure_propagates_without_writes() {
    let h = Harness::new();
    h.fetcher.fail_with("optifine returned status 503");

    let err = h.resolver.resolve("optifine", "Notch").await.unwrap_err();

    assert!(matches!(err, ResolveError::UpstreamFetchFailure(_)));
    assert!(err.is_retryable());
    assert_eq!(err.status_code(), 500);
    assert!(h.records.is_empty());
    assert!(h.content.keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out() {
    let h = Harness::with_settings(ResolverSettings {
        upstream_timeout: Duration::from_secs(2),
        ..Default::default()
    });
    h.fetcher.respond_with(png(64, 32, 1));
    h.fetcher.set_delay(Duration::from_secs(30));

    let err = h.resolver.resolve("optifine", "Notch").await.unwrap_err();

    match &err {
        ResolveError::Timeout { operation, after_ms } => {
            assert_eq!(operation, "optifine fetch");
            assert_eq!(*after_ms, 2_000);
        }
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert!(err.is_retryable());
    assert_eq!(err.status_code(), 504);
    assert!(h.records.is_empty());
}

#[tokio::test]
async fn test_undecodable_content_creates_no_record() {
    let h = Harness::new();
    h.fetcher.respond_with(b"<html>rate limited</html>".to_vec());

    let err = h.resolver.resolve("optifine", "Notch").await.unwrap_err();

    assert!(matches!(err, ResolveError::ImageProcessing(_)));
    assert!(h.records.is_empty());
}

#[tokio::test]
async fn test_transform_outside_image_fails_pipeline() {
    let h = Harness::new();
    // Crop origins (1,1) and (12,1) fall outside a 1x1 image
    h.fetcher.respond_with(png(1, 1, 1));

    let err = h.resolver.resolve("optifine", "Notch").await.unwrap_err();

    assert!(matches!(err, ResolveError::ImageProcessing(_)));
    assert!(h.records.is_empty());
}

/// Record store whose inserts always fail.
struct InsertFails(MemoryRecordStore);

#[async_trait]
impl RecordStore for InsertFails {
    async fn find_latest(
        &self,
        cape_type: &CapeType,
        player: &PlayerRef,
    ) -> Result<Option<CapeRecord>, StorageError> {
        self.0.find_latest(cape_type, player).await
    }

    async fn insert(&self, _record: &CapeRecord) -> Result<(), StorageError> {
        Err(StorageError::Database("disk full".to_string()))
    }

    async fn update_observed_at(&self, id: &RecordId, at: i64) -> Result<(), StorageError> {
        self.0.update_observed_at(id, at).await
    }

    async fn get(&self, id: &RecordId) -> Result<Option<CapeRecord>, StorageError> {
        self.0.get(id).await
    }

    async fn find_by_content_hash(
        &self,
        hash: &ContentHash,
    ) -> Result<Option<CapeRecord>, StorageError> {
        self.0.find_by_content_hash(hash).await
    }

    async fn history(
        &self,
        cape_type: Option<&CapeType>,
        player: &PlayerRef,
    ) -> Result<Vec<CapeRecord>, StorageError> {
        self.0.history(cape_type, player).await
    }

    async fn stats(&self) -> Result<RecordStats, StorageError> {
        self.0.stats().await
    }
}

#[tokio::test]
async fn test_storage_failure_after_fetch_is_surfaced() {
    let fetcher = Arc::new(crate::integration::test_utils::FakeFetcher::new(
        front_back_capabilities(),
    ));
    fetcher.respond_with(png(64, 32, 1));
    let content = Arc::new(capes::content::MemoryContentStore::new());
    let resolver = crate::integration::test_utils::resolver_over(
        Arc::new(InsertFails(MemoryRecordStore::new())),
        content.clone(),
        fetcher.clone(),
        Arc::new(capes::clock::ManualClock::new(START)),
        ResolverSettings::default(),
    );

    let err = resolver.resolve("optifine", "Notch").await.unwrap_err();

    assert!(matches!(err, ResolveError::StorageFailure(ref m) if m.contains("disk full")));
    assert_eq!(err.status_code(), 500);
    assert_eq!(fetcher.calls(), 1);
    // Uploads completed before the insert; orphaned artifacts are tolerated
    assert_eq!(content.keys().len(), 3);
}

#[tokio::test]
async fn test_animated_provider_records_frames() {
    let h = Harness::build(
        ResolverSettings::default(),
        ProviderCapabilities {
            supports_animation: true,
            frame_delay_ms: 80,
            ..front_back_capabilities()
        },
    );
    let bytes = png(64, 128, 7);
    let hash = ContentHash::of(&bytes);
    h.fetcher.respond_with(bytes);

    let info = h.resolver.resolve("optifine", "Notch").await.unwrap();

    assert_eq!(info.animated, Some(true));
    assert_eq!(info.animation_frames, Some(4));
    assert!(info.still_image.unwrap().ends_with(&format!("/img/still/{}", hash)));
    assert!(info.animated_image.unwrap().ends_with(&format!("/img/animated/{}", hash)));

    let keys = h.content.keys();
    assert!(keys.contains(&format!("{}_still", hash)));
    assert!(keys.contains(&format!("{}_animated", hash)));
}

#[tokio::test]
async fn test_single_frame_on_animated_provider_is_static() {
    let h = Harness::build(
        ResolverSettings::default(),
        ProviderCapabilities {
            supports_animation: true,
            ..front_back_capabilities()
        },
    );
    h.fetcher.respond_with(png(64, 32, 7));

    let info = h.resolver.resolve("optifine", "Notch").await.unwrap();

    assert_eq!(info.animated, None);
    assert_eq!(info.animation_frames, None);
    assert_eq!(info.still_image, info.image_url);
}

#[tokio::test]
async fn test_get_and_image_lookups() {
    let h = Harness::new();
    let bytes = png(64, 32, 3);
    h.fetcher.respond_with(bytes.clone());
    let info = h.resolver.resolve("optifine", "Notch").await.unwrap();

    let fetched = h.resolver.get(&info.hash).await.unwrap().unwrap();
    assert_eq!(fetched.hash, info.hash);
    assert_eq!(fetched.changed, None);
    assert_eq!(fetched.msg.as_deref(), Some("Cape found"));

    let image_hash = info.image_hash.as_deref().unwrap();
    let canonical = h.resolver.image(image_hash, None).await.unwrap().unwrap();
    assert_eq!(canonical, bytes);

    let front = h
        .resolver
        .image(image_hash, Some("front"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(imaging::sniff(&front).unwrap().dimensions, Dimensions::new(10, 16));

    assert!(h
        .resolver
        .image(image_hash, Some("sideways"))
        .await
        .unwrap()
        .is_none());
    assert!(h
        .resolver
        .image(ContentHash::of(b"unknown").as_str(), None)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_resolve_all_and_stats() {
    let h = Harness::new();
    h.fetcher.respond_with(png(64, 32, 1));

    let all = h.resolver.resolve_all("Notch").await.unwrap();
    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["optifine"]);

    h.resolver.resolve("optifine", "jeb_").await.unwrap();

    let stats = h.resolver.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.players, 2);
    assert_eq!(stats.types.get("optifine"), Some(&2));
    assert_eq!(h.resolver.types(), vec!["optifine".to_string()]);
}

#[tokio::test]
async fn test_resolve_all_fails_as_a_whole() {
    let h = Harness::new();
    h.fetcher.fail_with("boom");
    assert!(h.resolver.resolve_all("Notch").await.is_err());
    assert!(matches!(
        h.resolver.resolve_all("no spaces allowed").await,
        Err(ResolveError::InvalidPlayer(_))
    ));
}
