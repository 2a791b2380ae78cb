//! Derived-Image Pipeline
//!
//! Renders the transforms and animation artifacts of a new cape and uploads
//! them, together with the canonical bytes, to the content store. The
//! pipeline completes only once every upload has been acknowledged; any
//! failure is returned and the caller must not persist a record.

use crate::content::{ContentKey, ContentStore, ANIMATED_VARIANT, STILL_VARIANT};
use crate::error::ResolveError;
use crate::hash::ContentHash;
use crate::imaging::{self, RenderedImages};
use crate::provider::ProviderCapabilities;
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Result of a completed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Every key uploaded, canonical key first.
    pub uploaded: Vec<ContentKey>,
    /// Extracted animation frames; 0 when the cape is not animated.
    pub frame_count: u32,
}

pub struct DerivedImagePipeline {
    content: Arc<dyn ContentStore>,
    upload_timeout: Duration,
    /// Wait after all uploads settle, for stores whose reads lag their writes.
    publish_delay: Duration,
}

impl DerivedImagePipeline {
    pub fn new(content: Arc<dyn ContentStore>, upload_timeout: Duration) -> Self {
        Self {
            content,
            upload_timeout,
            publish_delay: Duration::ZERO,
        }
    }

    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = delay;
        self
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub async fn run(
        &self,
        bytes: Arc<Vec<u8>>,
        hash: &ContentHash,
        capabilities: &ProviderCapabilities,
    ) -> Result<PipelineOutcome, ResolveError> {
        let render_bytes = Arc::clone(&bytes);
        let render_caps = capabilities.clone();
        let rendered: RenderedImages =
            tokio::task::spawn_blocking(move || imaging::render(&render_bytes, &render_caps))
                .await
                .map_err(|e| {
                    ResolveError::ImageProcessing(format!("render task failed: {}", e))
                })??;

        let frame_count = rendered.animation.as_ref().map_or(0, |a| a.frames);

        let mut artifacts: Vec<(ContentKey, Vec<u8>)> =
            Vec::with_capacity(rendered.transforms.len() + 3);
        artifacts.push((ContentKey::canonical(hash)?, bytes.as_ref().clone()));
        for (name, png) in rendered.transforms {
            artifacts.push((ContentKey::variant(hash, &name)?, png));
        }
        if let Some(animation) = rendered.animation {
            artifacts.push((ContentKey::variant(hash, STILL_VARIANT)?, animation.still));
            artifacts.push((ContentKey::variant(hash, ANIMATED_VARIANT)?, animation.animated));
        }

        let uploaded: Vec<ContentKey> = artifacts.iter().map(|(k, _)| k.clone()).collect();
        try_join_all(artifacts.into_iter().map(|(key, data)| self.upload(key, data))).await?;

        debug!(
            content_hash = %hash,
            artifacts = uploaded.len(),
            frame_count,
            "Uploaded derived images"
        );

        if !self.publish_delay.is_zero() {
            tokio::time::sleep(self.publish_delay).await;
        }

        Ok(PipelineOutcome {
            uploaded,
            frame_count,
        })
    }

    async fn upload(&self, key: ContentKey, data: Vec<u8>) -> Result<(), ResolveError> {
        let size = data.len();
        match tokio::time::timeout(self.upload_timeout, self.content.put(&key, data)).await {
            Ok(Ok(())) => {
                debug!(key = %key, size, "Stored content");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ResolveError::Timeout {
                operation: format!("upload of {}", key),
                after_ms: self.upload_timeout.as_millis() as u64,
            }),
        }
    }
}
