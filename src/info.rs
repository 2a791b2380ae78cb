//! Client-facing read model
//!
//! [`CapeInfo`] is the projection of a [`CapeRecord`] handed to transports:
//! camelCase JSON with absolute asset URLs.

use crate::content::{ANIMATED_VARIANT, STILL_VARIANT};
use crate::record::CapeRecord;
use crate::types::CapeType;
use serde::Serialize;
use std::collections::BTreeMap;

pub const MSG_CAPE_FOUND: &str = "Cape found";
pub const MSG_NO_CAPE: &str = "Player has no cape";

/// Projection of a single cape record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapeInfo {
    /// Record id
    pub hash: String,
    pub player: String,
    pub player_name: String,
    #[serde(rename = "type")]
    pub cape_type: String,
    pub time: i64,
    pub width: u32,
    pub height: u32,
    pub extension: String,
    pub exists: bool,
    /// Content hash; serialized as `null` when there is no cape.
    pub image_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cape_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// `{transform}ImageUrl` entries.
    #[serde(flatten)]
    pub transform_urls: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub still_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animated_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation_frames: Option<u32>,

    /// Set by a resolution: `true` new content, `false` reconfirmed,
    /// absent when served fresh from the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl CapeInfo {
    pub fn project<'a>(
        record: &CapeRecord,
        transforms: impl IntoIterator<Item = &'a str>,
        base_url: &str,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        let image_hash = record.content_hash.as_str();
        let exists = record.exists();

        let image_url = exists.then(|| format!("{}/img/{}", base, image_hash));
        let transform_urls = if exists {
            transforms
                .into_iter()
                .map(|name| {
                    (
                        format!("{}ImageUrl", name),
                        format!("{}/img/{}/{}", base, name, image_hash),
                    )
                })
                .collect()
        } else {
            BTreeMap::new()
        };

        let (still_image, animated_image) = match (exists, record.animated()) {
            (true, true) => (
                Some(format!("{}/img/{}/{}", base, STILL_VARIANT, image_hash)),
                Some(format!("{}/img/{}/{}", base, ANIMATED_VARIANT, image_hash)),
            ),
            (true, false) => (image_url.clone(), None),
            (false, _) => (None, None),
        };

        Self {
            hash: record.record_id.to_string(),
            player: record.player_id.to_string(),
            player_name: record.player_name.clone(),
            cape_type: record.cape_type.to_string(),
            time: record.observed_at,
            width: record.width,
            height: record.height,
            extension: record.extension.clone(),
            exists,
            image_hash: exists.then(|| image_hash.to_string()),
            cape_url: exists.then(|| format!("{}/get/{}", base, record.record_id)),
            image_url,
            transform_urls,
            still_image,
            animated_image,
            animated: record.animated().then_some(true),
            animation_frames: record.animation_frames,
            changed: None,
            msg: None,
        }
    }

    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = Some(changed);
        self
    }

    /// Attach the human-readable found / not-found message.
    pub fn with_message(mut self) -> Self {
        let msg = if self.exists { MSG_CAPE_FOUND } else { MSG_NO_CAPE };
        self.msg = Some(msg.to_string());
        self
    }
}

/// All recorded capes of a player, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapeHistory {
    /// `None` when the history spans every type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub cape_type: Option<CapeType>,
    pub player: String,
    pub history: Vec<CapeInfo>,
}
