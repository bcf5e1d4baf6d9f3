use serde_json::Value;
use uuid::Uuid;

use crate::{id_type, messages::dto};

id_type!(ComponentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl From<dto::MediaKindV1> for MediaKind {
    fn from(value: dto::MediaKindV1) -> Self {
        match value {
            dto::MediaKindV1::Image => MediaKind::Image,
            dto::MediaKindV1::Audio => MediaKind::Audio,
            dto::MediaKindV1::Video => MediaKind::Video,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub id: Uuid,
    pub kind: MediaKind,
    pub url: String,
    pub mime: Option<String>,
    pub duration_sec: Option<f32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub metadata: Option<Value>,
    pub created_at: Option<u64>,
}

impl From<dto::MediaAssetV1> for MediaAsset {
    fn from(value: dto::MediaAssetV1) -> Self {
        Self {
            id: value.id,
            kind: value.kind.into(),
            url: value.url,
            mime: value.mime,
            duration_sec: value.duration_sec,
            width: value.width,
            height: value.height,
            metadata: value.metadata,
            created_at: value.created_at,
        }
    }
}

pub fn first_of_kind(assets: &[MediaAsset], kind: MediaKind) -> Option<&MediaAsset> {
    assets.iter().find(|asset| asset.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(kind: MediaKind, url: &str) -> MediaAsset {
        MediaAsset {
            id: Uuid::new_v4(),
            kind,
            url: url.to_string(),
            mime: None,
            duration_sec: None,
            width: None,
            height: None,
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn should_resolve_first_asset_of_each_kind() {
        // given
        let assets = vec![
            asset(MediaKind::Audio, "audio-1"),
            asset(MediaKind::Video, "video-1"),
            asset(MediaKind::Image, "image-1"),
            asset(MediaKind::Video, "video-2"),
            asset(MediaKind::Image, "image-2"),
        ];

        // when / then
        assert_eq!(
            first_of_kind(&assets, MediaKind::Video).map(|a| a.url.as_str()),
            Some("video-1")
        );
        assert_eq!(
            first_of_kind(&assets, MediaKind::Image).map(|a| a.url.as_str()),
            Some("image-1")
        );
        assert_eq!(
            first_of_kind(&assets, MediaKind::Audio).map(|a| a.url.as_str()),
            Some("audio-1")
        );
    }

    #[test]
    fn should_resolve_missing_kind_to_none() {
        // given
        let assets = vec![asset(MediaKind::Image, "image-1")];

        // when / then
        assert!(first_of_kind(&assets, MediaKind::Video).is_none());
        assert!(first_of_kind(&assets, MediaKind::Audio).is_none());
    }
}
