use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{MetadataProvider, PlayabilityStatus, StreamEntry, VideoMetadataResponse};
use crate::domain::{EngineError, Resolution, Result, StreamVariant, VideoCatalog, VideoIdentifier};
use crate::utils::get_timestamp;

#[derive(Clone)]
pub struct StreamCatalogResolver {
    provider: Arc<dyn MetadataProvider>,
}

impl StreamCatalogResolver {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self { provider }
    }

    pub async fn resolve_url(&self, url: &str) -> Result<VideoCatalog> {
        let id = VideoIdentifier::parse(url)?;
        self.resolve(&id).await
    }

    /// `id` is valid by construction; see `VideoIdentifier::parse`.
    pub async fn resolve(&self, id: &VideoIdentifier) -> Result<VideoCatalog> {
        info!("resolving catalog for {}", id);
        let metadata = self.provider.lookup(id).await.map_err(|e| {
            warn!("metadata lookup for {} failed: {}", id, e);
            if e.is_transient() {
                EngineError::Unreachable(e.to_string())
            } else {
                EngineError::from_api(&e)
            }
        })?;

        check_playability(id, &metadata)?;
        build_catalog(id.clone(), metadata, get_timestamp())
    }
}

fn check_playability(id: &VideoIdentifier, metadata: &VideoMetadataResponse) -> Result<()> {
    let reason = || {
        metadata
            .reason
            .clone()
            .unwrap_or_else(|| format!("{:?}", metadata.playability_status))
    };
    match metadata.playability_status {
        PlayabilityStatus::Ok => Ok(()),
        PlayabilityStatus::LoginRequired
        | PlayabilityStatus::AgeRestricted
        | PlayabilityStatus::RegionRestricted => {
            warn!("{} is restricted: {}", id, reason());
            Err(EngineError::Restricted(reason()))
        }
        PlayabilityStatus::UnplayableNotFound => Err(EngineError::NotFound(id.to_string())),
        PlayabilityStatus::Unplayable => {
            warn!("{} is unplayable: {}", id, reason());
            Err(EngineError::NoStreamsAvailable)
        }
    }
}

fn to_variant(entry: StreamEntry, now: u64) -> Option<StreamVariant> {
    let Some(resolution) = Resolution::parse(&entry.resolution) else {
        debug!("dropping non-video stream {:?}", entry.resolution);
        return None;
    };
    if entry.url.trim().is_empty() {
        debug!("dropping {} stream without a locator", entry.resolution);
        return None;
    }
    let variant = StreamVariant {
        resolution,
        codec: entry.codec,
        container: entry.container,
        approximate_size: entry.content_length,
        locator: entry.url,
        expiry: entry.expires_at,
    };
    if variant.is_expired(now) {
        debug!("dropping expired {} stream", variant.resolution);
        return None;
    }
    Some(variant)
}

fn build_catalog(
    id: VideoIdentifier,
    metadata: VideoMetadataResponse,
    now: u64,
) -> Result<VideoCatalog> {
    let mut variants: Vec<StreamVariant> = metadata
        .streams
        .into_iter()
        .filter_map(|entry| to_variant(entry, now))
        .collect();

    if variants.is_empty() {
        warn!("{} has no usable streams", id);
        return Err(EngineError::NoStreamsAvailable);
    }

    variants.sort_by(|a, b| {
        b.resolution
            .height
            .cmp(&a.resolution.height)
            .then_with(|| b.resolution.fps.cmp(&a.resolution.fps))
            .then_with(|| a.container.cmp(&b.container))
            .then_with(|| a.codec.cmp(&b.codec))
            .then_with(|| a.locator.cmp(&b.locator))
    });

    let thumbnail_url = metadata
        .thumbnail_url
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", id));

    info!("{} resolved with {} variants", id, variants.len());
    Ok(VideoCatalog {
        id,
        title: metadata.title,
        thumbnail_url,
        variants,
    })
}
