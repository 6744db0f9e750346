use crate::domain::{EngineError, Resolution, Result, StreamVariant, VideoCatalog};

/// Pick the variant for a requested label.
///
/// Exact height first, then the nearest lower height, then the nearest higher
/// one. Within one height the earliest variant in catalog order wins, so the
/// answer only depends on the catalog and the label.
pub fn select<'a>(catalog: &'a VideoCatalog, requested: &str) -> Result<&'a StreamVariant> {
    if catalog.variants.is_empty() {
        return Err(EngineError::NoStreamsAvailable);
    }
    let wanted = Resolution::parse(requested)
        .ok_or_else(|| EngineError::UnsupportedResolution(requested.to_string()))?
        .height;

    let first_with_height = |height: u32| {
        catalog
            .variants
            .iter()
            .find(|v| v.resolution.height == height)
    };

    if let Some(exact) = first_with_height(wanted) {
        return Ok(exact);
    }

    let heights = catalog.variants.iter().map(|v| v.resolution.height);
    let target = heights
        .clone()
        .filter(|h| *h < wanted)
        .max()
        .or_else(|| heights.filter(|h| *h > wanted).min());

    target
        .and_then(first_with_height)
        .ok_or(EngineError::NoStreamsAvailable)
}
