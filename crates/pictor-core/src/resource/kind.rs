//! Locator classification.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;

/// What kind of resource a locator identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// SVG document, rendered by a vector renderer
    VectorGraphic,
    /// Image bundled with the application
    RasterAsset,
    /// Image served over HTTP(S); goes through the cache store
    NetworkImage,
    /// Image on device storage
    LocalFile,
    /// JSON animation document
    Animation,
    /// Unrecognized kind tag. [`classify`] never returns this.
    #[serde(other)]
    Unknown,
}

impl ResourceKind {
    /// Return the canonical kebab-case tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::VectorGraphic => "vector-graphic",
            ResourceKind::RasterAsset => "raster-asset",
            ResourceKind::NetworkImage => "network-image",
            ResourceKind::LocalFile => "local-file",
            ResourceKind::Animation => "animation",
            ResourceKind::Unknown => "unknown",
        }
    }

    /// Whether resolving this kind requires network access.
    pub fn is_remote(&self) -> bool {
        matches!(self, ResourceKind::NetworkImage)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "vector-graphic" => ResourceKind::VectorGraphic,
            "raster-asset" => ResourceKind::RasterAsset,
            "network-image" => ResourceKind::NetworkImage,
            "local-file" => ResourceKind::LocalFile,
            "animation" => ResourceKind::Animation,
            _ => ResourceKind::Unknown,
        })
    }
}

/// Classify a locator by its prefix and suffix.
///
/// Checks run in a fixed order and the first match wins, so a URL ending in
/// `.svg` is still a [`ResourceKind::NetworkImage`]. Matching is
/// case-sensitive and the locator is not normalized. Anything unmatched,
/// including the empty string, is a [`ResourceKind::RasterAsset`].
pub fn classify(locator: &str) -> ResourceKind {
    if locator.starts_with("http://") || locator.starts_with("https://") {
        ResourceKind::NetworkImage
    } else if locator.ends_with(".svg") {
        ResourceKind::VectorGraphic
    } else if locator.ends_with(".json") {
        ResourceKind::Animation
    } else if locator.starts_with("/data") || locator.starts_with("/storage") {
        ResourceKind::LocalFile
    } else {
        ResourceKind::RasterAsset
    }
}
