//! Configuration for the basemap tile providers.

use crate::TileId;
use crate::engine::Imagery;

/// Configuration for a basemap tile provider.
pub trait BasemapConfig {
    /// Returns the URL for a given tile.
    fn tile_url(&self, tile: &TileId) -> String;

    /// Returns the attribution text to be displayed on the map. If returns `None`, no attribution is shown.
    fn attribution(&self) -> Option<&String>;

    /// Returns the attribution URL to be linked from the attribution text.
    fn attribution_url(&self) -> Option<&String>;

    /// The default geographical center of the map. (longitude, latitude)
    fn default_center(&self) -> (f64, f64) {
        // Berlin
        (13.404954, 52.520008)
    }

    /// The default zoom level of the map.
    fn default_zoom(&self) -> u8 {
        6
    }
}

/// Configuration for the stylized dark basemap.
///
/// # Example
///
/// ```
/// use weinkarte::config::DarkBasemapConfig;
/// let config = DarkBasemapConfig::new("my-api-key");
/// ```
pub struct DarkBasemapConfig {
    base_url: String,
    attribution: String,
    attribution_url: String,
    api_key: String,
}

impl DarkBasemapConfig {
    /// Creates a new `DarkBasemapConfig` with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.maptiler.com/maps/dataviz-dark".to_string(),
            attribution: "© MapTiler © OpenStreetMap contributors".to_string(),
            attribution_url: "https://www.maptiler.com/copyright/".to_string(),
            api_key: api_key.into(),
        }
    }
}

impl BasemapConfig for DarkBasemapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        format!(
            "{}/{}/{}/{}.png?key={}",
            self.base_url, tile.z, tile.x, tile.y, self.api_key
        )
    }

    fn attribution(&self) -> Option<&String> {
        Some(&self.attribution)
    }

    fn attribution_url(&self) -> Option<&String> {
        Some(&self.attribution_url)
    }
}

/// Configuration for the satellite imagery basemap.
///
/// # Example
///
/// ```
/// use weinkarte::config::SatelliteBasemapConfig;
/// let config = SatelliteBasemapConfig::new("my-api-key");
/// ```
pub struct SatelliteBasemapConfig {
    base_url: String,
    attribution: String,
    attribution_url: String,
    api_key: String,
}

impl SatelliteBasemapConfig {
    /// Creates a new `SatelliteBasemapConfig` with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.maptiler.com/tiles/satellite-v2".to_string(),
            attribution: "© MapTiler © OpenStreetMap contributors".to_string(),
            attribution_url: "https://www.maptiler.com/copyright/".to_string(),
            api_key: api_key.into(),
        }
    }
}

impl BasemapConfig for SatelliteBasemapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        format!(
            "{}/{}/{}/{}.jpg?key={}",
            self.base_url, tile.z, tile.x, tile.y, self.api_key
        )
    }

    fn attribution(&self) -> Option<&String> {
        Some(&self.attribution)
    }

    fn attribution_url(&self) -> Option<&String> {
        Some(&self.attribution_url)
    }
}

/// Builds the basemap configuration for an imagery mode with the given API key.
pub fn basemap_for(imagery: Imagery, api_key: &str) -> Box<dyn BasemapConfig> {
    match imagery {
        Imagery::Stylized => Box::new(DarkBasemapConfig::new(api_key)),
        Imagery::Satellite => Box::new(SatelliteBasemapConfig::new(api_key)),
    }
}
