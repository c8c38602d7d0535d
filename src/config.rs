//! Configuration for map providers and map behavior.

use serde::{Deserialize, Serialize};

use crate::TileId;
use crate::events::DEFAULT_NAVIGATION_ZOOM;
use crate::projection::GeoPos;

/// Configuration for a map provider.
pub trait MapConfig {
    /// Returns the URL for a given tile.
    fn tile_url(&self, tile: &TileId) -> String;

    /// Returns the attribution text to be displayed on the map. If returns `None`, no attribution is shown.
    fn attribution(&self) -> Option<&String>;

    /// Returns the attribution URL to be linked from the attribution text.
    fn attribution_url(&self) -> Option<&String>;

    /// The default geographical center of the map.
    fn default_center(&self) -> GeoPos;

    /// The default zoom level of the map.
    fn default_zoom(&self) -> f64;
}

/// Configuration for the OpenStreetMap tile server.
///
/// # Example
///
/// ```
/// use egui_risk_map::config::OpenStreetMapConfig;
/// let config = OpenStreetMapConfig::default();
/// ```
#[cfg(feature = "openstreetmap")]
pub struct OpenStreetMapConfig {
    base_url: String,
    attribution: String,
    attribution_url: String,
    default_center: GeoPos,
    default_zoom: f64,
}

#[cfg(feature = "openstreetmap")]
impl Default for OpenStreetMapConfig {
    fn default() -> Self {
        Self {
            base_url: "https://tile.openstreetmap.org".to_string(),
            attribution: "© OpenStreetMap contributors".to_string(),
            attribution_url: "https://www.openstreetmap.org".to_string(),
            default_center: GeoPos::from_lat_lon(33.749, -84.388), // Atlanta, USA
            default_zoom: 11.0,
        }
    }
}

#[cfg(feature = "openstreetmap")]
impl MapConfig for OpenStreetMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        format!("{}/{}/{}/{}.png", self.base_url, tile.z, tile.x, tile.y)
    }

    fn attribution(&self) -> Option<&String> {
        Some(&self.attribution)
    }

    fn attribution_url(&self) -> Option<&String> {
        Some(&self.attribution_url)
    }

    fn default_center(&self) -> GeoPos {
        self.default_center
    }

    fn default_zoom(&self) -> f64 {
        self.default_zoom
    }
}

/// A tile server described by a URL template such as
/// `https://{s}.tile.example.org/{z}/{x}/{y}.png`.
///
/// `{s}` is replaced with one of the subdomains, chosen from the tile position so the
/// same tile always comes from the same host.
///
/// # Example
///
/// ```
/// use egui_risk_map::config::UrlTemplateConfig;
/// let config = UrlTemplateConfig::new("https://{s}.tiles.example.org/{z}/{x}/{y}.png")
///     .with_subdomains(["a", "b", "c"])
///     .with_attribution("© Example", Some("https://example.org"));
/// ```
#[derive(Clone, Debug)]
pub struct UrlTemplateConfig {
    template: String,
    subdomains: Vec<String>,
    attribution: Option<String>,
    attribution_url: Option<String>,
    default_center: GeoPos,
    default_zoom: f64,
}

impl UrlTemplateConfig {
    /// Creates a configuration from a URL template.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            subdomains: Vec::new(),
            attribution: None,
            attribution_url: None,
            default_center: GeoPos::default(),
            default_zoom: 2.0,
        }
    }

    /// Sets the values `{s}` is replaced with.
    pub fn with_subdomains<S: Into<String>>(mut self, subdomains: impl IntoIterator<Item = S>) -> Self {
        self.subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the attribution text and link.
    pub fn with_attribution(mut self, text: impl Into<String>, url: Option<&str>) -> Self {
        self.attribution = Some(text.into());
        self.attribution_url = url.map(str::to_string);
        self
    }

    /// Sets the initial view.
    pub fn with_default_view(mut self, center: GeoPos, zoom: f64) -> Self {
        self.default_center = center;
        self.default_zoom = zoom;
        self
    }
}

impl MapConfig for UrlTemplateConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        let mut url = self
            .template
            .replace("{z}", &tile.z.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string());
        if !self.subdomains.is_empty() {
            let index = (tile.x as usize + tile.y as usize) % self.subdomains.len();
            url = url.replace("{s}", &self.subdomains[index]);
        }
        url
    }

    fn attribution(&self) -> Option<&String> {
        self.attribution.as_ref()
    }

    fn attribution_url(&self) -> Option<&String> {
        self.attribution_url.as_ref()
    }

    fn default_center(&self) -> GeoPos {
        self.default_center
    }

    fn default_zoom(&self) -> f64 {
        self.default_zoom
    }
}

/// A dynamic map configuration that allows defining a custom tile URL function at runtime.
///
/// # Example
///
/// ```
/// use egui_risk_map::config::DynMapConfig;
/// let config = DynMapConfig::new(|tile| format!("https://my-tile-server/{}/{}/{}.png", tile.z, tile.x, tile.y));
/// ```
pub struct DynMapConfig {
    tile_url: Box<dyn Fn(&TileId) -> String>,
}

impl DynMapConfig {
    /// Creates a new `DynMapConfig` with a custom tile URL function.
    pub fn new(tile_url: impl Fn(&TileId) -> String + 'static) -> Self {
        Self {
            tile_url: Box::new(tile_url),
        }
    }
}

impl MapConfig for DynMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        (self.tile_url)(tile)
    }

    fn attribution(&self) -> Option<&String> {
        None
    }

    fn attribution_url(&self) -> Option<&String> {
        None
    }

    fn default_center(&self) -> GeoPos {
        GeoPos::default()
    }

    fn default_zoom(&self) -> f64 {
        2.0
    }
}

/// Behavior of a map surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapOptions {
    /// Lowest zoom the camera goes to.
    pub min_zoom: f64,
    /// Highest zoom the camera goes to.
    pub max_zoom: f64,
    /// Zoom of navigation commands that do not carry one.
    pub navigation_zoom: f64,
    /// Length of a fly-to animation in seconds.
    pub flight_duration: f64,
    /// Radius of marker pins in pixels.
    pub marker_radius: f32,
    /// Extra pixels around a marker pin that still count as a click on it.
    pub hit_tolerance: f32,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            min_zoom: f64::from(crate::MIN_ZOOM),
            max_zoom: f64::from(crate::MAX_ZOOM),
            navigation_zoom: DEFAULT_NAVIGATION_ZOOM,
            flight_duration: 1.0,
            marker_radius: 8.0,
            hit_tolerance: 4.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TileId;

    #[test]
    #[cfg(feature = "openstreetmap")]
    fn openstreetmap_config_default() {
        let config = OpenStreetMapConfig::default();
        assert_eq!(config.base_url, "https://tile.openstreetmap.org");
        assert_eq!(config.attribution, "© OpenStreetMap contributors");
        assert_eq!(config.default_center, GeoPos::from_lat_lon(33.749, -84.388));
        assert_eq!(config.default_zoom, 11.0);
    }

    #[test]
    #[cfg(feature = "openstreetmap")]
    fn openstreetmap_config_tile_url() {
        let config = OpenStreetMapConfig::default();
        let tile_id = TileId { z: 10, x: 1, y: 2 };
        let url = config.tile_url(&tile_id);
        assert_eq!(url, "https://tile.openstreetmap.org/10/1/2.png");
    }

    #[test]
    fn url_template_config_tile_url() {
        let config = UrlTemplateConfig::new("https://{s}.tiles.test/{z}/{x}/{y}.png")
            .with_subdomains(["a", "b", "c"]);
        // (x + y) % 3 picks the subdomain.
        let cases = [
            (TileId { z: 3, x: 0, y: 0 }, "https://a.tiles.test/3/0/0.png"),
            (TileId { z: 3, x: 1, y: 0 }, "https://b.tiles.test/3/1/0.png"),
            (TileId { z: 3, x: 4, y: 1 }, "https://c.tiles.test/3/4/1.png"),
        ];
        for (tile, expected) in cases {
            assert_eq!(config.tile_url(&tile), expected);
        }
    }

    #[test]
    fn url_template_config_without_subdomains() {
        let config = UrlTemplateConfig::new("https://tiles.test/{z}/{y}/{x}.png");
        assert_eq!(
            config.tile_url(&TileId { z: 10, x: 559, y: 330 }),
            "https://tiles.test/10/330/559.png"
        );
        assert!(config.attribution().is_none());

        let config = config.with_attribution("© Test", None);
        assert_eq!(config.attribution().map(String::as_str), Some("© Test"));
        assert!(config.attribution_url().is_none());
    }

    #[test]
    fn dyn_config_tile_url() {
        let config = DynMapConfig::new(|tile| format!("{}-{}-{}", tile.z, tile.x, tile.y));
        assert_eq!(config.tile_url(&TileId { z: 1, x: 2, y: 3 }), "1-2-3");
    }

    #[test]
    fn map_options_fill_missing_fields() {
        let options: MapOptions =
            serde_json::from_str(r#"{"flightDuration": 0.25, "maxZoom": 17}"#).unwrap();
        assert_eq!(options.flight_duration, 0.25);
        assert_eq!(options.max_zoom, 17.0);
        assert_eq!(options.min_zoom, 0.0);
        assert_eq!(options.navigation_zoom, DEFAULT_NAVIGATION_ZOOM);
    }
}
