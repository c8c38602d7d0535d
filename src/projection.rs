//! Map projection.

use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// The size of a map tile in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// A geographical position. (longitude, latitude)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl GeoPos {
    /// Creates a position from latitude and longitude, in that order.
    pub fn from_lat_lon(lat: f64, lon: f64) -> Self {
        Self { lon, lat }
    }
}

impl From<(f64, f64)> for GeoPos {
    fn from((lon, lat): (f64, f64)) -> Self {
        Self { lon, lat }
    }
}

impl From<GeoPos> for (f64, f64) {
    fn from(pos: GeoPos) -> Self {
        (pos.lon, pos.lat)
    }
}

/// Converts longitude to the x-coordinate of a tile at a given zoom level.
pub(crate) fn lon_to_x(lon: f64, zoom: f64) -> f64 {
    (lon + 180.0) / 360.0 * 2.0_f64.powf(zoom)
}

/// Converts latitude to the y-coordinate of a tile at a given zoom level.
pub(crate) fn lat_to_y(lat: f64, zoom: f64) -> f64 {
    (1.0 - lat.to_radians().tan().asinh() / std::f64::consts::PI) / 2.0 * 2.0_f64.powf(zoom)
}

/// Converts the x-coordinate of a tile to longitude at a given zoom level.
pub(crate) fn x_to_lon(x: f64, zoom: f64) -> f64 {
    x / 2.0_f64.powf(zoom) * 360.0 - 180.0
}

/// Converts the y-coordinate of a tile to latitude at a given zoom level.
pub(crate) fn y_to_lat(y: f64, zoom: f64) -> f64 {
    let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * y / 2.0_f64.powf(zoom);
    n.sinh().atan().to_degrees()
}

/// A helper for converting between geographical and screen coordinates.
#[derive(Clone, Copy, Debug)]
pub struct MapProjection {
    zoom: f64,
    center: GeoPos,
    widget_rect: Rect,
}

impl MapProjection {
    /// Creates a new `MapProjection` for a camera looking at `center` with `zoom`.
    pub fn new(zoom: f64, center: GeoPos, widget_rect: Rect) -> Self {
        Self {
            zoom,
            center,
            widget_rect,
        }
    }

    /// The zoom level of the projection.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// The geographical center of the projection.
    pub fn center(&self) -> GeoPos {
        self.center
    }

    /// The screen rectangle the projection maps into.
    pub fn widget_rect(&self) -> Rect {
        self.widget_rect
    }

    /// Projects a geographical coordinate to a screen coordinate.
    pub fn project(&self, geo_pos: GeoPos) -> Pos2 {
        let center_x = lon_to_x(self.center.lon, self.zoom);
        let center_y = lat_to_y(self.center.lat, self.zoom);

        let tile_x = lon_to_x(geo_pos.lon, self.zoom);
        let tile_y = lat_to_y(geo_pos.lat, self.zoom);

        let dx = (tile_x - center_x) * TILE_SIZE;
        let dy = (tile_y - center_y) * TILE_SIZE;

        self.widget_rect.center() + Vec2::new(dx as f32, dy as f32)
    }

    /// Un-projects a screen coordinate to a geographical coordinate.
    pub fn unproject(&self, screen_pos: Pos2) -> GeoPos {
        let rel_pos = screen_pos - self.widget_rect.min;
        let widget_center_x = self.widget_rect.width() as f64 / 2.0;
        let widget_center_y = self.widget_rect.height() as f64 / 2.0;

        let center_x = lon_to_x(self.center.lon, self.zoom);
        let center_y = lat_to_y(self.center.lat, self.zoom);

        let target_x = center_x + (rel_pos.x as f64 - widget_center_x) / TILE_SIZE;
        let target_y = center_y + (rel_pos.y as f64 - widget_center_y) / TILE_SIZE;

        GeoPos {
            lon: x_to_lon(target_x, self.zoom),
            lat: y_to_lat(target_y, self.zoom),
        }
    }
}
