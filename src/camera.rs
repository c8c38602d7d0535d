//! The map camera: center, zoom and the animated fly-to.

use egui::{Pos2, Rect, Vec2};
use log::debug;

use crate::events::ViewState;
use crate::projection::{GeoPos, MapProjection, TILE_SIZE, lat_to_y, lon_to_x, x_to_lon, y_to_lat};

/// Latitude where the Web Mercator square ends.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// The result of advancing the camera clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CameraTick {
    /// Nothing is animating.
    Idle,
    /// A flight is in progress.
    Moving,
    /// A flight just finished.
    Settled(ViewState),
}

#[derive(Clone, Debug)]
struct Flight {
    // Start and end in zoom 0 tile space, where the world is the unit square.
    from: (f64, f64),
    to: (f64, f64),
    from_zoom: f64,
    to_zoom: f64,
    duration: f64,
    started_at: Option<f64>,
}

/// The camera of a map surface.
#[derive(Clone, Debug)]
pub struct Camera {
    center: GeoPos,
    zoom: f64,
    min_zoom: f64,
    max_zoom: f64,
    flight: Option<Flight>,
    moved: bool,
}

impl Camera {
    /// Creates a camera looking at `center`.
    pub fn new(center: GeoPos, zoom: f64, min_zoom: f64, max_zoom: f64) -> Self {
        Self {
            center: clamp_center(center),
            zoom: zoom.clamp(min_zoom, max_zoom),
            min_zoom,
            max_zoom,
            flight: None,
            moved: false,
        }
    }

    /// The geographical center.
    pub fn center(&self) -> GeoPos {
        self.center
    }

    /// The zoom level.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// The view as reported to the host.
    pub fn view_state(&self) -> ViewState {
        ViewState {
            zoom: self.zoom,
            center_lat: self.center.lat,
            center_lon: self.center.lon,
        }
    }

    /// A projection for the given viewport.
    pub fn projection(&self, viewport: Rect) -> MapProjection {
        MapProjection::new(self.zoom, self.center, viewport)
    }

    /// Whether a flight is in progress.
    pub fn is_flying(&self) -> bool {
        self.flight.is_some()
    }

    /// Starts flying to `target`. A flight that is already running is retargeted from
    /// the current position instead of being queued.
    pub fn fly_to(&mut self, target: GeoPos, zoom: f64, duration: f64) {
        let target = clamp_center(target);
        if self.flight.is_some() {
            debug!("Retargeting camera flight to ({}, {})", target.lat, target.lon);
        }
        self.flight = Some(Flight {
            from: to_unit(self.center),
            to: to_unit(target),
            from_zoom: self.zoom,
            to_zoom: zoom.clamp(self.min_zoom, self.max_zoom),
            duration,
            started_at: None,
        });
    }

    /// Stops any flight where it is.
    pub fn cancel_flight(&mut self) {
        if self.flight.take().is_some() {
            debug!("Camera flight cancelled");
            self.moved = true;
        }
    }

    /// Advances a running flight to `now` (seconds on the frame clock).
    pub fn advance(&mut self, now: f64) -> CameraTick {
        let Some(flight) = self.flight.as_mut() else {
            return CameraTick::Idle;
        };

        let started_at = *flight.started_at.get_or_insert(now);
        let t = if flight.duration <= 0.0 {
            1.0
        } else {
            ((now - started_at) / flight.duration).clamp(0.0, 1.0)
        };
        let eased = ease_in_out(t);

        let x = flight.from.0 + (flight.to.0 - flight.from.0) * eased;
        let y = flight.from.1 + (flight.to.1 - flight.from.1) * eased;
        self.center = from_unit((x, y));
        self.zoom = flight.from_zoom + (flight.to_zoom - flight.from_zoom) * eased;

        if t >= 1.0 {
            self.flight = None;
            self.moved = false;
            CameraTick::Settled(self.view_state())
        } else {
            CameraTick::Moving
        }
    }

    /// Pans by a screen delta, as when dragging the map.
    pub fn pan_by(&mut self, delta: Vec2, viewport: Rect) {
        self.cancel_flight();

        let center_x = lon_to_x(self.center.lon, self.zoom);
        let center_y = lat_to_y(self.center.lat, self.zoom);
        let mut new_center_x = center_x - delta.x as f64 / TILE_SIZE;
        let mut new_center_y = center_y - delta.y as f64 / TILE_SIZE;

        // Clamp the new center to the map boundaries.
        let world_size_in_tiles = 2.0_f64.powf(self.zoom);
        let view_size_in_tiles_x = viewport.width() as f64 / TILE_SIZE;
        let view_size_in_tiles_y = viewport.height() as f64 / TILE_SIZE;

        let min_center_x = view_size_in_tiles_x / 2.0;
        let max_center_x = world_size_in_tiles - view_size_in_tiles_x / 2.0;
        let min_center_y = view_size_in_tiles_y / 2.0;
        let max_center_y = world_size_in_tiles - view_size_in_tiles_y / 2.0;

        // If the map is smaller than the viewport, center it. Otherwise, clamp the center.
        new_center_x = if min_center_x > max_center_x {
            world_size_in_tiles / 2.0
        } else {
            new_center_x.clamp(min_center_x, max_center_x)
        };
        new_center_y = if min_center_y > max_center_y {
            world_size_in_tiles / 2.0
        } else {
            new_center_y.clamp(min_center_y, max_center_y)
        };

        self.center = GeoPos {
            lon: x_to_lon(new_center_x, self.zoom),
            lat: y_to_lat(new_center_y, self.zoom),
        };
        self.moved = true;
    }

    /// Zooms by `steps` levels while keeping the point under `pointer` in place.
    pub fn zoom_at(&mut self, pointer: Pos2, steps: f64, viewport: Rect) {
        self.cancel_flight();

        let old_zoom = self.zoom;
        let mut new_zoom = (old_zoom + steps).clamp(self.min_zoom, self.max_zoom);

        // Zooming out must not make the world smaller than the widget.
        if steps < 0.0 {
            let world_pixel_size = 2.0_f64.powf(new_zoom) * TILE_SIZE;
            if world_pixel_size < viewport.width() as f64 || world_pixel_size < viewport.height() as f64
            {
                new_zoom = old_zoom;
            }
        }
        if new_zoom == old_zoom {
            return;
        }

        let projection = self.projection(viewport);
        let target = projection.unproject(pointer);
        let mouse_rel = pointer - viewport.min;
        let widget_center_x = viewport.width() as f64 / 2.0;
        let widget_center_y = viewport.height() as f64 / 2.0;

        // Adjust the map center so the geo-coordinate under the pointer remains the same.
        let new_center_x =
            lon_to_x(target.lon, new_zoom) - (mouse_rel.x as f64 - widget_center_x) / TILE_SIZE;
        let new_center_y =
            lat_to_y(target.lat, new_zoom) - (mouse_rel.y as f64 - widget_center_y) / TILE_SIZE;

        self.zoom = new_zoom;
        self.center = clamp_center(GeoPos {
            lon: x_to_lon(new_center_x, new_zoom),
            lat: y_to_lat(new_center_y, new_zoom),
        });
        self.moved = true;
    }

    /// Reports the view once after user movement has stopped.
    pub fn settle(&mut self) -> Option<ViewState> {
        if std::mem::take(&mut self.moved) {
            Some(self.view_state())
        } else {
            None
        }
    }
}

fn clamp_center(pos: GeoPos) -> GeoPos {
    GeoPos {
        lon: pos.lon.clamp(-180.0, 180.0),
        lat: pos.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE),
    }
}

fn to_unit(pos: GeoPos) -> (f64, f64) {
    (lon_to_x(pos.lon, 0.0), lat_to_y(pos.lat, 0.0))
}

fn from_unit((x, y): (f64, f64)) -> GeoPos {
    GeoPos {
        lon: x_to_lon(x, 0.0),
        lat: y_to_lat(y, 0.0),
    }
}

fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}
