//! The drawable layers of the scene graph.

use egui::{Painter, Pos2};

use crate::projection::MapProjection;
use crate::scene::Feature;

/// Heat layer
pub mod heat;

/// Marker layer
pub mod marker;

/// Tile layer
pub mod tile;

/// Zone layer
pub mod zone;

/// A trait for map layers.
pub trait Layer {
    /// Called before drawing with access to the egui context, e.g. to start loading
    /// resources for the current view.
    fn prepare(&mut self, _ctx: &egui::Context, _projection: &MapProjection) {}

    /// Draws the layer.
    fn draw(&self, painter: &Painter, projection: &MapProjection);

    /// Returns the top-most interactive feature under `screen_pos`, if any.
    fn hit_test(&self, _screen_pos: Pos2, _projection: &MapProjection) -> Option<Feature> {
        None
    }
}

/// Calculates the squared distance from a point to a line segment.
pub(crate) fn dist_sq_to_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let ap = p - a;
    let l2 = ab.length_sq();

    if l2 == 0.0 {
        // The segment is a point.
        return ap.length_sq();
    }

    // Project point p onto the line defined by a and b.
    // `t` is the normalized distance from a to the projection.
    let t = (ap.dot(ab) / l2).clamp(0.0, 1.0);

    // The closest point on the line segment.
    let closest_point = a + t * ab;

    p.distance_sq(closest_point)
}

/// Even-odd test of a point against a polygon ring. The ring may be open or closed.
pub(crate) fn point_in_polygon(p: Pos2, ring: &[Pos2]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}
