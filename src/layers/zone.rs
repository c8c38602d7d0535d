//! A layer for risk zone polygons.

use egui::{Color32, Mesh, Painter, Pos2, Shape, Stroke};
use log::warn;

use crate::layers::{Layer, dist_sq_to_segment, point_in_polygon};
use crate::projection::{GeoPos, MapProjection};
use crate::scene::Feature;
use crate::store::{Zone, ZoneId};

/// A zone polygon as placed in the scene graph.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneFeature {
    /// The zone in the store this feature draws.
    pub id: ZoneId,
    /// Closed ring.
    pub ring: Vec<GeoPos>,
    /// Risk score used for styling.
    pub risk_score: u8,
}

impl From<&Zone> for ZoneFeature {
    fn from(zone: &Zone) -> Self {
        Self {
            id: zone.id.clone(),
            ring: zone.ring.clone(),
            risk_score: zone.risk_score,
        }
    }
}

/// Fill and outline colors for a risk score.
pub fn risk_colors(risk_score: u8) -> (Color32, Color32) {
    match risk_score {
        70.. => (
            Color32::from_rgba_unmultiplied(220, 38, 38, 70),
            Color32::from_rgb(185, 28, 28),
        ),
        40..=69 => (
            Color32::from_rgba_unmultiplied(245, 158, 11, 70),
            Color32::from_rgb(180, 83, 9),
        ),
        _ => (
            Color32::from_rgba_unmultiplied(34, 197, 94, 60),
            Color32::from_rgb(21, 128, 61),
        ),
    }
}

/// Layer that draws risk zones and finds the zone under a click.
#[derive(Clone, Debug)]
pub struct ZoneLayer {
    zones: Vec<ZoneFeature>,

    /// Width of the zone outlines.
    pub stroke_width: f32,

    /// Clicks closer than this many pixels to an outline count as hits.
    pub edge_tolerance: f32,
}

impl Default for ZoneLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneLayer {
    /// Creates an empty `ZoneLayer`.
    pub fn new() -> Self {
        Self {
            zones: Vec::new(),
            stroke_width: 2.0,
            edge_tolerance: 3.0,
        }
    }

    /// Replaces all zone features.
    pub fn set_zones(&mut self, zones: Vec<ZoneFeature>) {
        self.zones = zones;
    }

    /// The zone features in draw order.
    pub fn zones(&self) -> &[ZoneFeature] {
        &self.zones
    }
}

impl Layer for ZoneLayer {
    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        for zone in &self.zones {
            let mut screen_points: Vec<Pos2> =
                zone.ring.iter().map(|p| projection.project(*p)).collect();
            // The ring is closed, earcut and the path want the open form.
            if screen_points.len() > 1 && screen_points.first() == screen_points.last() {
                screen_points.pop();
            }
            if screen_points.len() < 3 {
                warn!("Zone {} has too few points to draw", zone.id);
                continue;
            }

            let (fill, outline) = risk_colors(zone.risk_score);

            // Triangulate for the fill.
            let flat_points: Vec<f64> = screen_points
                .iter()
                .flat_map(|p| [p.x as f64, p.y as f64])
                .collect();
            match earcutr::earcut(&flat_points, &[], 2) {
                Ok(indices) => {
                    let mut mesh = Mesh::default();
                    mesh.vertices = screen_points
                        .iter()
                        .map(|p| egui::epaint::Vertex {
                            pos: *p,
                            uv: Default::default(),
                            color: fill,
                        })
                        .collect();
                    mesh.indices = indices.into_iter().map(|i| i as u32).collect();
                    painter.add(Shape::Mesh(mesh.into()));
                }
                Err(e) => warn!("Unable to triangulate zone {}: {:?}", zone.id, e),
            }

            painter.add(Shape::closed_line(
                screen_points,
                Stroke::new(self.stroke_width, outline),
            ));
        }
    }

    fn hit_test(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<Feature> {
        let tolerance_sq = self.edge_tolerance.powi(2);

        // Later zones are drawn on top, so they win.
        self.zones.iter().rev().find_map(|zone| {
            let screen_points: Vec<Pos2> =
                zone.ring.iter().map(|p| projection.project(*p)).collect();
            let on_edge = screen_points
                .windows(2)
                .any(|edge| dist_sq_to_segment(screen_pos, edge[0], edge[1]) <= tolerance_sq);

            if on_edge || point_in_polygon(screen_pos, &screen_points) {
                Some(Feature::Zone(zone.clone()))
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{Rect, pos2, vec2};

    fn projection() -> MapProjection {
        MapProjection::new(
            8.0,
            GeoPos::from_lat_lon(33.75, -84.39),
            Rect::from_min_size(pos2(0.0, 0.0), vec2(800.0, 600.0)),
        )
    }

    fn square(id: &str, center: GeoPos, half: f64, risk_score: u8) -> ZoneFeature {
        let (lon, lat) = (center.lon, center.lat);
        ZoneFeature {
            id: ZoneId::new(id),
            ring: vec![
                GeoPos { lon: lon - half, lat: lat - half },
                GeoPos { lon: lon + half, lat: lat - half },
                GeoPos { lon: lon + half, lat: lat + half },
                GeoPos { lon: lon - half, lat: lat + half },
                GeoPos { lon: lon - half, lat: lat - half },
            ],
            risk_score,
        }
    }

    #[test]
    fn zone_layer_new() {
        let layer = ZoneLayer::default();
        assert!(layer.zones().is_empty());
        assert!(layer.hit_test(pos2(400.0, 300.0), &projection()).is_none());
    }

    #[test]
    fn hit_inside_and_on_edge() {
        let projection = projection();
        let center = GeoPos::from_lat_lon(33.75, -84.39);
        let mut layer = ZoneLayer::new();
        layer.set_zones(vec![square("z", center, 0.2, 82)]);

        let inside = projection.project(center);
        assert!(matches!(
            layer.hit_test(inside, &projection),
            Some(Feature::Zone(zone)) if zone.id.as_str() == "z"
        ));

        let corner = projection.project(GeoPos { lon: center.lon - 0.2, lat: center.lat - 0.2 });
        assert!(layer.hit_test(corner + vec2(-1.0, 1.0), &projection).is_some());

        let outside = projection.project(GeoPos { lon: center.lon + 0.5, lat: center.lat });
        assert!(layer.hit_test(outside, &projection).is_none());
    }

    #[test]
    fn top_most_zone_wins() {
        let projection = projection();
        let center = GeoPos::from_lat_lon(33.75, -84.39);
        let mut layer = ZoneLayer::new();
        layer.set_zones(vec![
            square("below", center, 0.5, 10),
            square("above", center, 0.1, 90),
        ]);

        let hit = layer.hit_test(projection.project(center), &projection);
        assert!(matches!(hit, Some(Feature::Zone(zone)) if zone.id.as_str() == "above"));
    }

    #[test]
    fn risk_colors_by_band() {
        assert_eq!(risk_colors(82), risk_colors(100));
        assert_ne!(risk_colors(82), risk_colors(50));
        assert_ne!(risk_colors(50), risk_colors(10));
        assert_eq!(risk_colors(0), risk_colors(39));
    }
}
