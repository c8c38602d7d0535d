//! A layer for point markers.

use egui::{Color32, Painter, Pos2, Stroke, vec2};
use std::collections::HashMap;

use crate::layers::Layer;
use crate::projection::{GeoPos, MapProjection};
use crate::scene::Feature;
use crate::store::{Marker, MarkerId};

/// The visual counterpart of a stored marker.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerFeature {
    /// Same id as the marker in the store.
    pub id: MarkerId,
    /// Where the pin points.
    pub pos: GeoPos,
}

impl From<&Marker> for MarkerFeature {
    fn from(marker: &Marker) -> Self {
        Self {
            id: marker.id.clone(),
            pos: marker.pos(),
        }
    }
}

/// Layer that draws marker pins, keyed by marker id.
#[derive(Clone, Debug)]
pub struct MarkerLayer {
    features: HashMap<MarkerId, MarkerFeature>,
    order: Vec<MarkerId>,

    /// Radius of the pin head in pixels.
    pub radius: f32,

    /// Extra pixels around the pin head that still count as a hit.
    pub hit_tolerance: f32,

    /// Fill color of the pin head.
    pub fill: Color32,
}

impl Default for MarkerLayer {
    fn default() -> Self {
        Self::new(8.0, 4.0)
    }
}

impl MarkerLayer {
    /// Creates an empty layer.
    pub fn new(radius: f32, hit_tolerance: f32) -> Self {
        Self {
            features: HashMap::new(),
            order: Vec::new(),
            radius,
            hit_tolerance,
            fill: Color32::from_rgb(37, 99, 235),
        }
    }

    /// Adds a feature, or moves an existing one with the same id.
    pub fn add(&mut self, feature: MarkerFeature) {
        if !self.features.contains_key(&feature.id) {
            self.order.push(feature.id.clone());
        }
        self.features.insert(feature.id.clone(), feature);
    }

    /// Removes a feature. Returns whether it existed.
    pub fn remove(&mut self, id: &MarkerId) -> bool {
        if self.features.remove(id).is_some() {
            self.order.retain(|existing| existing != id);
            true
        } else {
            false
        }
    }

    /// Removes every feature.
    pub fn clear(&mut self) {
        self.features.clear();
        self.order.clear();
    }

    /// Feature ids in the order they were added.
    pub fn ids(&self) -> &[MarkerId] {
        &self.order
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the layer has no features.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn ordered(&self) -> impl DoubleEndedIterator<Item = &MarkerFeature> {
        self.order.iter().filter_map(|id| self.features.get(id))
    }

    /// Screen position of the pin head, which sits above the pointed location.
    fn head(&self, tip: Pos2) -> Pos2 {
        tip - vec2(0.0, self.radius * 1.5)
    }
}

impl Layer for MarkerLayer {
    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        let outline = Stroke::new(1.5, Color32::WHITE);
        for feature in self.ordered() {
            let tip = projection.project(feature.pos);
            let head = self.head(tip);
            painter.line_segment([head, tip], Stroke::new(2.0, self.fill));
            painter.circle(head, self.radius, self.fill, outline);
            painter.circle_filled(head, self.radius * 0.35, Color32::WHITE);
        }
    }

    fn hit_test(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<Feature> {
        let reach = self.radius + self.hit_tolerance;
        self.ordered()
            .rev()
            .find(|feature| {
                let tip = projection.project(feature.pos);
                self.head(tip).distance(screen_pos) <= reach || tip.distance(screen_pos) <= reach
            })
            .map(|feature| Feature::Marker(feature.clone()))
    }
}
