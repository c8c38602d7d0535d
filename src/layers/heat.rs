//! A density heat layer drawn from weighted samples.

use egui::{Color32, Painter};
use log::warn;

use crate::layers::Layer;
use crate::projection::{GeoPos, MapProjection};
use crate::seed::HeatPoint;

/// A heat sample as placed in the scene graph.
#[derive(Clone, Debug, PartialEq)]
pub struct HeatFeature {
    /// Position of the sample.
    pub pos: GeoPos,
    /// Weight in `(0, 1]`.
    pub weight: f64,
    /// Optional label.
    pub label: Option<String>,
}

/// Layer that blends heat samples into soft blobs.
#[derive(Clone, Debug)]
pub struct HeatLayer {
    points: Vec<HeatFeature>,

    /// Radius of a full weight sample in pixels.
    pub radius: f32,
}

impl Default for HeatLayer {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            radius: 28.0,
        }
    }
}

impl HeatLayer {
    /// Replaces the samples. Samples with a bad position or weight are skipped.
    pub fn set_points(&mut self, points: &[HeatPoint]) {
        self.points = points
            .iter()
            .filter_map(|point| match point.validate() {
                Ok(()) => Some(HeatFeature {
                    pos: point.pos(),
                    weight: point.weight,
                    label: point.label.clone(),
                }),
                Err(e) => {
                    warn!("Skipping heat point: {e}");
                    None
                }
            })
            .collect();
    }

    /// The accepted samples.
    pub fn points(&self) -> &[HeatFeature] {
        &self.points
    }
}

/// Color of a sample, from yellow at low weight to red at full weight.
fn heat_color(weight: f64, alpha: u8) -> Color32 {
    let weight = weight.clamp(0.0, 1.0);
    let green = (220.0 * (1.0 - weight)) as u8;
    Color32::from_rgba_unmultiplied(240, green, 30, alpha)
}

impl Layer for HeatLayer {
    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        const RINGS: usize = 4;
        for point in &self.points {
            let center = projection.project(point.pos);
            let radius = self.radius * (0.5 + 0.5 * point.weight as f32);
            // Outer rings first so the core stays the most saturated.
            for ring in (1..=RINGS).rev() {
                let fraction = ring as f32 / RINGS as f32;
                let alpha = (90.0 * point.weight as f32 * (1.0 - fraction) + 20.0) as u8;
                painter.circle_filled(center, radius * fraction, heat_color(point.weight, alpha));
            }
        }
    }
}
