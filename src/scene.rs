//! The scene graph: the layers a surface draws and the features the user can click.

use egui::{Painter, Pos2};
use std::rc::Rc;

use crate::config::{MapConfig, MapOptions};
use crate::events::FeatureKind;
use crate::layers::Layer;
use crate::layers::heat::{HeatFeature, HeatLayer};
use crate::layers::marker::{MarkerFeature, MarkerLayer};
use crate::layers::tile::TileLayer;
use crate::layers::zone::{ZoneFeature, ZoneLayer};
use crate::popup::PopupOverlay;
use crate::projection::MapProjection;
use crate::seed::HeatPoint;
use crate::store::MarkerId;

/// A drawable feature of the scene.
#[derive(Clone, Debug, PartialEq)]
pub enum Feature {
    /// A marker pin.
    Marker(MarkerFeature),
    /// A risk zone polygon.
    Zone(ZoneFeature),
    /// A heat sample.
    Heat(HeatFeature),
}

impl Feature {
    /// The kind of the feature.
    pub fn kind(&self) -> FeatureKind {
        match self {
            Self::Marker(_) => FeatureKind::Marker,
            Self::Zone(_) => FeatureKind::Zone,
            Self::Heat(_) => FeatureKind::Heat,
        }
    }

    /// The feature id as reported to the host. Heat samples use their label.
    pub fn id(&self) -> String {
        match self {
            Self::Marker(marker) => marker.id.to_string(),
            Self::Zone(zone) => zone.id.to_string(),
            Self::Heat(heat) => heat.label.clone().unwrap_or_default(),
        }
    }
}

/// The toggleable overlay layers.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum LayerKind {
    /// Risk zones.
    Zones,
    /// Marker pins.
    Markers,
    /// Density heat.
    Heat,
}

/// Which overlay layers are shown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LayerVisibility {
    /// Risk zones.
    pub zones: bool,
    /// Marker pins.
    pub markers: bool,
    /// Density heat.
    pub heat: bool,
}

impl Default for LayerVisibility {
    fn default() -> Self {
        Self {
            zones: true,
            markers: true,
            heat: true,
        }
    }
}

impl LayerVisibility {
    /// Whether a layer is shown.
    pub fn get(&self, kind: LayerKind) -> bool {
        match kind {
            LayerKind::Zones => self.zones,
            LayerKind::Markers => self.markers,
            LayerKind::Heat => self.heat,
        }
    }

    /// Shows or hides a layer. Returns whether anything changed.
    pub fn set(&mut self, kind: LayerKind, visible: bool) -> bool {
        let slot = match kind {
            LayerKind::Zones => &mut self.zones,
            LayerKind::Markers => &mut self.markers,
            LayerKind::Heat => &mut self.heat,
        };
        let changed = *slot != visible;
        *slot = visible;
        changed
    }
}

/// All layers of an active surface, bottom to top: tiles, zones, heat, markers and
/// the popup overlay.
pub struct SceneGraph {
    tiles: TileLayer,
    zones: ZoneLayer,
    heat: HeatLayer,
    markers: MarkerLayer,
    popup: PopupOverlay,
    visibility: LayerVisibility,
}

impl SceneGraph {
    /// Creates a scene with empty overlay layers.
    pub fn new(config: Rc<dyn MapConfig>, options: &MapOptions, visibility: LayerVisibility) -> Self {
        Self {
            tiles: TileLayer::new(config),
            zones: ZoneLayer::new(),
            heat: HeatLayer::default(),
            markers: MarkerLayer::new(options.marker_radius, options.hit_tolerance),
            popup: PopupOverlay::default(),
            visibility,
        }
    }

    /// Shows or hides a layer. Returns whether anything changed.
    pub fn set_visible(&mut self, kind: LayerKind, visible: bool) -> bool {
        self.visibility.set(kind, visible)
    }

    /// Current layer visibility.
    pub fn visibility(&self) -> LayerVisibility {
        self.visibility
    }

    /// Finds the feature under `screen_pos`. Markers lie above zones, hidden layers are
    /// never hit and heat samples are not interactive.
    pub fn hit_test(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<Feature> {
        let markers = self
            .visibility
            .markers
            .then(|| self.markers.hit_test(screen_pos, projection))
            .flatten();
        markers.or_else(|| {
            self.visibility
                .zones
                .then(|| self.zones.hit_test(screen_pos, projection))
                .flatten()
        })
    }

    /// Replaces the zone features.
    pub fn set_zones(&mut self, zones: Vec<ZoneFeature>) {
        self.zones.set_zones(zones);
    }

    /// Replaces the heat samples.
    pub fn set_heat(&mut self, points: &[HeatPoint]) {
        self.heat.set_points(points);
    }

    /// Number of accepted heat samples.
    pub fn heat_len(&self) -> usize {
        self.heat.points().len()
    }

    /// Adds a marker feature.
    pub fn add_marker(&mut self, feature: MarkerFeature) {
        self.markers.add(feature);
    }

    /// Removes a marker feature. Returns whether it existed.
    pub fn remove_marker(&mut self, id: &MarkerId) -> bool {
        self.markers.remove(id)
    }

    /// Removes every marker feature.
    pub fn clear_markers(&mut self) {
        self.markers.clear();
    }

    /// Marker feature ids in the order they were added.
    pub fn marker_ids(&self) -> &[MarkerId] {
        self.markers.ids()
    }

    /// The popup overlay.
    pub fn popup(&self) -> &PopupOverlay {
        &self.popup
    }

    /// The popup overlay, mutably.
    pub fn popup_mut(&mut self) -> &mut PopupOverlay {
        &mut self.popup
    }

    /// Starts loading what the view needs.
    pub fn prepare(&mut self, ctx: &egui::Context, projection: &MapProjection) {
        self.tiles.prepare(ctx, projection);
    }

    /// Draws the visible layers.
    pub fn draw(&self, painter: &Painter, projection: &MapProjection) {
        self.tiles.draw(painter, projection);
        let overlays: [(bool, &dyn Layer); 3] = [
            (self.visibility.zones, &self.zones),
            (self.visibility.heat, &self.heat),
            (self.visibility.markers, &self.markers),
        ];
        for (visible, layer) in overlays {
            if visible {
                layer.draw(painter, projection);
            }
        }
    }
}
