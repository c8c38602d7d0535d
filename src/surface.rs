//! The rendering surface: camera, scene graph and the gesture rules that keep the
//! scene and the store in step.
//!
//! A surface goes through three states. It starts [`SurfaceState::Uninitialized`],
//! becomes [`SurfaceState::Active`] once it knows its viewport, and ends
//! [`SurfaceState::Disposed`]. Only an active surface reacts to gestures.
//!
//! Everything the host should hear about is queued as a [`SurfaceEmission`] and
//! collected with [`MapSurface::drain_emissions`].

use egui::{Color32, Pos2, Rect, Ui, Vec2};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::rc::Rc;

use crate::camera::{Camera, CameraTick};
use crate::config::{MapConfig, MapOptions};
use crate::events::{FeatureKind, MapEvent, NavigationCommand, ViewState};
use crate::layers::marker::MarkerFeature;
use crate::layers::zone::ZoneFeature;
use crate::popup::{Popup, PopupContent};
use crate::projection::{GeoPos, MapProjection};
use crate::scene::{Feature, LayerKind, LayerVisibility, SceneGraph};
use crate::seed::MapSeed;
use crate::store::{MapStore, MarkerId, StoreHandle};
use crate::{MapError, Result};

/// Lifecycle of a [`MapSurface`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SurfaceState {
    /// Created, waiting for a viewport.
    Uninitialized,
    /// Drawing and reacting to gestures.
    Active,
    /// Torn down. Gestures are ignored and commands rejected.
    Disposed,
}

/// Something the surface reports to its host.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceEmission {
    /// A map event.
    Event(MapEvent),
    /// The camera settled.
    View(ViewState),
    /// Where the last primary click landed.
    LastClick(Option<GeoPos>),
    /// The number of markers changed, or is reported for the first time.
    MarkerCount(usize),
}

/// The parts of a surface that only exist while it is active.
struct ActiveSurface {
    camera: Camera,
    scene: SceneGraph,
    viewport: Rect,
    synced_revision: u64,
    marker_count: usize,
}

impl ActiveSurface {
    fn projection(&self) -> MapProjection {
        self.camera.projection(self.viewport)
    }

    /// Brings the scene up to date with mutations made to the store by someone else.
    fn reconcile(&mut self, store: &MapStore, outbox: &mut Vec<SurfaceEmission>) {
        let revision = store.revision();
        if revision == self.synced_revision {
            return;
        }

        let markers = store.list_markers();
        let live: HashSet<&MarkerId> = markers.iter().map(|m| &m.id).collect();
        let stale: Vec<MarkerId> = self
            .scene
            .marker_ids()
            .iter()
            .filter(|id| !live.contains(id))
            .cloned()
            .collect();
        for id in &stale {
            self.scene.remove_marker(id);
            self.scene
                .popup_mut()
                .hide_for(FeatureKind::Marker, id.as_str());
        }
        let known: HashSet<MarkerId> = self.scene.marker_ids().iter().cloned().collect();
        let mut added = 0;
        for marker in markers.iter().filter(|m| !known.contains(&m.id)) {
            self.scene.add_marker(MarkerFeature::from(marker));
            added += 1;
        }

        self.scene
            .set_zones(store.list_zones().iter().map(ZoneFeature::from).collect());

        if !stale.is_empty() || added > 0 {
            debug!(
                "Reconciled store revision {revision}: {added} added, {} removed",
                stale.len()
            );
        }
        self.synced_revision = revision;
        self.report_marker_count(markers.len(), outbox);
    }

    fn report_marker_count(&mut self, count: usize, outbox: &mut Vec<SurfaceEmission>) {
        if count != self.marker_count {
            self.marker_count = count;
            outbox.push(SurfaceEmission::MarkerCount(count));
        }
    }
}

/// An interactive map surface bound to a store.
pub struct MapSurface {
    store: StoreHandle,
    config: Rc<dyn MapConfig>,
    options: MapOptions,
    seed: MapSeed,
    visibility: LayerVisibility,
    state: SurfaceState,
    active: Option<ActiveSurface>,
    outbox: Vec<SurfaceEmission>,
}

impl MapSurface {
    /// Creates an uninitialized surface. The seed is applied on activation.
    pub fn new(
        store: StoreHandle,
        config: Rc<dyn MapConfig>,
        options: MapOptions,
        seed: MapSeed,
    ) -> Self {
        Self {
            store,
            config,
            options,
            seed,
            visibility: LayerVisibility::default(),
            state: SurfaceState::Uninitialized,
            active: None,
            outbox: Vec::new(),
        }
    }

    /// The lifecycle state.
    pub fn state(&self) -> SurfaceState {
        self.state
    }

    /// Whether the surface is active.
    pub fn is_active(&self) -> bool {
        self.state == SurfaceState::Active
    }

    /// The store this surface mirrors.
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Activates the surface for `viewport`.
    ///
    /// On first activation the zones are seeded into the store, the heat samples into
    /// the heat layer and a marker feature is built for every stored marker. Later
    /// calls only resize the viewport.
    pub fn activate(&mut self, viewport: Rect) -> Result<()> {
        match self.state {
            SurfaceState::Disposed => return Err(MapError::SurfaceDisposed),
            SurfaceState::Active => {
                if let Some(active) = self.active.as_mut() {
                    active.viewport = viewport;
                }
                return Ok(());
            }
            SurfaceState::Uninitialized => {}
        }

        if !self.seed.zones.is_empty() {
            self.store.seed_zones(self.seed.zones.clone())?;
        }

        let camera = Camera::new(
            self.config.default_center(),
            self.config.default_zoom(),
            self.options.min_zoom,
            self.options.max_zoom,
        );
        let mut scene = SceneGraph::new(Rc::clone(&self.config), &self.options, self.visibility);
        scene.set_heat(&self.seed.heat);
        scene.set_zones(self.store.list_zones().iter().map(ZoneFeature::from).collect());
        let markers = self.store.list_markers();
        for marker in &markers {
            scene.add_marker(MarkerFeature::from(marker));
        }

        info!(
            "Map surface active with {} zones, {} heat points and {} markers",
            self.store.list_zones().len(),
            scene.heat_len(),
            markers.len()
        );

        self.outbox.push(SurfaceEmission::View(camera.view_state()));
        self.outbox.push(SurfaceEmission::MarkerCount(markers.len()));
        self.active = Some(ActiveSurface {
            camera,
            scene,
            viewport,
            synced_revision: self.store.revision(),
            marker_count: markers.len(),
        });
        self.state = SurfaceState::Active;
        Ok(())
    }

    /// Tears the surface down. Stops any flight and drops the scene. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.camera.cancel_flight();
            debug!("Map surface disposed");
        }
        self.state = SurfaceState::Disposed;
    }

    /// The projection of the current view, while active.
    pub fn projection(&self) -> Option<MapProjection> {
        self.active.as_ref().map(ActiveSurface::projection)
    }

    /// The camera as it would be reported to the host, while active.
    pub fn view_state(&self) -> Option<ViewState> {
        self.active.as_ref().map(|active| active.camera.view_state())
    }

    /// Whether a fly-to animation is running.
    pub fn is_flying(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.camera.is_flying())
    }

    /// Handles a primary click at a screen position.
    pub fn primary_click(&mut self, pixel: Pos2) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.reconcile(&self.store, &mut self.outbox);

        let coords = active.projection().unproject(pixel);
        self.outbox.push(SurfaceEmission::LastClick(Some(coords)));

        match active.scene.hit_test(pixel, &active.projection()) {
            Some(Feature::Marker(feature)) => {
                let Some(marker) = self.store.get_marker(&feature.id) else {
                    return;
                };
                active.scene.popup_mut().show(Popup {
                    anchor: coords,
                    feature_kind: FeatureKind::Marker,
                    feature_id: marker.id.to_string(),
                    content: PopupContent::from(&marker),
                });
                self.outbox.push(SurfaceEmission::Event(MapEvent::FeatureClicked {
                    feature_type: FeatureKind::Marker,
                    feature_id: marker.id.to_string(),
                    coords,
                }));
            }
            Some(Feature::Zone(feature)) => {
                let Some(zone) = self.store.get_zone(&feature.id) else {
                    return;
                };
                active.scene.popup_mut().show(Popup {
                    anchor: coords,
                    feature_kind: FeatureKind::Zone,
                    feature_id: zone.id.to_string(),
                    content: PopupContent::from(&zone),
                });
                self.outbox.push(SurfaceEmission::Event(MapEvent::ZoneClicked {
                    zone_id: zone.id.clone(),
                    coords,
                }));
                self.outbox.push(SurfaceEmission::Event(MapEvent::FeatureClicked {
                    feature_type: FeatureKind::Zone,
                    feature_id: zone.id.to_string(),
                    coords,
                }));
            }
            Some(Feature::Heat(_)) | None => {
                active.scene.popup_mut().hide();
                if !active.scene.visibility().markers {
                    return;
                }
                match self.store.add_marker(coords.lat, coords.lon, None) {
                    Ok(id) => {
                        let Some(marker) = self.store.get_marker(&id) else {
                            return;
                        };
                        active.scene.add_marker(MarkerFeature::from(&marker));
                        active.synced_revision = self.store.revision();
                        self.outbox.push(SurfaceEmission::Event(MapEvent::MarkerAdded {
                            marker_id: id,
                            coords,
                            marker,
                        }));
                        let count = self.store.marker_count();
                        active.report_marker_count(count, &mut self.outbox);
                    }
                    Err(e) => warn!("No marker created at ({}, {}): {e}", coords.lat, coords.lon),
                }
            }
        }
    }

    /// Handles a secondary click at a screen position. Removes the marker under it.
    pub fn secondary_click(&mut self, pixel: Pos2) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if !active.scene.visibility().markers {
            return;
        }
        active.reconcile(&self.store, &mut self.outbox);

        let Some(Feature::Marker(feature)) = active.scene.hit_test(pixel, &active.projection())
        else {
            return;
        };
        let Some(marker) = self.store.remove_marker(&feature.id) else {
            return;
        };
        active.scene.remove_marker(&marker.id);
        active.scene.popup_mut().hide();
        active.synced_revision = self.store.revision();
        self.outbox.push(SurfaceEmission::Event(MapEvent::MarkerRemoved {
            coords: marker.pos(),
            marker_id: marker.id,
        }));
        let count = self.store.marker_count();
        active.report_marker_count(count, &mut self.outbox);
    }

    /// Pans the view by a screen delta. Cancels any flight.
    pub fn pan_by(&mut self, delta: Vec2) {
        if let Some(active) = self.active.as_mut() {
            active.camera.pan_by(delta, active.viewport);
        }
    }

    /// Zooms by `steps` around a screen position. Cancels any flight.
    pub fn zoom_at(&mut self, pixel: Pos2, steps: f64) {
        if let Some(active) = self.active.as_mut() {
            active.camera.zoom_at(pixel, steps, active.viewport);
        }
    }

    /// Ends a user movement. Reports the view once if the camera moved since the last
    /// settle.
    pub fn settle(&mut self) {
        if let Some(view) = self.active.as_mut().and_then(|active| active.camera.settle()) {
            self.outbox.push(SurfaceEmission::View(view));
        }
    }

    /// Shows or hides a layer. Returns whether anything changed.
    ///
    /// Hiding the marker layer keeps the markers in the store but stops clicks from
    /// creating or removing them.
    pub fn set_layer_visible(&mut self, kind: LayerKind, visible: bool) -> bool {
        let changed = self.visibility.set(kind, visible);
        if changed {
            debug!("Layer {kind:?} visible: {visible}");
        }

        let Some(active) = self.active.as_mut() else {
            return changed;
        };
        active.scene.set_visible(kind, visible);
        if changed && !visible {
            let popup_kind = match kind {
                LayerKind::Zones => Some(FeatureKind::Zone),
                LayerKind::Markers => Some(FeatureKind::Marker),
                LayerKind::Heat => None,
            };
            let shows_hidden = active
                .scene
                .popup()
                .current()
                .is_some_and(|popup| Some(popup.feature_kind) == popup_kind);
            if shows_hidden {
                active.scene.popup_mut().hide();
            }
        }
        changed
    }

    /// Current layer visibility.
    pub fn layer_visibility(&self) -> LayerVisibility {
        self.visibility
    }

    /// Removes every marker from the store and the scene together.
    pub fn clear_markers(&mut self) -> Result<()> {
        if self.state == SurfaceState::Disposed {
            return Err(MapError::SurfaceDisposed);
        }
        self.store.clear_markers();
        match self.active.as_mut() {
            Some(active) => {
                active.scene.clear_markers();
                active.scene.popup_mut().hide();
                active.synced_revision = self.store.revision();
                active.report_marker_count(0, &mut self.outbox);
            }
            None => self.outbox.push(SurfaceEmission::MarkerCount(0)),
        }
        Ok(())
    }

    /// Flies the camera to the command's target and drops a marker there if asked and
    /// the marker layer is visible.
    ///
    /// A running flight is retargeted from where the camera is now. The camera flies
    /// even when the marker cannot be created, as for targets outside the grid band.
    pub fn navigate(&mut self, command: &NavigationCommand) -> Result<()> {
        let active = match self.state {
            SurfaceState::Disposed => return Err(MapError::SurfaceDisposed),
            SurfaceState::Uninitialized => return Err(MapError::SurfaceNotActive),
            SurfaceState::Active => self.active.as_mut().ok_or(MapError::SurfaceNotActive)?,
        };
        command.validate()?;

        if command.drop_marker && active.scene.visibility().markers {
            match self
                .store
                .add_marker(command.lat, command.lon, command.grid_ref.clone())
                .and_then(|id| self.store.require_marker(&id))
            {
                Ok(marker) => {
                    active.scene.add_marker(MarkerFeature::from(&marker));
                    active.synced_revision = self.store.revision();
                    self.outbox.push(SurfaceEmission::Event(MapEvent::MarkerAdded {
                        marker_id: marker.id.clone(),
                        coords: command.target(),
                        marker,
                    }));
                    let count = self.store.marker_count();
                    active.report_marker_count(count, &mut self.outbox);
                }
                Err(e) => warn!(
                    "No marker dropped for navigation {}: {e}",
                    command.sequence
                ),
            }
        }

        let zoom = command.target_zoom(&self.options);
        debug!(
            "Navigating to ({}, {}) at zoom {zoom}, sequence {}",
            command.lat, command.lon, command.sequence
        );
        active
            .camera
            .fly_to(command.target(), zoom, self.options.flight_duration);
        Ok(())
    }

    /// Advances animations to `now` (seconds on the frame clock) and picks up store
    /// changes made by the host. Returns whether another frame is needed.
    pub fn advance(&mut self, now: f64) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        active.reconcile(&self.store, &mut self.outbox);
        match active.camera.advance(now) {
            CameraTick::Idle => false,
            CameraTick::Moving => true,
            CameraTick::Settled(view) => {
                self.outbox.push(SurfaceEmission::View(view));
                true
            }
        }
    }

    /// The open popup, if any.
    pub fn popup(&self) -> Option<&Popup> {
        self.active
            .as_ref()
            .and_then(|active| active.scene.popup().current())
    }

    /// Closes the popup.
    pub fn hide_popup(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.scene.popup_mut().hide();
        }
    }

    /// Ids of the marker features in the scene, in the order they were added.
    pub fn marker_feature_ids(&self) -> Vec<MarkerId> {
        self.active
            .as_ref()
            .map(|active| active.scene.marker_ids().to_vec())
            .unwrap_or_default()
    }

    /// Takes everything emitted since the last call.
    pub fn drain_emissions(&mut self) -> Vec<SurfaceEmission> {
        std::mem::take(&mut self.outbox)
    }

    /// Draws the map into `rect`, resizing the viewport if needed.
    pub fn paint(&mut self, ui: &mut Ui, rect: Rect) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.viewport = rect;
        let projection = active.projection();

        active.scene.prepare(ui.ctx(), &projection);
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, Color32::from_rgb(220, 220, 220)); // Background
        active.scene.draw(&painter, &projection);
        active.scene.popup_mut().show_ui(ui, &projection, rect);

        draw_attribution(self.config.as_ref(), ui, rect);
    }
}

impl Drop for MapSurface {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Draws the attribution text.
fn draw_attribution(config: &dyn MapConfig, ui: &Ui, rect: Rect) {
    let Some(attribution) = config.attribution() else {
        return;
    };
    let bg_color = if ui.visuals().dark_mode {
        Color32::from_black_alpha(150)
    } else {
        Color32::from_white_alpha(150)
    };

    let frame = egui::Frame::NONE
        .inner_margin(egui::Margin::same(5))
        .fill(bg_color)
        .corner_radius(3.0);

    egui::Area::new(ui.id().with("attribution"))
        .fixed_pos(rect.left_bottom())
        .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(5.0, -5.0))
        .show(ui.ctx(), |ui| {
            frame.show(ui, |ui| {
                ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend); // Don't wrap attribution text.

                if let Some(url) = config.attribution_url() {
                    ui.hyperlink_to(attribution, url);
                } else {
                    ui.label(attribution);
                }
            });
        });
}
