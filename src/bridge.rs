//! The command bridge between a host application and a map surface.
//!
//! The host drives the map with plain values (visibility flags, a clear token and
//! navigation commands) and hears back through listeners. The latest view, click and
//! marker count are also cached for hosts that poll once per frame.

use egui::{Pos2, Rect, Ui, Vec2};
use log::{debug, warn};
use std::rc::Rc;

use crate::config::{MapConfig, MapOptions};
use crate::events::{MapEvent, NavigationCommand, ViewState};
use crate::projection::GeoPos;
use crate::scene::{LayerKind, LayerVisibility};
use crate::seed::MapSeed;
use crate::store::StoreHandle;
use crate::surface::{MapSurface, SurfaceEmission, SurfaceState};
use crate::Result;

type EventListener = Box<dyn FnMut(&MapEvent)>;
type ViewListener = Box<dyn FnMut(&ViewState)>;
type ClickListener = Box<dyn FnMut(Option<GeoPos>)>;
type CountListener = Box<dyn FnMut(usize)>;

#[derive(Default)]
struct Listeners {
    events: Vec<EventListener>,
    views: Vec<ViewListener>,
    clicks: Vec<ClickListener>,
    counts: Vec<CountListener>,
}

/// Owns a [`MapSurface`] and applies host commands to it.
pub struct CommandBridge {
    store: StoreHandle,
    config: Rc<dyn MapConfig>,
    options: MapOptions,
    seed: MapSeed,
    surface: MapSurface,
    clear_trigger: u64,
    last_sequence: Option<u64>,
    pending: Option<NavigationCommand>,
    listeners: Listeners,
    view_state: Option<ViewState>,
    last_click: Option<GeoPos>,
    marker_count: usize,
}

impl CommandBridge {
    /// Creates a bridge and its surface.
    ///
    /// # Arguments
    ///
    /// * `store` - The store shared with the host.
    /// * `config` - The tile provider.
    /// * `options` - Camera and interaction settings.
    /// * `seed` - Zones and heat samples applied when the surface activates.
    pub fn new<C: MapConfig + 'static>(
        store: StoreHandle,
        config: C,
        options: MapOptions,
        seed: MapSeed,
    ) -> Self {
        let config: Rc<dyn MapConfig> = Rc::new(config);
        let surface = MapSurface::new(
            Rc::clone(&store),
            Rc::clone(&config),
            options.clone(),
            seed.clone(),
        );
        let marker_count = store.marker_count();
        Self {
            store,
            config,
            options,
            seed,
            surface,
            clear_trigger: 0,
            last_sequence: None,
            pending: None,
            listeners: Listeners::default(),
            view_state: None,
            last_click: None,
            marker_count,
        }
    }

    /// The store shared with the host.
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// The surface this bridge drives.
    pub fn surface(&self) -> &MapSurface {
        &self.surface
    }

    /// Lifecycle state of the surface.
    pub fn state(&self) -> SurfaceState {
        self.surface.state()
    }

    /// Registers a listener for map events.
    pub fn on_event(&mut self, listener: impl FnMut(&MapEvent) + 'static) {
        self.listeners.events.push(Box::new(listener));
    }

    /// Registers a listener for camera settles.
    pub fn on_view_change(&mut self, listener: impl FnMut(&ViewState) + 'static) {
        self.listeners.views.push(Box::new(listener));
    }

    /// Registers a listener for primary clicks.
    pub fn on_last_click(&mut self, listener: impl FnMut(Option<GeoPos>) + 'static) {
        self.listeners.clicks.push(Box::new(listener));
    }

    /// Registers a listener for marker count changes.
    pub fn on_marker_count(&mut self, listener: impl FnMut(usize) + 'static) {
        self.listeners.counts.push(Box::new(listener));
    }

    /// The last reported view.
    pub fn view_state(&self) -> Option<ViewState> {
        self.view_state
    }

    /// Where the last primary click landed.
    pub fn last_click(&self) -> Option<GeoPos> {
        self.last_click
    }

    /// The last reported marker count.
    pub fn marker_count(&self) -> usize {
        self.marker_count
    }

    /// Activates the surface, then runs a navigation that arrived before activation.
    pub fn activate(&mut self, viewport: Rect) -> Result<()> {
        let result = self.surface.activate(viewport);
        if result.is_ok() {
            if let Some(command) = self.pending.take() {
                debug!("Replaying navigation {} after activation", command.sequence);
                if let Err(e) = self.surface.navigate(&command) {
                    warn!("Navigation {} failed: {e}", command.sequence);
                }
            }
        }
        self.flush();
        result
    }

    /// Disposes the surface. The bridge stays usable through [`CommandBridge::remount`].
    pub fn dispose(&mut self) {
        self.surface.dispose();
        self.flush();
    }

    /// Replaces the surface with a fresh one on the same store and seed. The new
    /// surface rebuilds its markers from the store when it activates.
    pub fn remount(&mut self) {
        let visibility = self.surface.layer_visibility();
        self.surface.dispose();
        self.surface = MapSurface::new(
            Rc::clone(&self.store),
            Rc::clone(&self.config),
            self.options.clone(),
            self.seed.clone(),
        );
        for (kind, visible) in [
            (LayerKind::Zones, visibility.zones),
            (LayerKind::Markers, visibility.markers),
            (LayerKind::Heat, visibility.heat),
        ] {
            self.surface.set_layer_visible(kind, visible);
        }
        debug!("Map surface remounted");
    }

    /// Shows or hides a layer. Returns whether anything changed.
    pub fn set_layer_visible(&mut self, kind: LayerKind, visible: bool) -> bool {
        let changed = self.surface.set_layer_visible(kind, visible);
        self.flush();
        changed
    }

    /// Current layer visibility.
    pub fn layer_visibility(&self) -> LayerVisibility {
        self.surface.layer_visibility()
    }

    /// Takes the host's clear token. Markers are cleared only when the value differs
    /// from the last one seen, which starts at zero.
    pub fn set_clear_trigger(&mut self, trigger: u64) {
        if trigger == self.clear_trigger {
            return;
        }
        self.clear_trigger = trigger;
        debug!("Clear trigger {trigger}");
        if let Err(e) = self.surface.clear_markers() {
            warn!("Clear ignored: {e}");
        }
        self.flush();
    }

    /// Takes a navigation command. A command whose sequence was already applied is
    /// ignored and `Ok(false)` is returned. A rejected command does not consume its
    /// sequence. Commands that arrive before activation are held and run on
    /// activation; only the latest one is kept.
    pub fn navigate(&mut self, command: NavigationCommand) -> Result<bool> {
        let sequence = command.sequence;
        if self.last_sequence == Some(sequence) {
            return Ok(false);
        }
        command.validate()?;

        let result = match self.surface.state() {
            SurfaceState::Uninitialized => {
                debug!("Holding navigation {sequence} until activation");
                self.pending = Some(command);
                Ok(())
            }
            _ => self.surface.navigate(&command),
        };
        self.flush();
        result?;
        self.last_sequence = Some(sequence);
        Ok(true)
    }

    /// Handles a primary click.
    pub fn primary_click(&mut self, pixel: Pos2) {
        self.surface.primary_click(pixel);
        self.flush();
    }

    /// Handles a secondary click.
    pub fn secondary_click(&mut self, pixel: Pos2) {
        self.surface.secondary_click(pixel);
        self.flush();
    }

    /// Pans the view.
    pub fn pan_by(&mut self, delta: Vec2) {
        self.surface.pan_by(delta);
    }

    /// Zooms around a screen position.
    pub fn zoom_at(&mut self, pixel: Pos2, steps: f64) {
        self.surface.zoom_at(pixel, steps);
    }

    /// Ends a user movement.
    pub fn settle(&mut self) {
        self.surface.settle();
        self.flush();
    }

    /// Closes the popup.
    pub fn hide_popup(&mut self) {
        self.surface.hide_popup();
    }

    /// Advances animations and store reconciliation. Returns whether another frame is
    /// needed.
    pub fn advance(&mut self, now: f64) -> bool {
        let animating = self.surface.advance(now);
        self.flush();
        animating
    }

    /// Draws the map.
    pub fn paint(&mut self, ui: &mut Ui, rect: Rect) {
        self.surface.paint(ui, rect);
    }

    /// Delivers queued surface emissions to the cache and the listeners.
    fn flush(&mut self) {
        for emission in self.surface.drain_emissions() {
            match emission {
                SurfaceEmission::Event(event) => {
                    for listener in &mut self.listeners.events {
                        listener(&event);
                    }
                }
                SurfaceEmission::View(view) => {
                    self.view_state = Some(view);
                    for listener in &mut self.listeners.views {
                        listener(&view);
                    }
                }
                SurfaceEmission::LastClick(click) => {
                    self.last_click = click;
                    for listener in &mut self.listeners.clicks {
                        listener(click);
                    }
                }
                SurfaceEmission::MarkerCount(count) => {
                    self.marker_count = count;
                    for listener in &mut self.listeners.counts {
                        listener(count);
                    }
                }
            }
        }
    }
}
