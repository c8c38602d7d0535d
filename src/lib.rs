#![warn(missing_docs)]

//! A risk map widget for `egui`.
//!
//! This crate provides a `RiskMap` widget that draws tiles from a tile server with risk
//! zones, a density heat layer and user placed markers on top. Markers live in a
//! [`store::MapStore`] that the host shares with the map; the map keeps its scene in
//! step with the store and reports what happens through a [`bridge::CommandBridge`].
//!
//! Left click places a marker (or opens the popup of the marker or zone under the
//! pointer), right click removes a marker, dragging pans and scrolling zooms.
//!
//! # Example
//!
//! ```no_run
//! use eframe::egui;
//! use egui_risk_map::{RiskMap, config::OpenStreetMapConfig, store::MapStore};
//!
//! struct MyApp {
//!     map: RiskMap,
//! }
//!
//! impl Default for MyApp {
//!     fn default() -> Self {
//!         Self {
//!             map: RiskMap::new(MapStore::new_handle(), OpenStreetMapConfig::default()),
//!         }
//!     }
//! }
//!
//! impl eframe::App for MyApp {
//!     fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
//!         egui::CentralPanel::default()
//!             .frame(egui::Frame::NONE)
//!             .show(ctx, |ui| {
//!                 ui.add(&mut self.map);
//!             });
//!     }
//! }
//! ```

/// The command bridge between the host and the map surface.
pub mod bridge;

/// The map camera.
pub mod camera;

/// Coordinate and grid-reference conversions.
pub mod codec;

/// Configuration traits and types for the map widget.
pub mod config;

/// Events, view state and navigation commands.
pub mod events;

/// Map layers.
pub mod layers;

/// Feature popups.
pub mod popup;

/// Map projection.
pub mod projection;

/// The scene graph.
pub mod scene;

/// Seed data for zones and heat.
pub mod seed;

/// The marker and zone store.
pub mod store;

/// The rendering surface.
pub mod surface;

use eframe::egui;
use egui::{Response, Sense, Ui, Widget};
use log::error;
use thiserror::Error;

use crate::bridge::CommandBridge;
use crate::config::{MapConfig, MapOptions};
use crate::projection::GeoPos;
use crate::seed::MapSeed;
use crate::store::StoreHandle;
use crate::surface::SurfaceState;

pub use crate::events::{FeatureKind, MapEvent, NavigationCommand, ViewState};
pub use crate::scene::LayerKind;

/// The minimum zoom level.
pub const MIN_ZOOM: u8 = 0;
/// The maximum zoom level.
pub const MAX_ZOOM: u8 = 19;

/// Errors that can occur while using the map.
#[derive(Error, Debug)]
pub enum MapError {
    /// A coordinate, precision or score is outside its domain.
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Text could not be parsed.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A marker or zone that was expected to exist does not.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The map surface has not been activated yet.
    #[error("The map surface is not active")]
    SurfaceNotActive,

    /// The map surface has been disposed.
    #[error("The map surface has been disposed")]
    SurfaceDisposed,

    /// An error occurred while making a web request.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// A map tile failed to download.
    #[error("A map tile failed to download. HTTP Status: `{0}`")]
    TileDownloadError(String),

    /// The downloaded tile bytes could not be converted to an image.
    #[error("Unable to convert downloaded map tile bytes as image")]
    TileBytesConversionError(#[from] image::ImageError),
}

/// Result type of this crate.
pub type Result<T> = std::result::Result<T, MapError>;

/// A unique identifier for a map tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileId {
    /// The zoom level.
    pub z: u8,

    /// The x-coordinate of the tile.
    pub x: u32,

    /// The y-coordinate of the tile.
    pub y: u32,
}

/// The map widget.
pub struct RiskMap {
    bridge: CommandBridge,

    /// The geographical position under the mouse pointer, if any.
    pub mouse_pos: Option<GeoPos>,
}

impl RiskMap {
    /// Creates a new `RiskMap` widget without zones or heat.
    ///
    /// # Arguments
    ///
    /// * `store` - The store shared with the host.
    /// * `config` - A type that implements `MapConfig`, which provides the tiles.
    pub fn new<C: MapConfig + 'static>(store: StoreHandle, config: C) -> Self {
        Self::with_seed(store, config, MapOptions::default(), MapSeed::default())
    }

    /// Creates a new `RiskMap` widget with options and seed data.
    pub fn with_seed<C: MapConfig + 'static>(
        store: StoreHandle,
        config: C,
        options: MapOptions,
        seed: MapSeed,
    ) -> Self {
        Self {
            bridge: CommandBridge::new(store, config, options, seed),
            mouse_pos: None,
        }
    }

    /// The command bridge, for reading cached state.
    pub fn bridge(&self) -> &CommandBridge {
        &self.bridge
    }

    /// The command bridge, for issuing commands and registering listeners.
    pub fn bridge_mut(&mut self) -> &mut CommandBridge {
        &mut self.bridge
    }

    /// Handles user input for clicks, panning and zooming.
    fn handle_input(&mut self, ui: &Ui, response: &Response) {
        // Handle panning
        if response.dragged() {
            self.bridge.pan_by(response.drag_delta());
        }
        if response.drag_stopped() {
            self.bridge.settle();
        }

        // Double-click zooms in on the pointer, a single click selects or places.
        if response.double_clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                self.bridge.zoom_at(pointer_pos, 1.0);
                self.bridge.settle();
            }
        } else if response.clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                self.bridge.primary_click(pointer_pos);
            }
        }
        if response.secondary_clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                self.bridge.secondary_click(pointer_pos);
            }
        }

        // Handle zooming and mouse position
        self.mouse_pos = None;
        if response.hovered() {
            if let Some(mouse_pos) = response.hover_pos() {
                self.mouse_pos = self
                    .bridge
                    .surface()
                    .projection()
                    .map(|projection| projection.unproject(mouse_pos));

                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll != 0.0 {
                    self.bridge.zoom_at(mouse_pos, f64::from(scroll.signum()));
                    self.bridge.settle();
                }
            }
        }
    }
}

impl Widget for &mut RiskMap {
    fn ui(self, ui: &mut Ui) -> Response {
        let (rect, response) =
            ui.allocate_exact_size(ui.available_size(), Sense::drag().union(Sense::click()));

        match self.bridge.state() {
            SurfaceState::Uninitialized => {
                if let Err(e) = self.bridge.activate(rect) {
                    // A failed activation is not retried.
                    error!("Unable to activate the map: {e}");
                    self.bridge.dispose();
                }
            }
            SurfaceState::Active => {
                if let Err(e) = self.bridge.activate(rect) {
                    error!("Unable to resize the map: {e}");
                }
            }
            SurfaceState::Disposed => return response,
        }

        self.handle_input(ui, &response);

        let now = ui.input(|i| i.time);
        if self.bridge.advance(now) {
            ui.ctx().request_repaint();
        }
        self.bridge.paint(ui, rect);

        response
    }
}
