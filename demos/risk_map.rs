#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release
#![allow(rustdoc::missing_crate_level_docs)] // it's an example

use eframe::egui;
use egui_risk_map::{
    LayerKind, MapEvent, NavigationCommand, RiskMap,
    codec::format_lat_lon,
    config::{MapOptions, OpenStreetMapConfig},
    projection::GeoPos,
    seed::{HeatPoint, MapSeed, ZoneSeed},
    store::{MapStore, StoreHandle},
};
use std::cell::RefCell;
use std::rc::Rc;

fn main() -> eframe::Result {
    env_logger::init();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1024.0, 720.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Risk map",
        options,
        Box::new(|_cc| Ok(Box::<MyApp>::default())),
    )
}

fn square(name: &str, lat: f64, lon: f64, size: f64, risk_score: u8, reason: &str) -> ZoneSeed {
    ZoneSeed {
        id: None,
        name: name.to_string(),
        ring: vec![
            GeoPos::from_lat_lon(lat - size, lon - size),
            GeoPos::from_lat_lon(lat - size, lon + size),
            GeoPos::from_lat_lon(lat + size, lon + size),
            GeoPos::from_lat_lon(lat + size, lon - size),
        ],
        risk_score,
        reason: Some(reason.to_string()),
        owner: Some("Operations".to_string()),
    }
}

fn demo_seed() -> MapSeed {
    MapSeed {
        zones: vec![
            square("Downtown", 33.755, -84.39, 0.01, 82, "Crowd density"),
            square("Rail yard", 33.77, -84.42, 0.008, 55, "Hazardous cargo"),
            square("Park", 33.785, -84.37, 0.012, 15, "Low lighting"),
        ],
        heat: vec![
            HeatPoint::new(-84.388, 33.749, 1.0),
            HeatPoint::new(-84.395, 33.752, 0.6),
            HeatPoint::new(-84.40, 33.76, 0.3),
            HeatPoint::new(-84.375, 33.78, 0.8),
        ],
    }
}

struct MyApp {
    map: RiskMap,
    store: StoreHandle,
    events: Rc<RefCell<Vec<String>>>,
    query: String,
    query_error: Option<String>,
    drop_marker: bool,
    sequence: u64,
    clear_trigger: u64,
}

impl Default for MyApp {
    fn default() -> Self {
        let store = MapStore::new_handle();
        let mut map = RiskMap::with_seed(
            Rc::clone(&store),
            OpenStreetMapConfig::default(),
            MapOptions::default(),
            demo_seed(),
        );

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        map.bridge_mut().on_event(move |event| {
            let line = match event {
                MapEvent::MarkerAdded { marker, .. } => {
                    format!("Added {} at {}", marker.id, marker.grid_ref)
                }
                MapEvent::MarkerRemoved { marker_id, .. } => format!("Removed {marker_id}"),
                MapEvent::ZoneClicked { zone_id, .. } => format!("Zone {zone_id}"),
                MapEvent::FeatureClicked {
                    feature_type,
                    feature_id,
                    coords,
                } => format!("Clicked {feature_type} {feature_id} at {}", format_lat_lon(*coords)),
            };
            sink.borrow_mut().push(line);
        });

        Self {
            map,
            store,
            events,
            query: String::new(),
            query_error: None,
            drop_marker: true,
            sequence: 0,
            clear_trigger: 0,
        }
    }
}

impl MyApp {
    fn navigate(&mut self) {
        self.sequence += 1;
        let result = NavigationCommand::from_query(&self.query, self.sequence).and_then(|command| {
            let command = if self.drop_marker {
                command.with_marker()
            } else {
                command
            };
            self.map.bridge_mut().navigate(command)
        });
        self.query_error = result.err().map(|e| e.to_string());
    }
}

impl eframe::App for MyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                ui.add(&mut self.map);
            });

        egui::Window::new("Risk map")
            .resizable(false)
            .default_width(300.0)
            .show(ctx, |ui| {
                ui.label("Layers");
                let visibility = self.map.bridge().layer_visibility();
                ui.horizontal(|ui| {
                    for (kind, label) in [
                        (LayerKind::Zones, "Zones"),
                        (LayerKind::Markers, "Markers"),
                        (LayerKind::Heat, "Heat"),
                    ] {
                        let mut visible = visibility.get(kind);
                        if ui.checkbox(&mut visible, label).changed() {
                            self.map.bridge_mut().set_layer_visible(kind, visible);
                        }
                    }
                });

                ui.separator();
                ui.label("Go to (lat, lon or grid reference)");
                ui.horizontal(|ui| {
                    let response = ui.text_edit_singleline(&mut self.query);
                    let submitted =
                        response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    if ui.button("Go").clicked() || submitted {
                        self.navigate();
                    }
                });
                ui.checkbox(&mut self.drop_marker, "Drop a marker");
                if let Some(error) = &self.query_error {
                    ui.colored_label(egui::Color32::RED, error);
                }

                ui.separator();
                ui.horizontal(|ui| {
                    ui.label(format!("Markers: {}", self.map.bridge().marker_count()));
                    if ui.button("Clear").clicked() {
                        self.clear_trigger += 1;
                        self.map.bridge_mut().set_clear_trigger(self.clear_trigger);
                    }
                    if ui.button("Remount").clicked() {
                        self.map.bridge_mut().remount();
                    }
                });
                for marker in self.store.list_markers().iter().rev().take(5) {
                    ui.small(format!("{}  {}", marker.id, marker.grid_ref));
                }

                ui.separator();
                if let Some(view) = self.map.bridge().view_state() {
                    ui.label(format!(
                        "View: {} @ {:.1}",
                        format_lat_lon(GeoPos::from_lat_lon(view.center_lat, view.center_lon)),
                        view.zoom
                    ));
                }
                if let Some(pos) = self.map.mouse_pos {
                    ui.label(format!("Pointer: {}", format_lat_lon(pos)));
                }

                ui.separator();
                ui.label("Events");
                for line in self.events.borrow().iter().rev().take(8) {
                    ui.small(line);
                }
            });
    }
}
