use egui::{Pos2, Rect, pos2, vec2};
use egui_risk_map::{
    LayerKind, MapEvent, NavigationCommand,
    bridge::CommandBridge,
    codec::{decode_grid_ref, encode_grid_ref, to_geographic, to_projected},
    config::{MapOptions, UrlTemplateConfig},
    projection::GeoPos,
    seed::{MapSeed, ZoneSeed},
    store::{MapStore, StoreHandle},
};
use std::cell::RefCell;
use std::rc::Rc;

const ATLANTA: (f64, f64) = (33.75, -84.39);

fn viewport() -> Rect {
    Rect::from_min_size(pos2(0.0, 0.0), vec2(800.0, 600.0))
}

fn risk_zone() -> ZoneSeed {
    let (lat, lon, d) = (33.80, -84.34, 0.01);
    ZoneSeed {
        id: None,
        name: "Substation".to_string(),
        ring: vec![
            GeoPos::from_lat_lon(lat - d, lon - d),
            GeoPos::from_lat_lon(lat - d, lon + d),
            GeoPos::from_lat_lon(lat + d, lon + d),
            GeoPos::from_lat_lon(lat + d, lon - d),
            GeoPos::from_lat_lon(lat - d, lon - d),
        ],
        risk_score: 82,
        reason: Some("Arc flash".to_string()),
        owner: None,
    }
}

struct Harness {
    store: StoreHandle,
    bridge: CommandBridge,
    events: Rc<RefCell<Vec<MapEvent>>>,
}

impl Harness {
    fn new() -> Self {
        let store = MapStore::new_handle();
        let config = UrlTemplateConfig::new("http://tiles.invalid/{z}/{x}/{y}.png")
            .with_default_view(GeoPos::from_lat_lon(ATLANTA.0, ATLANTA.1), 12.0);
        let seed = MapSeed {
            zones: vec![risk_zone()],
            heat: Vec::new(),
        };
        let mut bridge = CommandBridge::new(Rc::clone(&store), config, MapOptions::default(), seed);

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        bridge.on_event(move |event| sink.borrow_mut().push(event.clone()));
        bridge.activate(viewport()).unwrap();

        Self {
            store,
            bridge,
            events,
        }
    }

    fn pixel(&self, lat: f64, lon: f64) -> Pos2 {
        self.bridge
            .surface()
            .projection()
            .unwrap()
            .project(GeoPos::from_lat_lon(lat, lon))
    }
}

#[test]
fn projection_round_trip_over_the_whole_domain() {
    for lat in (-90..=90).step_by(5) {
        for lon in (-180..=180).step_by(15) {
            let (lat, lon) = (f64::from(lat), f64::from(lon));
            let (x, y) = to_projected(lon, lat).unwrap();
            let (back_lon, back_lat) = to_geographic(x, y);
            assert!((back_lon - lon).abs() < 1e-9, "{lat}, {lon}");
            assert!((back_lat - lat).abs() < 1e-9, "{lat}, {lon}");
        }
    }
}

#[test]
fn grid_round_trip_within_a_metre() {
    let metres_per_degree = 111_320.0;
    for lat in (-79..=79).step_by(6) {
        for lon in (-177..=177).step_by(11) {
            let (lat, lon) = (f64::from(lat) + 0.123, f64::from(lon) + 0.456);
            let grid_ref = encode_grid_ref(lon, lat, 5).unwrap();
            let (back_lon, back_lat) = decode_grid_ref(&grid_ref).unwrap();
            let dy = (back_lat - lat) * metres_per_degree;
            let dx = (back_lon - lon) * metres_per_degree * lat.to_radians().cos();
            assert!(dx.hypot(dy) < 1.0, "{grid_ref}: {lat}, {lon}");
        }
    }
}

#[test]
fn clicks_create_and_remove_markers() {
    let mut h = Harness::new();
    let pixel = h.pixel(ATLANTA.0, ATLANTA.1);

    h.bridge.primary_click(pixel);
    let markers = h.store.list_markers();
    assert_eq!(markers.len(), 1);
    assert_eq!(h.bridge.marker_count(), 1);
    // The added marker is readable as soon as the event arrives.
    assert!(matches!(
        &h.events.borrow()[0],
        MapEvent::MarkerAdded { marker, .. } if h.store.get_marker(&marker.id).as_ref() == Some(marker)
    ));

    h.bridge.secondary_click(pixel);
    assert!(h.store.list_markers().is_empty());
    assert_eq!(h.bridge.marker_count(), 0);
    assert!(matches!(
        h.events.borrow().last(),
        Some(MapEvent::MarkerRemoved { marker_id, .. }) if *marker_id == markers[0].id
    ));
}

#[test]
fn secondary_click_on_empty_pixel_changes_nothing() {
    let mut h = Harness::new();
    h.bridge.primary_click(h.pixel(ATLANTA.0, ATLANTA.1));
    let before = h.store.list_markers();
    let events = h.events.borrow().len();

    h.bridge.secondary_click(pos2(10.0, 590.0));
    assert_eq!(h.store.list_markers(), before);
    assert_eq!(h.events.borrow().len(), events);
}

#[test]
fn zone_click_reports_zone_only() {
    let mut h = Harness::new();
    h.bridge.primary_click(h.pixel(33.80, -84.34));

    let events = h.events.borrow();
    assert!(matches!(events[0], MapEvent::ZoneClicked { .. }));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, MapEvent::MarkerAdded { .. }))
    );
    assert_eq!(h.store.marker_count(), 0);
    let popup = h.bridge.surface().popup().unwrap();
    assert_eq!(popup.content.lines()[1], "Risk: 82/100");
}

#[test]
fn hidden_marker_layer_protects_markers() {
    let mut h = Harness::new();
    h.store.add_marker(ATLANTA.0, ATLANTA.1, None).unwrap();
    h.bridge.advance(0.0);
    h.bridge.set_layer_visible(LayerKind::Markers, false);

    h.bridge.secondary_click(h.pixel(ATLANTA.0, ATLANTA.1));
    assert_eq!(h.store.marker_count(), 1);

    h.bridge.set_layer_visible(LayerKind::Markers, true);
    h.bridge.secondary_click(h.pixel(ATLANTA.0, ATLANTA.1));
    assert_eq!(h.store.marker_count(), 0);
}

#[test]
fn clear_leaves_nothing_behind() {
    let mut h = Harness::new();
    h.bridge.primary_click(h.pixel(ATLANTA.0, ATLANTA.1));
    h.store.add_marker(33.70, -84.45, None).unwrap();

    h.bridge.set_clear_trigger(1);
    assert!(h.store.list_markers().is_empty());
    assert!(h.bridge.surface().marker_feature_ids().is_empty());
    assert_eq!(h.bridge.marker_count(), 0);
}

#[test]
fn repeated_navigation_needs_a_new_sequence() {
    let mut h = Harness::new();
    let command = NavigationCommand::new(33.76, -84.40, 10).with_marker();

    assert!(h.bridge.navigate(command.clone()).unwrap());
    assert!(!h.bridge.navigate(command.clone()).unwrap());
    assert_eq!(h.store.marker_count(), 1);

    assert!(
        h.bridge
            .navigate(NavigationCommand {
                sequence: 11,
                ..command
            })
            .unwrap()
    );
    let markers = h.store.list_markers();
    assert_eq!(markers.len(), 2);
    assert_ne!(markers[0].id, markers[1].id);

    // The flight ends at the target and reports the view once.
    assert!(h.bridge.advance(100.0));
    assert!(h.bridge.advance(101.0));
    let view = h.bridge.view_state().unwrap();
    assert!((view.center_lat - 33.76).abs() < 1e-6);
    assert_eq!(view.zoom, 15.0);
    assert!(!h.bridge.advance(102.0));
}

#[test]
fn remount_keeps_store_markers() {
    let mut h = Harness::new();
    h.bridge.primary_click(h.pixel(ATLANTA.0, ATLANTA.1));
    h.bridge.remount();
    h.store.add_marker(33.70, -84.45, None).unwrap();

    h.bridge.activate(viewport()).unwrap();
    let ids: Vec<_> = h.store.list_markers().into_iter().map(|m| m.id).collect();
    assert_eq!(h.bridge.surface().marker_feature_ids(), ids);
    assert_eq!(h.store.list_zones().len(), 1);
}

#[cfg(feature = "geojson")]
#[test]
fn geojson_seed_drives_zones() {
    let text = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"name": "Yard", "riskScore": 82},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[-84.35, 33.79], [-84.33, 33.79], [-84.33, 33.81], [-84.35, 33.81], [-84.35, 33.79]]]
            }
        }]
    }"#;
    let seed = MapSeed::from_geojson_str(text).unwrap();
    let store = MapStore::new_handle();
    let config = UrlTemplateConfig::new("http://tiles.invalid/{z}/{x}/{y}.png")
        .with_default_view(GeoPos::from_lat_lon(ATLANTA.0, ATLANTA.1), 12.0);
    let mut bridge = CommandBridge::new(Rc::clone(&store), config, MapOptions::default(), seed);
    bridge.activate(viewport()).unwrap();

    let pixel = bridge
        .surface()
        .projection()
        .unwrap()
        .project(GeoPos::from_lat_lon(33.80, -84.34));
    bridge.primary_click(pixel);
    assert_eq!(store.marker_count(), 0);
    assert_eq!(store.list_zones()[0].name, "Yard");
}

#[test]
fn navigation_past_the_grid_band_flies_without_a_marker() {
    let mut h = Harness::new();
    let command = NavigationCommand::new(82.0, 10.0, 1).with_marker();

    assert!(h.bridge.navigate(command).unwrap());
    assert!(h.bridge.surface().is_flying());
    assert_eq!(h.store.marker_count(), 0);
    assert!(h.events.borrow().is_empty());
}
