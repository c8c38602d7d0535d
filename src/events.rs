//! Values exchanged between the map and its host: events, view state and
//! navigation commands.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{decode_grid_ref, parse_lat_lon, validate_lat_lon};
use crate::config::MapOptions;
use crate::projection::GeoPos;
use crate::store::{Marker, MarkerId, ZoneId};
use crate::{MapError, Result};

/// Zoom used by navigation commands that do not specify one.
pub const DEFAULT_NAVIGATION_ZOOM: f64 = 15.0;

/// The kind of a feature in the scene graph.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// A point marker.
    Marker,
    /// A risk zone polygon.
    Zone,
    /// A heat sample.
    Heat,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Marker => "marker",
            Self::Zone => "zone",
            Self::Heat => "heat",
        })
    }
}

/// Something that happened on the map. Delivered once to every listener.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum MapEvent {
    /// A marker was created by a click or a navigation command.
    MarkerAdded {
        /// The new marker's id.
        marker_id: MarkerId,
        /// Where it was placed.
        coords: GeoPos,
        /// The full stored record.
        marker: Marker,
    },
    /// A marker was removed by a secondary click.
    MarkerRemoved {
        /// The removed marker's id.
        marker_id: MarkerId,
        /// Where it was.
        coords: GeoPos,
    },
    /// A risk zone was clicked.
    ZoneClicked {
        /// The clicked zone.
        zone_id: ZoneId,
        /// Where the click landed.
        coords: GeoPos,
    },
    /// Any interactive feature was clicked.
    FeatureClicked {
        /// Kind of the clicked feature.
        feature_type: FeatureKind,
        /// Id of the clicked feature.
        feature_id: String,
        /// Where the click landed.
        coords: GeoPos,
    },
}

/// The camera as last reported to the host.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    /// Zoom level, possibly fractional.
    pub zoom: f64,
    /// Latitude of the view center.
    pub center_lat: f64,
    /// Longitude of the view center.
    pub center_lon: f64,
}

/// A host request to fly the camera somewhere and optionally drop a marker there.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationCommand {
    /// Target latitude.
    pub lat: f64,
    /// Target longitude.
    pub lon: f64,
    /// Target zoom. [`MapOptions::navigation_zoom`] when absent.
    #[serde(default)]
    pub zoom: Option<f64>,
    /// Place a marker at the target.
    #[serde(default)]
    pub drop_marker: bool,
    /// Grid reference to store on the dropped marker instead of a computed one.
    #[serde(default)]
    pub grid_ref: Option<String>,
    /// Distinguishes otherwise identical commands. A command is executed once per value.
    pub sequence: u64,
}

impl NavigationCommand {
    /// A command to fly to a coordinate.
    pub fn new(lat: f64, lon: f64, sequence: u64) -> Self {
        Self {
            lat,
            lon,
            zoom: None,
            drop_marker: false,
            grid_ref: None,
            sequence,
        }
    }

    /// Builds a command from user text: either `"<lat>, <lon>"` or a grid reference.
    /// A parsed grid reference is kept as the marker's grid reference.
    pub fn from_query(query: &str, sequence: u64) -> Result<Self> {
        match parse_lat_lon(query) {
            Ok(pos) => Ok(Self::new(pos.lat, pos.lon, sequence)),
            Err(MapError::OutOfRange(reason)) => Err(MapError::OutOfRange(reason)),
            Err(_) => {
                let (lon, lat) = decode_grid_ref(query)?;
                let grid_ref: String = query.chars().filter(|c| !c.is_whitespace()).collect();
                Ok(Self {
                    grid_ref: Some(grid_ref.to_ascii_uppercase()),
                    ..Self::new(lat, lon, sequence)
                })
            }
        }
    }

    /// Sets the zoom.
    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    /// Requests a marker at the target.
    pub fn with_marker(mut self) -> Self {
        self.drop_marker = true;
        self
    }

    /// The target position.
    pub fn target(&self) -> GeoPos {
        GeoPos::from_lat_lon(self.lat, self.lon)
    }

    /// The zoom to fly to, falling back to the configured navigation zoom.
    pub fn target_zoom(&self, options: &MapOptions) -> f64 {
        self.zoom.unwrap_or(options.navigation_zoom)
    }

    /// Checks the target coordinate.
    pub fn validate(&self) -> Result<()> {
        validate_lat_lon(self.lat, self.lon)
    }
}
