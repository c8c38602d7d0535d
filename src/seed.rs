//! Seed data applied once when the map surface becomes active: risk zones and heat
//! samples.

use serde::{Deserialize, Serialize};

use crate::codec::validate_lat_lon;
use crate::projection::GeoPos;
use crate::{MapError, Result};

/// A risk zone as supplied by the host, before the store validates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSeed {
    /// Identifier for the zone. Generated from the seed position when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Polygon ring. It is closed automatically if the last point differs from the first.
    pub ring: Vec<GeoPos>,
    /// Risk score between 0 and 100.
    pub risk_score: u8,
    /// Why the zone is risky.
    #[serde(default)]
    pub reason: Option<String>,
    /// Who is responsible for the zone.
    #[serde(default)]
    pub owner: Option<String>,
}

/// A weighted sample for the density heat layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeatPoint {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Weight in `(0, 1]`.
    pub weight: f64,
    /// Optional label.
    #[serde(default)]
    pub label: Option<String>,
}

impl HeatPoint {
    /// Creates a heat sample without a label.
    pub fn new(lon: f64, lat: f64, weight: f64) -> Self {
        Self {
            lon,
            lat,
            weight,
            label: None,
        }
    }

    /// The position of the sample.
    pub fn pos(&self) -> GeoPos {
        GeoPos {
            lon: self.lon,
            lat: self.lat,
        }
    }

    /// Checks the coordinate and the weight.
    pub fn validate(&self) -> Result<()> {
        validate_lat_lon(self.lat, self.lon)?;
        if !(self.weight > 0.0 && self.weight <= 1.0) {
            return Err(MapError::OutOfRange(format!(
                "heat weight {} is outside (0, 1]",
                self.weight
            )));
        }
        Ok(())
    }
}

/// Everything the host seeds into a map at construction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MapSeed {
    /// Risk zones.
    #[serde(default)]
    pub zones: Vec<ZoneSeed>,
    /// Heat samples.
    #[serde(default)]
    pub heat: Vec<HeatPoint>,
}

#[cfg(feature = "geojson")]
impl MapSeed {
    /// Reads a GeoJSON `FeatureCollection`.
    ///
    /// Polygon features become zones (`name`, `riskScore`, `reason` and `owner`
    /// properties), point features become heat samples (`weight` and `label`
    /// properties). Other geometries are skipped.
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        use geojson::{GeoJson, Value, feature::Id};

        let geojson: GeoJson = text
            .parse()
            .map_err(|e: geojson::Error| MapError::MalformedInput(e.to_string()))?;
        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(MapError::MalformedInput(
                "expected a GeoJSON FeatureCollection".to_string(),
            ));
        };

        let mut seed = MapSeed::default();
        for feature in collection.features {
            let properties = feature.properties.clone().unwrap_or_default();
            let text_property = |key: &str| {
                properties
                    .get(key)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            };

            let Some(geometry) = feature.geometry else {
                continue;
            };
            match geometry.value {
                Value::Polygon(mut rings) => {
                    if rings.is_empty() {
                        continue;
                    }
                    // Holes are not rendered, only the exterior ring is kept.
                    let exterior = rings.swap_remove(0);
                    let risk_score = properties
                        .get("riskScore")
                        .or_else(|| properties.get("risk_score"))
                        .and_then(|v| v.as_u64())
                        .ok_or_else(|| {
                            MapError::MalformedInput("zone feature without riskScore".to_string())
                        })?;
                    let id = match &feature.id {
                        Some(Id::String(s)) => Some(s.clone()),
                        Some(Id::Number(n)) => Some(n.to_string()),
                        None => text_property("id"),
                    };
                    seed.zones.push(ZoneSeed {
                        id,
                        name: text_property("name").unwrap_or_else(|| "Unnamed zone".to_string()),
                        ring: exterior.iter().map(|p| position_to_geo_pos(p)).collect::<Result<_>>()?,
                        risk_score: u8::try_from(risk_score).unwrap_or(u8::MAX),
                        reason: text_property("reason"),
                        owner: text_property("owner"),
                    });
                }
                Value::Point(position) => {
                    let pos = position_to_geo_pos(&position)?;
                    seed.heat.push(HeatPoint {
                        lon: pos.lon,
                        lat: pos.lat,
                        weight: properties
                            .get("weight")
                            .and_then(|v| v.as_f64())
                            .unwrap_or(1.0),
                        label: text_property("label"),
                    });
                }
                _ => {
                    log::debug!("Skipping unsupported seed geometry");
                }
            }
        }
        Ok(seed)
    }
}

#[cfg(feature = "geojson")]
fn position_to_geo_pos(pos: &[f64]) -> Result<GeoPos> {
    match pos {
        [lon, lat, ..] => Ok(GeoPos {
            lon: *lon,
            lat: *lat,
        }),
        _ => Err(MapError::MalformedInput(format!(
            "position needs two values, got {pos:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heat_point_validation() {
        assert!(HeatPoint::new(10.0, 50.0, 1.0).validate().is_ok());
        assert!(HeatPoint::new(10.0, 50.0, 0.01).validate().is_ok());
        assert!(matches!(
            HeatPoint::new(10.0, 50.0, 0.0).validate(),
            Err(MapError::OutOfRange(_))
        ));
        assert!(matches!(
            HeatPoint::new(10.0, 50.0, 1.5).validate(),
            Err(MapError::OutOfRange(_))
        ));
        assert!(matches!(
            HeatPoint::new(10.0, 95.0, 0.5).validate(),
            Err(MapError::OutOfRange(_))
        ));
    }

    #[test]
    fn seed_deserializes_from_host_json() {
        let json = r#"{
            "zones": [{
                "name": "Flood plain",
                "ring": [{"lon": 0.0, "lat": 0.0}, {"lon": 1.0, "lat": 0.0}, {"lon": 1.0, "lat": 1.0}],
                "riskScore": 82,
                "reason": "Seasonal flooding"
            }],
            "heat": [{"lon": 0.5, "lat": 0.5, "weight": 0.7}]
        }"#;

        let seed: MapSeed = serde_json::from_str(json).unwrap();
        assert_eq!(seed.zones.len(), 1);
        assert_eq!(seed.zones[0].risk_score, 82);
        assert_eq!(seed.zones[0].reason.as_deref(), Some("Seasonal flooding"));
        assert!(seed.zones[0].owner.is_none());
        assert!(seed.zones[0].id.is_none());
        assert_eq!(seed.heat, vec![HeatPoint::new(0.5, 0.5, 0.7)]);
    }

    #[test]
    #[cfg(feature = "geojson")]
    fn seed_from_geojson_feature_collection() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": "zone-7",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[-84.4, 33.7], [-84.3, 33.7], [-84.3, 33.8], [-84.4, 33.7]]]
                    },
                    "properties": {"name": "Downtown", "riskScore": 82, "owner": "City"}
                },
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [-84.39, 33.75]},
                    "properties": {"weight": 0.4, "label": "Reports"}
                },
                {
                    "type": "Feature",
                    "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]},
                    "properties": null
                }
            ]
        }"#;

        let seed = MapSeed::from_geojson_str(text).unwrap();
        assert_eq!(seed.zones.len(), 1);
        let zone = &seed.zones[0];
        assert_eq!(zone.id.as_deref(), Some("zone-7"));
        assert_eq!(zone.name, "Downtown");
        assert_eq!(zone.risk_score, 82);
        assert_eq!(zone.owner.as_deref(), Some("City"));
        assert_eq!(zone.ring.len(), 4);
        assert_eq!(zone.ring[0], GeoPos { lon: -84.4, lat: 33.7 });

        assert_eq!(seed.heat.len(), 1);
        assert_eq!(seed.heat[0].weight, 0.4);
        assert_eq!(seed.heat[0].label.as_deref(), Some("Reports"));
    }

    #[test]
    #[cfg(feature = "geojson")]
    fn seed_from_geojson_errors() {
        assert!(matches!(
            MapSeed::from_geojson_str("not json"),
            Err(MapError::MalformedInput(_))
        ));
        assert!(matches!(
            MapSeed::from_geojson_str(r#"{"type": "Point", "coordinates": [0.0, 0.0]}"#),
            Err(MapError::MalformedInput(_))
        ));
        let missing_score = r#"{"type": "FeatureCollection", "features": [{
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]},
            "properties": {"name": "No score"}
        }]}"#;
        assert!(matches!(
            MapSeed::from_geojson_str(missing_score),
            Err(MapError::MalformedInput(_))
        ));
    }
}
