//! Pure conversions between geographic coordinates, projected map coordinates and
//! grid-reference strings.
//!
//! Every function in this module is free of side effects and safe to call from
//! anywhere.

mod grid;

pub use grid::{GRID_LAT_LIMIT, MAX_GRID_PRECISION, decode_grid_ref, encode_grid_ref};

use crate::projection::GeoPos;
use crate::{MapError, Result};

/// Radius of the sphere used by the Web Mercator projection, in metres.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Checks that a coordinate pair lies inside the geographic domain.
pub fn validate_lat_lon(lat: f64, lon: f64) -> Result<()> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(MapError::OutOfRange(format!(
            "latitude {lat} is outside [-90, 90]"
        )));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(MapError::OutOfRange(format!(
            "longitude {lon} is outside [-180, 180]"
        )));
    }
    Ok(())
}

/// Converts a geographic coordinate to Web Mercator metres. (x, y)
///
/// The poles map to large but finite values, so every valid coordinate survives a
/// round trip through [`to_geographic`].
pub fn to_projected(lon: f64, lat: f64) -> Result<(f64, f64)> {
    validate_lat_lon(lat, lon)?;
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * lat.to_radians().tan().asinh();
    Ok((x, y))
}

/// Converts Web Mercator metres back to a geographic coordinate. (longitude, latitude)
pub fn to_geographic(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (y / EARTH_RADIUS).sinh().atan().to_degrees();
    (lon, lat)
}

/// Parses coordinate text typed by a user, such as `"33.75, -84.39"` or `"33.75 -84.39"`.
///
/// The first number is the latitude and the second the longitude.
pub fn parse_lat_lon(text: &str) -> Result<GeoPos> {
    let mut parts = text
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|part| !part.is_empty());

    let (Some(lat), Some(lon), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed_coordinates(text));
    };

    let lat: f64 = lat
        .parse()
        .map_err(|_| malformed_coordinates(text))?;
    let lon: f64 = lon
        .parse()
        .map_err(|_| malformed_coordinates(text))?;

    validate_lat_lon(lat, lon)?;
    Ok(GeoPos::from_lat_lon(lat, lon))
}

/// Formats a coordinate the way popups and logs show it.
pub fn format_lat_lon(pos: GeoPos) -> String {
    let ns = if pos.lat < 0.0 { 'S' } else { 'N' };
    let ew = if pos.lon < 0.0 { 'W' } else { 'E' };
    format!("{:.5}°{ns}, {:.5}°{ew}", pos.lat.abs(), pos.lon.abs())
}

fn malformed_coordinates(text: &str) -> MapError {
    MapError::MalformedInput(format!("expected \"<lat>, <lon>\", got {text:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn projected_roundtrip_covers_whole_domain() {
        let mut lat = -90.0;
        while lat <= 90.0 {
            let mut lon = -180.0;
            while lon <= 180.0 {
                let (x, y) = to_projected(lon, lat).unwrap();
                assert!(x.is_finite() && y.is_finite(), "({lat}, {lon})");
                let (back_lon, back_lat) = to_geographic(x, y);
                assert!((back_lon - lon).abs() < EPSILON, "lon {lon} -> {back_lon}");
                assert!((back_lat - lat).abs() < EPSILON, "lat {lat} -> {back_lat}");
                lon += 7.5;
            }
            lat += 2.5;
        }
    }

    #[test]
    fn projected_known_values() {
        let (x, y) = to_projected(0.0, 0.0).unwrap();
        assert!(x.abs() < EPSILON && y.abs() < EPSILON);

        // The edge of the Web Mercator square.
        let (x, y) = to_projected(180.0, 85.0511287798).unwrap();
        assert!((x - 20_037_508.342789244).abs() < 1e-6);
        assert!((y - 20_037_508.342789244).abs() < 1e-2);
    }

    #[test]
    fn projected_rejects_out_of_range() {
        assert!(matches!(to_projected(0.0, 90.5), Err(MapError::OutOfRange(_))));
        assert!(matches!(to_projected(-181.0, 0.0), Err(MapError::OutOfRange(_))));
        assert!(matches!(to_projected(f64::NAN, 0.0), Err(MapError::OutOfRange(_))));
    }

    #[test]
    fn parse_lat_lon_accepts_common_separators() {
        for text in ["33.75, -84.39", "33.75 -84.39", " 33.75;-84.39 ", "33.75,-84.39"] {
            let pos = parse_lat_lon(text).unwrap();
            assert_eq!(pos, GeoPos::from_lat_lon(33.75, -84.39), "{text}");
        }
    }

    #[test]
    fn parse_lat_lon_errors() {
        assert!(matches!(parse_lat_lon("north"), Err(MapError::MalformedInput(_))));
        assert!(matches!(parse_lat_lon("1, 2, 3"), Err(MapError::MalformedInput(_))));
        assert!(matches!(parse_lat_lon("33.75"), Err(MapError::MalformedInput(_))));
        assert!(matches!(parse_lat_lon("95, 10"), Err(MapError::OutOfRange(_))));
    }

    #[test]
    fn format_lat_lon_uses_hemispheres() {
        assert_eq!(
            format_lat_lon(GeoPos::from_lat_lon(33.75, -84.39)),
            "33.75000°N, 84.39000°W"
        );
        assert_eq!(
            format_lat_lon(GeoPos::from_lat_lon(-1.5, 2.25)),
            "1.50000°S, 2.25000°E"
        );
    }
}
