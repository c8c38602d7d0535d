//! Military grid reference (MGRS) encoding on the WGS84 ellipsoid.
//!
//! A reference is made of a UTM zone number, a latitude band letter, a two letter
//! 100 km square identifier and an even number of digits split between easting and
//! northing, e.g. `16SGC4176337497`.

use crate::codec::validate_lat_lon;
use crate::{MapError, Result};

/// Grid references are only issued between these latitudes (inclusive).
pub const GRID_LAT_LIMIT: f64 = 80.0;

/// The largest supported number of easting (and northing) digits. Five digits resolve
/// to one metre.
pub const MAX_GRID_PRECISION: usize = 5;

// WGS84 ellipsoid.
const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const ECC_SQUARED: f64 = 0.006_694_38;
const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

const SQUARE_SIZE: f64 = 100_000.0;
const ROW_CYCLE: f64 = 2_000_000.0;

const BAND_LETTERS: &[u8] = b"CDEFGHJKLMNPQRSTUVWX";
const ROW_LETTERS: &[u8] = b"ABCDEFGHJKLMNPQRSTUV";
const COLUMN_SETS: [&[u8]; 3] = [b"ABCDEFGH", b"JKLMNPQR", b"STUVWXYZ"];

/// Lowest northing, floored to 100 km, reached inside each latitude band. Indexed like
/// `BAND_LETTERS`.
const BAND_MIN_NORTHING: [f64; 20] = [
    1_100_000.0, // C
    2_000_000.0, // D
    2_800_000.0, // E
    3_700_000.0, // F
    4_600_000.0, // G
    5_500_000.0, // H
    6_400_000.0, // J
    7_300_000.0, // K
    8_200_000.0, // L
    9_100_000.0, // M
    0.0,         // N
    800_000.0,   // P
    1_700_000.0, // Q
    2_600_000.0, // R
    3_500_000.0, // S
    4_400_000.0, // T
    5_300_000.0, // U
    6_200_000.0, // V
    7_000_000.0, // W
    7_900_000.0, // X
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Utm {
    zone: u8,
    band: u8,
    easting: f64,
    northing: f64,
}

/// Encodes a geographic coordinate as a grid reference with `precision` digits for
/// each of easting and northing.
///
/// Digits are truncated, so the reference names the cell that contains the point.
pub fn encode_grid_ref(lon: f64, lat: f64, precision: usize) -> Result<String> {
    validate_lat_lon(lat, lon)?;
    if lat.abs() > GRID_LAT_LIMIT {
        return Err(MapError::OutOfRange(format!(
            "latitude {lat} is outside the grid band [-{GRID_LAT_LIMIT}, {GRID_LAT_LIMIT}]"
        )));
    }
    if precision > MAX_GRID_PRECISION {
        return Err(MapError::OutOfRange(format!(
            "grid precision {precision} is larger than {MAX_GRID_PRECISION}"
        )));
    }

    let utm = lat_lon_to_utm(lat, lon);
    let easting = utm.easting.trunc();
    let northing = utm.northing.trunc();

    let column = (easting / SQUARE_SIZE).floor() as usize;
    let row = ((northing / SQUARE_SIZE).floor() as usize) % ROW_LETTERS.len();
    let column_letter = column_letters(utm.zone)
        .get(column.wrapping_sub(1))
        .copied()
        .ok_or_else(|| {
            MapError::OutOfRange(format!("easting {easting} falls outside zone {}", utm.zone))
        })?;
    let row_letter = ROW_LETTERS[(row + row_offset(utm.zone)) % ROW_LETTERS.len()];

    let divisor = 10_u64.pow((MAX_GRID_PRECISION - precision) as u32);
    let east_digits = (easting as u64 % 100_000) / divisor;
    let north_digits = (northing as u64 % 100_000) / divisor;

    let mut grid_ref = format!(
        "{}{}{}{}",
        utm.zone, utm.band as char, column_letter as char, row_letter as char
    );
    if precision > 0 {
        grid_ref.push_str(&format!(
            "{east_digits:0width$}{north_digits:0width$}",
            width = precision
        ));
    }
    Ok(grid_ref)
}

/// Decodes a grid reference to the geographic centre of the cell it names.
/// (longitude, latitude)
///
/// Whitespace is ignored and letters may be in either case.
pub fn decode_grid_ref(grid_ref: &str) -> Result<(f64, f64)> {
    let cleaned: String = grid_ref
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let malformed = |reason: &str| {
        MapError::MalformedInput(format!("invalid grid reference {grid_ref:?}: {reason}"))
    };

    let bytes = cleaned.as_bytes();
    let zone_len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if zone_len == 0 || zone_len > 2 {
        return Err(malformed("expected a one or two digit zone number"));
    }
    let zone: u8 = cleaned[..zone_len]
        .parse()
        .map_err(|_| malformed("zone number is not a number"))?;
    if !(1..=60).contains(&zone) {
        return Err(malformed("zone number must be between 1 and 60"));
    }

    let rest = &bytes[zone_len..];
    if rest.len() < 3 {
        return Err(malformed("missing band letter or 100 km square"));
    }
    let band_index = BAND_LETTERS
        .iter()
        .position(|b| *b == rest[0])
        .ok_or_else(|| malformed("unknown latitude band letter"))?;
    let column_index = column_letters(zone)
        .iter()
        .position(|b| *b == rest[1])
        .ok_or_else(|| malformed("100 km column letter does not belong to the zone"))?;
    let row_index = ROW_LETTERS
        .iter()
        .position(|b| *b == rest[2])
        .ok_or_else(|| malformed("unknown 100 km row letter"))?;

    let digits = &rest[3..];
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(malformed("easting and northing must be digits"));
    }
    if digits.len() % 2 != 0 || digits.len() > 2 * MAX_GRID_PRECISION {
        return Err(malformed("expected an even number of at most ten digits"));
    }

    let precision = digits.len() / 2;
    let cell_size = 10_f64.powi((MAX_GRID_PRECISION - precision) as i32);
    let parse_digits = |part: &[u8]| -> f64 {
        part.iter()
            .fold(0.0, |acc, digit| acc * 10.0 + f64::from(digit - b'0'))
    };
    let east_offset = parse_digits(&digits[..precision]) * cell_size;
    let north_offset = parse_digits(&digits[precision..]) * cell_size;

    let easting = (column_index as f64 + 1.0) * SQUARE_SIZE + east_offset + cell_size / 2.0;

    let row_count = ROW_LETTERS.len();
    let row_in_cycle = (row_index + row_count - row_offset(zone)) % row_count;
    let mut northing = row_in_cycle as f64 * SQUARE_SIZE;
    while northing < BAND_MIN_NORTHING[band_index] {
        northing += ROW_CYCLE;
    }
    northing += north_offset + cell_size / 2.0;

    let (lat, lon) = utm_to_lat_lon(&Utm {
        zone,
        band: BAND_LETTERS[band_index],
        easting,
        northing,
    });
    Ok((lon, lat))
}

/// The column letters used by a zone. Zones cycle through three sets.
fn column_letters(zone: u8) -> &'static [u8] {
    COLUMN_SETS[(usize::from(zone) - 1) % COLUMN_SETS.len()]
}

/// Even zones start their row lettering five letters later.
fn row_offset(zone: u8) -> usize {
    if zone % 2 == 0 { 5 } else { 0 }
}

fn band_letter(lat: f64) -> u8 {
    if lat >= 72.0 {
        b'X'
    } else {
        let index = ((lat + 80.0) / 8.0).floor().clamp(0.0, 19.0) as usize;
        BAND_LETTERS[index]
    }
}

fn zone_number(lat: f64, lon: f64) -> u8 {
    if lon >= 180.0 {
        return 60;
    }
    // Norway
    if (56.0..64.0).contains(&lat) && (3.0..12.0).contains(&lon) {
        return 32;
    }
    // Svalbard
    if (72.0..84.0).contains(&lat) {
        match lon {
            l if (0.0..9.0).contains(&l) => return 31,
            l if (9.0..21.0).contains(&l) => return 33,
            l if (21.0..33.0).contains(&l) => return 35,
            l if (33.0..42.0).contains(&l) => return 37,
            _ => {}
        }
    }
    (((lon + 180.0) / 6.0).floor() as u8).clamp(0, 59) + 1
}

fn central_meridian(zone: u8) -> f64 {
    f64::from(zone - 1) * 6.0 - 180.0 + 3.0
}

fn lat_lon_to_utm(lat: f64, lon: f64) -> Utm {
    let zone = zone_number(lat, lon);
    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();
    let origin_rad = central_meridian(zone).to_radians();

    let e2 = ECC_SQUARED;
    let ep2 = e2 / (1.0 - e2);
    let (sin_lat, cos_lat, tan_lat) = (lat_rad.sin(), lat_rad.cos(), lat_rad.tan());

    let n = SEMI_MAJOR_AXIS / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = ep2 * cos_lat * cos_lat;
    let a = cos_lat * (lon_rad - origin_rad);
    let m = meridian_arc(lat_rad);

    let easting = SCALE_FACTOR
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + FALSE_EASTING;

    let mut northing = SCALE_FACTOR
        * (m + n
            * tan_lat
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if lat < 0.0 {
        northing += FALSE_NORTHING_SOUTH;
    }

    Utm {
        zone,
        band: band_letter(lat),
        easting,
        northing,
    }
}

fn meridian_arc(lat_rad: f64) -> f64 {
    let e2 = ECC_SQUARED;
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    SEMI_MAJOR_AXIS
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat_rad
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat_rad).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat_rad).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * lat_rad).sin())
}

/// (latitude, longitude)
fn utm_to_lat_lon(utm: &Utm) -> (f64, f64) {
    let e2 = ECC_SQUARED;
    let ep2 = e2 / (1.0 - e2);
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let x = utm.easting - FALSE_EASTING;
    let y = if utm.band < b'N' {
        utm.northing - FALSE_NORTHING_SOUTH
    } else {
        utm.northing
    };

    let m = y / SCALE_FACTOR;
    let mu = m / (SEMI_MAJOR_AXIS * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2.powi(3) / 256.0));
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin();

    let (sin_phi, cos_phi, tan_phi) = (phi1.sin(), phi1.cos(), phi1.tan());
    let n1 = SEMI_MAJOR_AXIS / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t1 = tan_phi * tan_phi;
    let c1 = ep2 * cos_phi * cos_phi;
    let r1 = SEMI_MAJOR_AXIS * (1.0 - e2) / (1.0 - e2 * sin_phi * sin_phi).powf(1.5);
    let d = x / (n1 * SCALE_FACTOR);

    let lat = phi1
        - (n1 * tan_phi / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d.powi(5)
            / 120.0)
        / cos_phi;

    (lat.to_degrees(), central_meridian(utm.zone) + lon.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Approximate ground distance in metres between two nearby points.
    fn distance_m(a: (f64, f64), b: (f64, f64)) -> f64 {
        let mean_lat = ((a.1 + b.1) / 2.0).to_radians();
        let dx = (a.0 - b.0) * 111_320.0 * mean_lat.cos();
        let dy = (a.1 - b.1) * 110_574.0;
        (dx * dx + dy * dy).sqrt()
    }

    #[test]
    fn encode_known_references() {
        // lon, lat, precision, expected
        let test_cases = vec![
            (-84.39, 33.75, 5, "16SGC4176337497"),
            (-77.0365, 38.8977, 5, "18SUJ2339407395"),
            (0.0, 0.0, 5, "31NAA6602100000"),
            (24.93545, 60.16952, 0, "35VLG"),
            (24.93545, 60.16952, 1, "35VLG87"),
        ];

        for (lon, lat, precision, expected) in test_cases {
            assert_eq!(encode_grid_ref(lon, lat, precision).unwrap(), expected);
        }
    }

    #[test]
    fn encode_uses_zone_exceptions() {
        // Bergen sits in the widened zone 32.
        assert_eq!(encode_grid_ref(5.32, 60.39, 1).unwrap(), "32VKN90");
        // Longyearbyen in Svalbard zone 33.
        assert_eq!(encode_grid_ref(15.6, 78.22, 1).unwrap(), "33XWG18");
        assert_eq!(encode_grid_ref(180.0, 10.0, 1).unwrap(), "60PZS20");
    }

    #[test]
    fn encode_rejects_outside_grid_band() {
        assert!(matches!(encode_grid_ref(10.0, 80.5, 5), Err(MapError::OutOfRange(_))));
        assert!(matches!(encode_grid_ref(10.0, -85.0, 5), Err(MapError::OutOfRange(_))));
        assert!(matches!(encode_grid_ref(190.0, 10.0, 5), Err(MapError::OutOfRange(_))));
        assert!(matches!(encode_grid_ref(10.0, 10.0, 6), Err(MapError::OutOfRange(_))));
    }

    #[test]
    fn decode_recovers_encoded_point_within_a_metre() {
        let mut lat = -80.0;
        while lat <= 80.0 {
            let mut lon = -179.5;
            while lon <= 180.0 {
                let grid_ref = encode_grid_ref(lon, lat, 5).unwrap();
                let decoded = decode_grid_ref(&grid_ref).unwrap();
                let error = distance_m((lon, lat), decoded);
                assert!(error <= 1.0, "{grid_ref} for ({lat}, {lon}) is off by {error} m");
                lon += 13.25;
            }
            lat += 3.3;
        }
    }

    #[test]
    fn decode_accepts_spacing_and_case() {
        let compact = decode_grid_ref("16SGC4176337497").unwrap();
        let spaced = decode_grid_ref(" 16s gc 41763 37497 ").unwrap();
        assert_eq!(compact, spaced);
        assert!(distance_m(compact, (-84.39, 33.75)) < 1.0);
    }

    #[test]
    fn decode_low_precision_returns_cell_centre() {
        let (lon, lat) = decode_grid_ref("16SGB").unwrap();
        let grid_ref = encode_grid_ref(lon, lat, 0).unwrap();
        assert_eq!(grid_ref, "16SGB");
        // The centre of a 100 km square is 50 km from its southern edge.
        let (_, south_lat) = decode_grid_ref("16SGB0000000000").unwrap();
        assert!(distance_m((lon, lat), (lon, south_lat)) > 45_000.0);
    }

    #[test]
    fn decode_rejects_malformed_references() {
        for bad in [
            "",
            "SGB4144934909",
            "123SGB41449",
            "0SGB4144934909",
            "61SGB4144934909",
            "16IGB4144934909",
            "16SJB4144934909", // column J belongs to zones 2, 5, 8, ...
            "16SGW4144934909",
            "16SGB414493490",
            "16SGB41449349091",
            "16SGB414493490912",
            "16SGB4144x34909",
            "16S",
        ] {
            assert!(
                matches!(decode_grid_ref(bad), Err(MapError::MalformedInput(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
