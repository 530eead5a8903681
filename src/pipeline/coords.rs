//! Coordinate normalisation: heterogeneous angle encodings → decimal degrees.
//!
//! GPS angles reach us in three shapes depending on which decoder read them:
//! plain degree/minute/second numbers, EXIF RATIONAL triples, or an already
//! decimal value (ISO 6709 strings from video tracks). Every function here is
//! total: bad input yields `None`, never a panic, because a broken GPS block
//! must not take the rest of the metadata down with it.

use crate::output::Coordinates;
use once_cell::sync::Lazy;
use regex::Regex;

/// An angle as handed over by one of the decoders.
#[derive(Debug, Clone, Copy)]
pub enum Angle<'a> {
    /// Degrees, minutes, seconds.
    Dms(&'a [f64]),
    /// EXIF RATIONAL degrees, minutes, seconds.
    Rationals(&'a [exif::Rational]),
    /// Already decimal degrees.
    Decimal(f64),
}

/// Convert an angle to decimal degrees.
///
/// Returns `None` when a component is missing, non-finite, or a rational has
/// a zero denominator.
pub fn to_degrees(angle: Angle<'_>) -> Option<f64> {
    let degrees = match angle {
        Angle::Dms(parts) => match parts {
            [d, m, s, ..] => d + m / 60.0 + s / 3600.0,
            _ => return None,
        },
        Angle::Rationals(parts) => match parts {
            [d, m, s, ..] => {
                let d = rational(d)?;
                let m = rational(m)?;
                let s = rational(s)?;
                d + m / 60.0 + s / 3600.0
            }
            _ => return None,
        },
        Angle::Decimal(v) => v,
    };
    degrees.is_finite().then_some(degrees)
}

fn rational(r: &exif::Rational) -> Option<f64> {
    if r.denom == 0 {
        None
    } else {
        Some(r.num as f64 / r.denom as f64)
    }
}

/// Apply a hemisphere reference: `S` and `W` make the value negative.
pub fn apply_hemisphere(value: f64, reference: &str) -> f64 {
    match reference.trim().trim_matches('"').chars().next() {
        Some('S') | Some('s') | Some('W') | Some('w') => -value.abs(),
        _ => value,
    }
}

/// Build coordinates from a latitude/longitude pair of angles plus references.
pub fn coordinates_from(
    lat: Angle<'_>,
    lat_ref: &str,
    lon: Angle<'_>,
    lon_ref: &str,
) -> Option<Coordinates> {
    let lat = apply_hemisphere(to_degrees(lat)?, lat_ref);
    let lon = apply_hemisphere(to_degrees(lon)?, lon_ref);
    let coords = Coordinates::new(lat, lon);
    coords.is_plausible().then_some(coords)
}

static ISO6709: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([+-]\d+(?:\.\d+)?)([+-]\d+(?:\.\d+)?)").expect("valid regex"));

/// Parse the latitude/longitude prefix of an ISO 6709 string such as
/// `+48.8584+002.2945+035.000/`.
pub fn parse_iso6709(s: &str) -> Option<Coordinates> {
    let caps = ISO6709.captures(s)?;
    let lat = to_degrees(Angle::Decimal(caps[1].parse().ok()?))?;
    let lon = to_degrees(Angle::Decimal(caps[2].parse().ok()?))?;
    let coords = Coordinates::new(lat, lon);
    coords.is_plausible().then_some(coords)
}
