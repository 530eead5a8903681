//! Output types produced by the forensics pipeline.
//!
//! Everything here is plain data: the external report renderer (HTML page,
//! chat message, JSON dump) consumes these records and never reaches back
//! into the pipeline.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Address returned when neither geocoding provider produced a result.
pub const ADDRESS_NOT_DETERMINED: &str = "location not determined";

/// Landmark returned when the landmark lookup failed.
pub const LANDMARK_NOT_FOUND: &str = "landmark not found";

/// Namespaced tag key → stringified value.
///
/// Keys look like `"<Source>_<TagName>"`. A `BTreeMap` keeps serialised
/// reports stable between runs.
pub type MetadataMap = BTreeMap<String, String>;

/// A capture location in signed decimal degrees (south/west negative).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True if both components are finite and inside the WGS84 ranges.
    pub fn is_plausible(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = if self.lat >= 0.0 { 'N' } else { 'S' };
        let ew = if self.lon >= 0.0 { 'E' } else { 'W' };
        write!(
            f,
            "{:.6}° {}, {:.6}° {}",
            self.lat.abs(),
            ns,
            self.lon.abs(),
            ew
        )
    }
}

/// Result of the metadata extraction cascade.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    pub metadata: MetadataMap,
    pub coordinates: Option<Coordinates>,
    /// Entries contributed across all stages, counting keys a later stage
    /// rewrote. Used for the "found N entries" progress note.
    pub entry_count: usize,
}

/// Reverse-geocoding outcome for one coordinate pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoResult {
    pub address: String,
    pub landmark: String,
}

impl GeoResult {
    pub fn address_found(&self) -> bool {
        self.address != ADDRESS_NOT_DETERMINED
    }

    pub fn landmark_found(&self) -> bool {
        self.landmark != LANDMARK_NOT_FOUND
    }
}

/// Informative risk tier derived from the ELA score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Classify a score. The high tier uses the same strict `>` as
    /// `is_edited`, so the tier and the flag always agree.
    pub fn classify(score: f64, low_below: f64, high_above: f64) -> Self {
        if score > high_above {
            RiskLevel::High
        } else if score < low_below {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low risk",
            RiskLevel::Medium => "medium risk",
            RiskLevel::High => "high risk",
        }
    }
}

/// Error Level Analysis verdict.
#[derive(Clone, Serialize)]
pub struct ManipulationReport {
    /// Mean luminance of the contrast-stretched difference image (0–255).
    pub ela_score: f64,
    pub is_edited: bool,
    pub risk: RiskLevel,
    /// JPEG-encoded difference image, for display only.
    #[serde(serialize_with = "as_base64")]
    pub diff_image: Vec<u8>,
}

impl ManipulationReport {
    /// Width of a 0–100 % gauge; a score of 50 already fills it.
    pub fn gauge_percent(&self) -> f64 {
        (self.ela_score * 2.0).min(100.0)
    }

    /// Short verdict used in progress notes and summaries.
    pub fn verdict(&self) -> &'static str {
        if self.is_edited {
            "Possibly edited"
        } else {
            "Original"
        }
    }
}

impl fmt::Debug for ManipulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManipulationReport")
            .field("ela_score", &self.ela_score)
            .field("is_edited", &self.is_edited)
            .field("risk", &self.risk)
            .field("diff_image", &format_args!("<{} bytes>", self.diff_image.len()))
            .finish()
    }
}

fn as_base64<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&STANDARD.encode(bytes))
}

/// Wall-clock timings of one job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStats {
    pub metadata_ms: u64,
    pub geolocation_ms: u64,
    pub manipulation_ms: u64,
    pub total_ms: u64,
}

/// Final record handed to the report renderer.
#[derive(Debug, Clone, Serialize)]
pub struct ForensicReport {
    pub job_id: u64,
    pub owner: String,
    pub metadata: MetadataMap,
    pub entry_count: usize,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// `None` when the image carries no coordinates or geocoding is disabled.
    pub address: Option<String>,
    pub landmark: Option<String>,
    /// `None` means the analysis could not be performed, not "no tampering".
    pub manipulation: Option<ManipulationReport>,
    pub stats: JobStats,
}

impl ForensicReport {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_boundaries_are_strict_at_threshold() {
        assert_eq!(RiskLevel::classify(9.99, 10.0, 25.0), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(10.0, 10.0, 25.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(25.0, 10.0, 25.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(25.01, 10.0, 25.0), RiskLevel::High);
    }

    #[test]
    fn gauge_caps_at_100() {
        let r = ManipulationReport {
            ela_score: 80.0,
            is_edited: true,
            risk: RiskLevel::High,
            diff_image: vec![],
        };
        assert_eq!(r.gauge_percent(), 100.0);
        assert_eq!(r.verdict(), "Possibly edited");
    }

    #[test]
    fn coordinates_display_uses_hemispheres() {
        let c = Coordinates::new(-33.8688, 151.2093);
        assert_eq!(c.to_string(), "33.868800° S, 151.209300° E");
    }

    #[test]
    fn implausible_coordinates_detected() {
        assert!(Coordinates::new(48.8584, 2.2945).is_plausible());
        assert!(!Coordinates::new(91.0, 0.0).is_plausible());
        assert!(!Coordinates::new(f64::NAN, 0.0).is_plausible());
    }

    #[test]
    fn manipulation_report_serialises_image_as_base64() {
        let r = ManipulationReport {
            ela_score: 3.5,
            is_edited: false,
            risk: RiskLevel::Low,
            diff_image: vec![0xFF, 0xD8, 0xFF],
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["diff_image"], "/9j/");
        assert_eq!(json["risk"], "low");
    }
}
