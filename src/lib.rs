//! # edgequake-imgforensics
//!
//! Forensic profile of a still image: every metadata field several decoders
//! can find, where the photo was taken, and whether it looks retouched.
//!
//! ## Why this crate?
//!
//! No single EXIF parser reads every file. Phone HEIC, stripped web JPEGs and
//! camera TIFFs each trip up a different decoder, so this crate runs a cascade
//! of independent decoders and merges what they find under source-prefixed
//! keys. GPS coordinates are resolved to a postal address and a nearby
//! landmark through rate-limited, cached public geocoders, and an Error Level
//! Analysis pass scores how unevenly the image responds to recompression.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image bytes
//!  │
//!  ├─ 1. Metadata      5-stage extraction cascade (spawn_blocking)
//!  ├─ 2. Geolocation   Nominatim → Photon fallback, LRU+TTL cache, rate gate
//!  ├─ 3. Location      landmark pick from address details
//!  ├─ 4. Manipulation  ELA at JPEG q90, score 0–255 (spawn_blocking)
//!  └─ 5. Report        ForensicReport + throttled progress text per job
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_imgforensics::{analyze_file, ForensicsConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ForensicsConfig::default();
//!     let report = analyze_file("photo.jpg", &config).await?;
//!     for (key, value) in &report.metadata {
//!         println!("{key}: {value}");
//!     }
//!     if let Some(m) = &report.manipulation {
//!         println!("ELA score {:.1}: {}", m.ela_score, m.verdict());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `imgforensics` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-imgforensics = { version = "0.1", default-features = false }
//! ```
//!
//! ## Geocoding etiquette
//!
//! The public Nominatim instance allows one request per second and requires
//! an identifying User-Agent. Both are enforced by default; set
//! [`ForensicsConfig::user_agent`] to something that identifies your service.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_bytes, analyze_file, analyze_sync, analyze_with_callback, save_diff_image};
pub use config::{ForensicsConfig, ForensicsConfigBuilder, ThrottlePolicy};
pub use error::{ForensicsError, GeoError, ProgressError, StageError};
pub use job::{JobHandle, JobInfo, JobTracker, ReportSink};
pub use output::{
    Coordinates, Extraction, ForensicReport, GeoResult, JobStats, ManipulationReport, RiskLevel,
};
pub use progress::{
    JobProgressCallback, NoopProgressCallback, ProgressCallback, ProgressUpdate, Step, StepState,
};
