//! Configuration types for image forensics jobs.
//!
//! All pipeline behaviour is controlled through [`ForensicsConfig`], built
//! via its [`ForensicsConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across job tasks and to log exactly which
//! thresholds produced a given verdict.
//!
//! # Design choice: builder over constructor
//! Most callers only change the language or the worker count. The builder
//! lets them set only what they care about and rely on the defaults for the
//! rest.

use crate::error::ForensicsError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the forensics pipeline.
///
/// # Example
/// ```rust
/// use edgequake_imgforensics::ForensicsConfig;
///
/// let config = ForensicsConfig::builder()
///     .language("de")
///     .workers(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 8);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicsConfig {
    /// Preferred language for addresses (`Accept-Language` / `lang`). Default: "en".
    pub language: String,

    /// User agent sent to the geocoding services.
    ///
    /// Nominatim's usage policy rejects requests without an identifying agent.
    pub user_agent: String,

    /// Base URL of the primary reverse geocoder (Nominatim).
    pub nominatim_url: String,

    /// Base URL of the secondary reverse geocoder (Photon).
    pub photon_url: String,

    /// Primary provider timeout in seconds. Default: 15.
    pub primary_timeout_secs: u64,

    /// Secondary provider timeout in seconds. Default: 10.
    pub secondary_timeout_secs: u64,

    /// Minimum interval between primary-provider calls, across all jobs. Default: 1500.
    pub rate_limit_ms: u64,

    /// Lifetime of a cached address in seconds. Default: 3600.
    pub cache_ttl_secs: u64,

    /// Maximum number of cached addresses. Default: 1000.
    pub cache_capacity: usize,

    /// Skip geocoding entirely (coordinates are still extracted). Default: true.
    pub geocoding: bool,

    /// JPEG quality used for the ELA recompression. Default: 90.
    ///
    /// Changing it changes every score; thresholds below were tuned for 90.
    pub ela_quality: u8,

    /// ELA score above which an image is flagged as edited. Default: 25.0.
    pub ela_threshold: f64,

    /// ELA score below which the risk tier is "low". Default: 10.0.
    pub ela_low_threshold: f64,

    /// Longest edge (px) above which the image is downscaled before ELA. Default: 2048.
    pub ela_downscale_trigger: u32,

    /// Bounding box edge (px) the image is downscaled into. Default: 1024.
    pub ela_downscale_box: u32,

    /// Minimum spacing between propagated progress updates per job. Default: 500.
    pub progress_cooldown_ms: u64,

    /// What happens to progress updates that arrive inside the cooldown.
    pub throttle_policy: ThrottlePolicy,

    /// Maximum number of jobs analysed at the same time. Default: 4.
    pub workers: usize,

    /// Largest accepted input in bytes. Default: 20 MiB.
    pub max_input_bytes: u64,
}

impl Default for ForensicsConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            user_agent: format!("edgequake-imgforensics/{}", env!("CARGO_PKG_VERSION")),
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            photon_url: "https://photon.komoot.io".to_string(),
            primary_timeout_secs: 15,
            secondary_timeout_secs: 10,
            rate_limit_ms: 1500,
            cache_ttl_secs: 3600,
            cache_capacity: 1000,
            geocoding: true,
            ela_quality: 90,
            ela_threshold: 25.0,
            ela_low_threshold: 10.0,
            ela_downscale_trigger: 2048,
            ela_downscale_box: 1024,
            progress_cooldown_ms: 500,
            throttle_policy: ThrottlePolicy::default(),
            workers: 4,
            max_input_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ForensicsConfig {
    /// Create a new builder for `ForensicsConfig`.
    pub fn builder() -> ForensicsConfigBuilder {
        ForensicsConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_secs(self.primary_timeout_secs)
    }

    pub fn secondary_timeout(&self) -> Duration {
        Duration::from_secs(self.secondary_timeout_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn progress_cooldown(&self) -> Duration {
        Duration::from_millis(self.progress_cooldown_ms)
    }
}

/// Builder for [`ForensicsConfig`].
#[derive(Debug)]
pub struct ForensicsConfigBuilder {
    config: ForensicsConfig,
}

impl ForensicsConfigBuilder {
    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn nominatim_url(mut self, url: impl Into<String>) -> Self {
        self.config.nominatim_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn photon_url(mut self, url: impl Into<String>) -> Self {
        self.config.photon_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn primary_timeout_secs(mut self, secs: u64) -> Self {
        self.config.primary_timeout_secs = secs.max(1);
        self
    }

    pub fn secondary_timeout_secs(mut self, secs: u64) -> Self {
        self.config.secondary_timeout_secs = secs.max(1);
        self
    }

    pub fn rate_limit_ms(mut self, ms: u64) -> Self {
        self.config.rate_limit_ms = ms;
        self
    }

    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    pub fn cache_capacity(mut self, n: usize) -> Self {
        self.config.cache_capacity = n.max(1);
        self
    }

    pub fn geocoding(mut self, enabled: bool) -> Self {
        self.config.geocoding = enabled;
        self
    }

    pub fn ela_quality(mut self, q: u8) -> Self {
        self.config.ela_quality = q.clamp(1, 100);
        self
    }

    pub fn ela_threshold(mut self, score: f64) -> Self {
        self.config.ela_threshold = score;
        self
    }

    pub fn ela_low_threshold(mut self, score: f64) -> Self {
        self.config.ela_low_threshold = score;
        self
    }

    pub fn ela_downscale(mut self, trigger: u32, bounding_box: u32) -> Self {
        self.config.ela_downscale_trigger = trigger;
        self.config.ela_downscale_box = bounding_box;
        self
    }

    pub fn progress_cooldown_ms(mut self, ms: u64) -> Self {
        self.config.progress_cooldown_ms = ms;
        self
    }

    pub fn throttle_policy(mut self, policy: ThrottlePolicy) -> Self {
        self.config.throttle_policy = policy;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn max_input_bytes(mut self, n: u64) -> Self {
        self.config.max_input_bytes = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ForensicsConfig, ForensicsError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(ForensicsError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if !(0.0..=255.0).contains(&c.ela_threshold) {
            return Err(ForensicsError::InvalidConfig(format!(
                "ELA threshold must be 0–255, got {}",
                c.ela_threshold
            )));
        }
        if c.ela_low_threshold > c.ela_threshold {
            return Err(ForensicsError::InvalidConfig(format!(
                "Low-risk threshold ({}) exceeds the edit threshold ({})",
                c.ela_low_threshold, c.ela_threshold
            )));
        }
        if c.ela_downscale_box == 0 || c.ela_downscale_box > c.ela_downscale_trigger {
            return Err(ForensicsError::InvalidConfig(format!(
                "ELA downscale box ({}) must be 1..=trigger ({})",
                c.ela_downscale_box, c.ela_downscale_trigger
            )));
        }
        if c.user_agent.trim().is_empty() {
            return Err(ForensicsError::InvalidConfig(
                "User agent must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What the progress tracker does with an update that arrives inside the cooldown.
///
/// | Policy | Behaviour |
/// |--------|-----------|
/// | `DropInsideCooldown` | Drop it. The next update outside the cooldown carries the latest state (default) |
/// | `FlushLatest` | Drop it now, but deliver the latest pending text before the next step begins |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThrottlePolicy {
    #[default]
    DropInsideCooldown,
    FlushLatest,
}
