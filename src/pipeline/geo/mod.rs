//! Geo resolution: coordinates → human-readable address and nearby landmark.
//!
//! ```text
//! resolve_address(c)
//!   ├─ cache hit (unexpired) ───────────────────────────▶ cached address
//!   ├─ rate gate ─▶ primary (Nominatim, 15 s) ─ ok ─▶ cache ─▶ address
//!   ├─ secondary (Photon, 10 s) ─────────────── ok ─▶ cache ─▶ address
//!   └─ ADDRESS_NOT_DETERMINED (not cached, so the next job retries)
//! ```
//!
//! The cache and the rate gate are owned by [`GeoService`] and shared by every
//! job through `Arc`. Providers sit behind the [`ReverseGeocoder`] and
//! [`LandmarkSource`] traits so tests can swap in fakes.
//!
//! The cache check is not atomic with the network call: two jobs asking for
//! the same unseen coordinate at the same moment may both go to the network.

pub mod cache;
pub mod nominatim;
pub mod photon;
pub mod rate;

pub use cache::{cache_key, GeoCache};
pub use rate::RateGate;

use crate::config::ForensicsConfig;
use crate::error::{ForensicsError, GeoError};
use crate::output::{Coordinates, GeoResult, ADDRESS_NOT_DETERMINED, LANDMARK_NOT_FOUND};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Structured address fields (`road`, `city`, `tourism`, ...) of one lookup.
pub type AddressDetails = BTreeMap<String, String>;

/// A provider that turns coordinates into a one-line address.
pub trait ReverseGeocoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn reverse(&self, c: Coordinates) -> BoxFuture<'_, Result<String, GeoError>>;
}

/// A provider that returns the detailed address block for coordinates.
pub trait LandmarkSource: Send + Sync {
    fn address_details(&self, c: Coordinates) -> BoxFuture<'_, Result<AddressDetails, GeoError>>;
}

/// Reverse geocoding with caching, a global rate gate and provider fallback.
pub struct GeoService {
    primary: Arc<dyn ReverseGeocoder>,
    secondary: Arc<dyn ReverseGeocoder>,
    landmarks: Arc<dyn LandmarkSource>,
    cache: Arc<GeoCache>,
    gate: Arc<RateGate>,
}

impl GeoService {
    pub fn new(
        primary: Arc<dyn ReverseGeocoder>,
        secondary: Arc<dyn ReverseGeocoder>,
        landmarks: Arc<dyn LandmarkSource>,
        cache: Arc<GeoCache>,
        gate: Arc<RateGate>,
    ) -> Self {
        Self {
            primary,
            secondary,
            landmarks,
            cache,
            gate,
        }
    }

    /// Nominatim + Photon over one shared HTTP client.
    pub fn from_config(config: &ForensicsConfig) -> Result<Self, ForensicsError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ForensicsError::Internal(format!("HTTP client: {e}")))?;

        let nominatim = Arc::new(nominatim::Nominatim::new(client.clone(), config));
        let photon = Arc::new(photon::Photon::new(client, config));

        Ok(Self::new(
            nominatim.clone(),
            photon,
            nominatim,
            Arc::new(GeoCache::new(config.cache_capacity, config.cache_ttl())),
            Arc::new(RateGate::new(config.rate_limit())),
        ))
    }

    pub fn cache(&self) -> &GeoCache {
        &self.cache
    }

    /// Address for `c`. Never fails; falls back to [`ADDRESS_NOT_DETERMINED`].
    pub async fn resolve_address(&self, c: Coordinates) -> String {
        let key = cache_key(c);
        if let Some(hit) = self.cache.get(&key) {
            debug!("Geo cache hit for {key}");
            return hit;
        }

        self.gate.wait().await;
        match self.primary.reverse(c).await {
            Ok(address) => {
                info!("Resolved {key} via {}", self.primary.name());
                self.cache.insert(key, address.clone());
                return address;
            }
            Err(e) => warn!("Primary geocoder failed: {e}"),
        }

        match self.secondary.reverse(c).await {
            Ok(address) => {
                info!("Resolved {key} via {}", self.secondary.name());
                self.cache.insert(key, address.clone());
                address
            }
            Err(e) => {
                warn!("Secondary geocoder failed: {e}");
                ADDRESS_NOT_DETERMINED.to_string()
            }
        }
    }

    /// Nearby landmark for `c`. Uncached; shares the primary's rate gate.
    pub async fn find_landmark(&self, c: Coordinates) -> String {
        self.gate.wait().await;
        match self.landmarks.address_details(c).await {
            Ok(details) => pick_landmark(&details).unwrap_or_else(|| {
                debug!("Address block for {c} has no usable landmark fields");
                LANDMARK_NOT_FOUND.to_string()
            }),
            Err(e) => {
                warn!("Landmark lookup failed: {e}");
                LANDMARK_NOT_FOUND.to_string()
            }
        }
    }

    /// Address then landmark.
    pub async fn resolve(&self, c: Coordinates) -> GeoResult {
        let address = self.resolve_address(c).await;
        let landmark = self.find_landmark(c).await;
        GeoResult { address, landmark }
    }
}

/// Prefer a tourism, historic or amenity name; otherwise `"<road>, <city-or-town>"`.
pub fn pick_landmark(details: &AddressDetails) -> Option<String> {
    let field = |k: &str| {
        details
            .get(k)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    if let Some(named) = ["tourism", "historic", "amenity"]
        .iter()
        .find_map(|k| field(k))
    {
        return Some(named.to_string());
    }

    let road = field("road");
    let place = field("city").or_else(|| field("town"));
    if road.is_none() && place.is_none() {
        return None;
    }
    Some(format!(
        "{}, {}",
        road.unwrap_or_default(),
        place.unwrap_or_default()
    ))
}

/// Send `request` with a per-call timeout and decode a JSON body.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    provider: &'static str,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T, GeoError> {
    let secs = timeout.as_secs();
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| GeoError::from_reqwest(provider, secs, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(GeoError::Status {
            provider,
            status: status.as_u16(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| GeoError::from_reqwest(provider, secs, e))?;
    serde_json::from_slice(&body).map_err(|e| GeoError::Malformed {
        provider,
        detail: e.to_string(),
    })
}
