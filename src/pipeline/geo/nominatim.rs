//! Primary provider: Nominatim `/reverse`.

use super::{fetch_json, AddressDetails, LandmarkSource, ReverseGeocoder};
use crate::config::ForensicsConfig;
use crate::error::GeoError;
use crate::output::Coordinates;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const PROVIDER: &str = "nominatim";

/// Zoom used for both lookups: building level.
const ZOOM: &str = "18";

#[derive(Debug, Deserialize)]
struct Reply {
    display_name: Option<String>,
    #[serde(default)]
    address: HashMap<String, serde_json::Value>,
    error: Option<String>,
}

pub struct Nominatim {
    client: reqwest::Client,
    base_url: String,
    language: String,
    timeout: Duration,
}

impl Nominatim {
    pub fn new(client: reqwest::Client, config: &ForensicsConfig) -> Self {
        Self {
            client,
            base_url: config.nominatim_url.clone(),
            language: config.language.clone(),
            timeout: config.primary_timeout(),
        }
    }

    async fn lookup(&self, c: Coordinates) -> Result<Reply, GeoError> {
        let (lat, lon) = (c.lat.to_string(), c.lon.to_string());
        let request = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .header(reqwest::header::ACCEPT_LANGUAGE, self.language.as_str())
            .query(&[
                ("format", "json"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("zoom", ZOOM),
                ("addressdetails", "1"),
                ("accept-language", self.language.as_str()),
            ]);
        let reply: Reply = fetch_json(PROVIDER, request, self.timeout).await?;
        if let Some(err) = reply.error.as_deref() {
            tracing::debug!("{PROVIDER}: {err}");
            return Err(GeoError::NoResult { provider: PROVIDER });
        }
        Ok(reply)
    }
}

impl ReverseGeocoder for Nominatim {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn reverse(&self, c: Coordinates) -> BoxFuture<'_, Result<String, GeoError>> {
        async move {
            let reply = self.lookup(c).await?;
            reply
                .display_name
                .filter(|s| !s.trim().is_empty())
                .ok_or(GeoError::NoResult { provider: PROVIDER })
        }
        .boxed()
    }
}

impl LandmarkSource for Nominatim {
    fn address_details(&self, c: Coordinates) -> BoxFuture<'_, Result<AddressDetails, GeoError>> {
        async move {
            let reply = self.lookup(c).await?;
            let details: AddressDetails = reply
                .address
                .into_iter()
                .filter_map(|(k, v)| match v {
                    serde_json::Value::String(s) => Some((k, s)),
                    _ => None,
                })
                .collect();
            if details.is_empty() {
                return Err(GeoError::NoResult { provider: PROVIDER });
            }
            Ok(details)
        }
        .boxed()
    }
}
