//! Secondary provider: Photon `/reverse` (GeoJSON).

use super::{fetch_json, ReverseGeocoder};
use crate::config::ForensicsConfig;
use crate::error::GeoError;
use crate::output::Coordinates;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const PROVIDER: &str = "photon";

/// Languages Photon localises into; anything else gets `default`.
const LANGUAGES: &[&str] = &["en", "de", "fr", "it"];

/// Property order used to assemble a one-line address.
const ADDRESS_PARTS: &[&str] = &[
    "name",
    "housenumber",
    "street",
    "postcode",
    "city",
    "state",
    "country",
];

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: HashMap<String, serde_json::Value>,
}

pub struct Photon {
    client: reqwest::Client,
    base_url: String,
    language: String,
    timeout: Duration,
}

impl Photon {
    pub fn new(client: reqwest::Client, config: &ForensicsConfig) -> Self {
        let language = if LANGUAGES.contains(&config.language.as_str()) {
            config.language.clone()
        } else {
            "default".to_string()
        };
        Self {
            client,
            base_url: config.photon_url.clone(),
            language,
            timeout: config.secondary_timeout(),
        }
    }
}

impl ReverseGeocoder for Photon {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn reverse(&self, c: Coordinates) -> BoxFuture<'_, Result<String, GeoError>> {
        async move {
            let request = self
                .client
                .get(format!("{}/reverse", self.base_url))
                .query(&[
                    ("lat", c.lat.to_string()),
                    ("lon", c.lon.to_string()),
                    ("lang", self.language.clone()),
                    ("limit", "1".to_string()),
                ]);
            let reply: Reply = fetch_json(PROVIDER, request, self.timeout).await?;
            reply
                .features
                .first()
                .and_then(format_address)
                .ok_or(GeoError::NoResult { provider: PROVIDER })
        }
        .boxed()
    }
}

fn format_address(feature: &Feature) -> Option<String> {
    let parts: Vec<&str> = ADDRESS_PARTS
        .iter()
        .filter_map(|k| feature.properties.get(*k).and_then(|v| v.as_str()))
        .filter(|s| !s.trim().is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
