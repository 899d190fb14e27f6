//! Geolocation providers.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use signlens_types::{GeoContext, LocationError};

use crate::types::GeoProvider;

/// Coordinates known up front (config file or command line).
pub struct StaticGeoProvider {
    latitude: f64,
    longitude: f64,
}

impl StaticGeoProvider {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[async_trait]
impl GeoProvider for StaticGeoProvider {
    async fn current_position(&self) -> GeoContext {
        GeoContext::Position {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Location access turned off by the user.
pub struct DeniedGeoProvider;

#[async_trait]
impl GeoProvider for DeniedGeoProvider {
    async fn current_position(&self) -> GeoContext {
        GeoContext::Failed(LocationError::PermissionDenied)
    }
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Approximate position from an IP geolocation service.
pub struct IpGeoProvider {
    url: String,
    client: reqwest::Client,
}

impl IpGeoProvider {
    pub fn new(url: impl Into<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    async fn lookup(&self) -> Result<(f64, f64), String> {
        let resp = self
            .client
            .get(&self.url)
            .header("User-Agent", "signlens/0.1")
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let body: IpLookupResponse = resp.json().await.map_err(|e| e.to_string())?;
        parse_lookup(body)
    }
}

fn parse_lookup(body: IpLookupResponse) -> Result<(f64, f64), String> {
    if body.status.as_deref().is_some_and(|s| s != "success") {
        return Err(body.message.unwrap_or_else(|| "lookup failed".into()));
    }
    body.lat
        .zip(body.lon)
        .ok_or_else(|| "response has no coordinates".to_string())
}

#[async_trait]
impl GeoProvider for IpGeoProvider {
    async fn current_position(&self) -> GeoContext {
        match self.lookup().await {
            Ok((latitude, longitude)) => {
                debug!(latitude, longitude, "IP geolocation resolved");
                GeoContext::Position {
                    latitude,
                    longitude,
                }
            }
            Err(e) => {
                warn!("IP geolocation failed: {e}");
                GeoContext::Failed(LocationError::Unavailable(e))
            }
        }
    }
}
