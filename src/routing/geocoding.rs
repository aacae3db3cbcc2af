//! Nominatim geocoding client
//!
//! Resolves a postal address to coordinates with a single-result query
//! against the [Nominatim](https://nominatim.openstreetmap.org) API.
//! Requests are spaced at least 1.1s apart per the Nominatim usage policy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::error::AppError;
use crate::utils::geo::GeoPoint;

const MIN_REQUEST_SPACING: Duration = Duration::from_millis(1100);

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("Geocoding connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Geocoding request failed: {0}")]
    RequestFailed(String),

    #[error("Geocoding parse error: {0}")]
    ParseError(String),

    /// The provider returned zero results.
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    #[error("Geocoding request timed out")]
    Timeout,
}

impl From<GeocodingError> for AppError {
    fn from(err: GeocodingError) -> Self {
        match err {
            GeocodingError::AddressNotFound(_) => AppError::invalid("INVALID_ADDRESS"),
            other => {
                tracing::warn!(error = %other, "geocoding provider failure");
                AppError::ExternalUnavailable("GEOCODING_UNAVAILABLE".to_string())
            }
        }
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best single match for a free-form address.
    async fn geocode(&self, address: &str) -> Result<GeoPoint, GeocodingError>;
}

#[derive(Debug)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    country_filter: String,
    last_request: Arc<Mutex<Instant>>,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, country_filter: &str, timeout: Duration) -> Result<Self, GeocodingError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("campus-carpool/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeocodingError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            country_filter: country_filter.to_string(),
            last_request: Arc::new(Mutex::new(Instant::now() - MIN_REQUEST_SPACING)),
        })
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        if elapsed < MIN_REQUEST_SPACING {
            let wait = MIN_REQUEST_SPACING.saturating_sub(elapsed);
            debug!(?wait, "Rate limiting geocoding request");
            tokio::time::sleep(wait).await;
        }
        *last = Instant::now();
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[instrument(skip(self))]
    async fn geocode(&self, address: &str) -> Result<GeoPoint, GeocodingError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(GeocodingError::AddressNotFound(
                "Address must not be empty".to_string(),
            ));
        }

        self.rate_limit().await;

        let url = format!("{}/search", self.base_url);
        let mut params = vec![
            ("q", address.to_string()),
            ("format", "jsonv2".to_string()),
            ("limit", "1".to_string()),
        ];
        if !self.country_filter.is_empty() {
            params.push(("countrycodes", self.country_filter.clone()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodingError::Timeout
                } else {
                    GeocodingError::ConnectionFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(GeocodingError::RequestFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let results: Vec<NominatimResult> = response
            .json()
            .await
            .map_err(|e| GeocodingError::ParseError(e.to_string()))?;

        let point = results
            .first()
            .ok_or_else(|| GeocodingError::AddressNotFound(address.to_string()))?
            .to_point()?;

        debug!(%address, lat = point.lat, lon = point.lon, "Geocoded address");
        Ok(point)
    }
}

/// Raw Nominatim API response
#[derive(Debug, Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
}

impl NominatimResult {
    fn to_point(&self) -> Result<GeoPoint, GeocodingError> {
        let lat: f64 = self
            .lat
            .parse()
            .map_err(|_| GeocodingError::ParseError("Invalid latitude".to_string()))?;
        let lon: f64 = self
            .lon
            .parse()
            .map_err(|_| GeocodingError::ParseError("Invalid longitude".to_string()))?;
        GeoPoint::new(lat, lon)
            .ok_or_else(|| GeocodingError::ParseError(format!("coordinates out of range: {lat},{lon}")))
    }
}
