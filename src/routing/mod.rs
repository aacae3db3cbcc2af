//! Driving routes and geocoding.
//!
//! Two interchangeable routing backends sit behind [`RouteProvider`]: the
//! Google Maps Directions API and an OSRM server over OpenStreetMap data.
//! Which one is used is decided once, from configuration, at startup.

pub mod geocoding;
pub mod google;
pub mod osrm;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{RouteBackend, RoutingConfig};
use crate::error::AppError;
use crate::utils::geo::GeoPoint;

pub use geocoding::{Geocoder, GeocodingError, NominatimGeocoder};
pub use google::GoogleMapsRouter;
pub use osrm::OsrmRouter;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Routing connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Routing request timed out")]
    Timeout,

    #[error("Routing request failed: {0}")]
    RequestFailed(String),

    #[error("Routing parse error: {0}")]
    ParseError(String),

    #[error("No route between the requested points")]
    NoRoute,

    #[error("Routing response is missing data: {0}")]
    MissingRouteData(String),
}

impl From<reqwest::Error> for RouteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RouteError::Timeout
        } else if err.is_decode() {
            RouteError::ParseError(err.to_string())
        } else {
            RouteError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<RouteError> for AppError {
    fn from(err: RouteError) -> Self {
        tracing::warn!(error = %err, "route provider failure");
        AppError::ExternalUnavailable("ROUTE_UNAVAILABLE".to_string())
    }
}

/// One leg of a driving route, between two consecutive points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteLeg {
    pub duration_seconds: f64,
    pub distance_meters: f64,
}

/// Which leg of a detour the rider actually rides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiderLeg {
    /// The rider boards at the trip origin and leaves at the waypoint.
    OriginToWaypoint,
    /// The rider boards at the waypoint and rides to the trip destination.
    WaypointToDestination,
}

/// Outcome of inserting a waypoint into a driver's route. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEvaluation {
    pub viable: bool,
    pub added_duration_seconds: i64,
    pub leg_distance_km: f64,
}

#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Driving route visiting `points` in order; one leg per consecutive pair.
    async fn directions(
        &self,
        points: &[GeoPoint],
        departure: Option<DateTime<Utc>>,
    ) -> Result<Vec<RouteLeg>, RouteError>;

    /// Point-to-point driving distance in kilometers.
    async fn distance_km(&self, origin: GeoPoint, destination: GeoPoint) -> Result<f64, RouteError> {
        let legs = self.directions(&[origin, destination], None).await?;
        let first = legs
            .first()
            .ok_or_else(|| RouteError::MissingRouteData("no legs".to_string()))?;
        Ok(first.distance_meters / 1000.0)
    }

    /// Whether routing `origin -> waypoint -> destination` adds at most
    /// `tolerance_minutes` over the direct `origin -> destination` route.
    async fn evaluate_detour(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        waypoint: GeoPoint,
        tolerance_minutes: u32,
        rider_leg: RiderLeg,
        departure: Option<DateTime<Utc>>,
    ) -> Result<RouteEvaluation, RouteError> {
        let baseline = self.directions(&[origin, destination], departure).await?;
        let detour = self
            .directions(&[origin, waypoint, destination], departure)
            .await?;

        let [to_waypoint, from_waypoint] = detour.as_slice() else {
            return Err(RouteError::MissingRouteData(format!(
                "expected 2 detour legs, got {}",
                detour.len()
            )));
        };
        let baseline_seconds: f64 = baseline.iter().map(|l| l.duration_seconds).sum();
        let added = (to_waypoint.duration_seconds + from_waypoint.duration_seconds - baseline_seconds)
            .round() as i64;

        let leg = match rider_leg {
            RiderLeg::OriginToWaypoint => to_waypoint,
            RiderLeg::WaypointToDestination => from_waypoint,
        };

        Ok(RouteEvaluation {
            viable: added <= i64::from(tolerance_minutes) * 60,
            added_duration_seconds: added,
            leg_distance_km: leg.distance_meters / 1000.0,
        })
    }
}

/// Build the backend named in configuration.
pub fn build_route_provider(
    config: &RoutingConfig,
    timeout: Duration,
) -> Result<Arc<dyn RouteProvider>, RouteError> {
    let provider: Arc<dyn RouteProvider> = match &config.backend {
        RouteBackend::Google { api_key } => Arc::new(GoogleMapsRouter::new(
            &config.google_base_url,
            api_key,
            timeout,
        )?),
        RouteBackend::Osm { base_url } => Arc::new(OsrmRouter::new(base_url, timeout)?),
    };
    Ok(provider)
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, RouteError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("campus-carpool/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RouteError::ConnectionFailed(e.to_string()))
}
