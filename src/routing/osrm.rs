//! OSRM backend over OpenStreetMap data.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{http_client, RouteError, RouteLeg, RouteProvider};
use crate::utils::geo::GeoPoint;

#[derive(Debug, Clone)]
pub struct OsrmRouter {
    client: Client,
    base_url: String,
}

impl OsrmRouter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RouteError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RouteProvider for OsrmRouter {
    /// OSRM has no traffic model, so `departure` is ignored.
    #[instrument(skip(self))]
    async fn directions(
        &self,
        points: &[GeoPoint],
        _departure: Option<DateTime<Utc>>,
    ) -> Result<Vec<RouteLeg>, RouteError> {
        if points.len() < 2 {
            return Err(RouteError::RequestFailed(
                "at least two points are required".to_string(),
            ));
        }

        let coordinates: Vec<String> = points.iter().map(GeoPoint::lon_lat).collect();
        let url = format!(
            "{}/route/v1/driving/{}",
            self.base_url,
            coordinates.join(";")
        );

        let response = self
            .client
            .get(&url)
            .query(&[("overview", "false")])
            .send()
            .await?;

        // OSRM answers 400 with a JSON body for unroutable input.
        let status = response.status();
        if status.is_server_error() {
            return Err(RouteError::RequestFailed(format!("HTTP {status}")));
        }

        let body: OsrmResponse = response.json().await?;
        let legs = body.into_legs(points.len() - 1)?;
        debug!(legs = legs.len(), "OSRM route resolved");
        Ok(legs)
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    distance: f64,
    duration: f64,
}

impl OsrmResponse {
    fn into_legs(self, expected: usize) -> Result<Vec<RouteLeg>, RouteError> {
        match self.code.as_str() {
            "Ok" => {}
            "NoRoute" | "NoSegment" => return Err(RouteError::NoRoute),
            other => {
                return Err(RouteError::RequestFailed(format!(
                    "{other}: {}",
                    self.message.unwrap_or_default()
                )));
            }
        }

        let route = self
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| RouteError::MissingRouteData("no routes".to_string()))?;

        if route.legs.len() != expected {
            return Err(RouteError::MissingRouteData(format!(
                "expected {expected} legs, got {}",
                route.legs.len()
            )));
        }

        Ok(route
            .legs
            .into_iter()
            .map(|leg| RouteLeg {
                duration_seconds: leg.duration,
                distance_meters: leg.distance,
            })
            .collect())
    }
}
