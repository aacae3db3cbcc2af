//! Google Maps Directions API backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{http_client, RouteError, RouteLeg, RouteProvider};
use crate::utils::geo::GeoPoint;

#[derive(Debug, Clone)]
pub struct GoogleMapsRouter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GoogleMapsRouter {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, RouteError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl RouteProvider for GoogleMapsRouter {
    #[instrument(skip(self))]
    async fn directions(
        &self,
        points: &[GeoPoint],
        departure: Option<DateTime<Utc>>,
    ) -> Result<Vec<RouteLeg>, RouteError> {
        let [origin, via @ .., destination] = points else {
            return Err(RouteError::RequestFailed(
                "at least two points are required".to_string(),
            ));
        };

        let mut params = vec![
            ("origin", origin.lat_lon()),
            ("destination", destination.lat_lon()),
            ("mode", "driving".to_string()),
            ("key", self.api_key.clone()),
        ];
        if !via.is_empty() {
            let waypoints: Vec<String> = via.iter().map(GeoPoint::lat_lon).collect();
            params.push(("waypoints", waypoints.join("|")));
        }
        // Google rejects departure times in the past.
        if let Some(at) = departure.filter(|at| *at > Utc::now()) {
            params.push(("departure_time", at.timestamp().to_string()));
        }

        let url = format!("{}/maps/api/directions/json", self.base_url);
        let response = self.client.get(&url).query(&params).send().await?;

        if !response.status().is_success() {
            return Err(RouteError::RequestFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: DirectionsResponse = response.json().await?;
        let legs = body.into_legs()?;
        debug!(legs = legs.len(), "Google directions resolved");
        Ok(legs)
    }
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    legs: Vec<DirectionsLeg>,
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    distance: ValueField,
    duration: ValueField,
    duration_in_traffic: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct ValueField {
    value: f64,
}

impl DirectionsResponse {
    fn into_legs(self) -> Result<Vec<RouteLeg>, RouteError> {
        match self.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" | "NOT_FOUND" => return Err(RouteError::NoRoute),
            other => {
                return Err(RouteError::RequestFailed(format!(
                    "{other}: {}",
                    self.error_message.unwrap_or_default()
                )));
            }
        }

        let route = self
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| RouteError::MissingRouteData("no routes".to_string()))?;

        Ok(route
            .legs
            .into_iter()
            .map(|leg| RouteLeg {
                duration_seconds: leg.duration_in_traffic.unwrap_or(leg.duration).value,
                distance_meters: leg.distance.value,
            })
            .collect())
    }
}
