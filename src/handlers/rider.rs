use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_timestamp;
use crate::engine::{AddressInput, TripDetails, TripSummary};
use crate::entities::booking;
use crate::error::AppResult;
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchTripsRequest {
    pub departure: AddressInput,
    pub arrival: AddressInput,
    pub passenger_count: i32,
    pub desired_time: Option<String>,
}

/// Trips that can pick the rider up within the detour tolerance
pub async fn search_trips(
    State(state): State<AppState>,
    Json(payload): Json<SearchTripsRequest>,
) -> AppResult<Json<Vec<TripSummary>>> {
    let desired_time = parse_timestamp(payload.desired_time.as_deref())?;
    let departure = state.addresses.resolve(&payload.departure).await?;
    let arrival = state.addresses.resolve(&payload.arrival).await?;

    let matches = state
        .trips
        .find_matching_trips(departure, arrival, payload.passenger_count, desired_time)
        .await?;
    Ok(Json(matches))
}

pub async fn get_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<TripDetails>> {
    Ok(Json(state.trips.get_trip(trip_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct BookTripRequest {
    pub passenger_count: i32,
}

/// Ask the driver for seats on a trip
pub async fn book_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
    Json(payload): Json<BookTripRequest>,
) -> AppResult<(StatusCode, Json<booking::Model>)> {
    let booking = state
        .bookings
        .book_trip(trip_id, claims.sub, payload.passenger_count)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<booking::Model>> {
    Ok(Json(state.bookings.cancel_booking(claims.sub, trip_id).await?))
}

#[derive(Debug, Serialize)]
pub struct VerificationCodeResponse {
    pub trip_id: Uuid,
    pub verification_code: String,
}

pub async fn verification_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<VerificationCodeResponse>> {
    let code = state
        .bookings
        .get_verification_code(trip_id, claims.sub)
        .await?;
    Ok(Json(VerificationCodeResponse {
        trip_id,
        verification_code: code,
    }))
}

/// Bookings made by the logged-in rider
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<booking::Model>>> {
    Ok(Json(state.bookings.list_rider_bookings(claims.sub).await?))
}
