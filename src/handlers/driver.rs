use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{parse_date, parse_time, parse_timestamp, parse_utc_offset};
use crate::engine::{AddressInput, BookingResponse, TripDetails, WeekdayMask};
use crate::entities::booking;
use crate::entities::trip::{self, TripStatus};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProposeTripRequest {
    pub departure: AddressInput,
    pub arrival: AddressInput,
    pub total_passenger_count: i32,
    pub timestamp_proposed: Option<String>,
}

/// Propose a single trip
pub async fn propose_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ProposeTripRequest>,
) -> AppResult<(StatusCode, Json<trip::Model>)> {
    let timestamp = parse_timestamp(payload.timestamp_proposed.as_deref())?;
    let departure = state.addresses.resolve(&payload.departure).await?;
    let arrival = state.addresses.resolve(&payload.arrival).await?;

    let trip = state
        .trips
        .propose_trip(
            claims.sub,
            departure,
            arrival,
            payload.total_passenger_count,
            timestamp,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(trip)))
}

#[derive(Debug, Deserialize)]
pub struct RecurringTripsRequest {
    pub departure: AddressInput,
    pub arrival: AddressInput,
    pub total_passenger_count: i32,
    pub date_start: String,
    pub date_end: String,
    pub time_of_day: String,
    /// Offset the dates and `time_of_day` are local to, e.g. `-04:00`.
    #[serde(default)]
    pub utc_offset: Option<String>,
    pub weekdays: Vec<Weekday>,
}

/// Propose one trip per selected weekday over a date range
pub async fn create_recurring_trips(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<RecurringTripsRequest>,
) -> AppResult<(StatusCode, Json<Vec<trip::Model>>)> {
    let date_start = parse_date(&payload.date_start)?;
    let date_end = parse_date(&payload.date_end)?;
    let time_of_day = parse_time(&payload.time_of_day)?;
    let utc_offset = parse_utc_offset(payload.utc_offset.as_deref())?;
    if payload.weekdays.is_empty() {
        return Err(AppError::missing("WEEKDAYS_REQUIRED"));
    }

    let departure = state.addresses.resolve(&payload.departure).await?;
    let arrival = state.addresses.resolve(&payload.arrival).await?;

    let trips = state
        .trips
        .create_recurring_trips(
            claims.sub,
            departure,
            arrival,
            date_start,
            date_end,
            time_of_day,
            utc_offset,
            payload.total_passenger_count,
            WeekdayMask::from_days(&payload.weekdays),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(trips)))
}

/// List trips proposed by the logged-in driver
pub async fn my_trips(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<TripDetails>>> {
    Ok(Json(state.trips.list_driver_trips(claims.sub).await?))
}

#[derive(Debug, Serialize)]
pub struct PassengerInfo {
    pub booking_id: Uuid,
    pub rider_id: Uuid,
    pub passenger_count: i32,
    pub status: booking::BookingStatus,
    pub joined: bool,
}

/// Bookings on one of the driver's trips
pub async fn trip_passengers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<Vec<PassengerInfo>>> {
    let passengers = state
        .trips
        .trip_passengers(trip_id, claims.sub)
        .await?
        .into_iter()
        .map(|b| PassengerInfo {
            booking_id: b.id,
            rider_id: b.user_id,
            passenger_count: b.passenger_count,
            status: b.accepted,
            joined: b.joined,
        })
        .collect();

    Ok(Json(passengers))
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: TripStatus,
}

/// Start, finish or cancel a trip
pub async fn change_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
    Json(payload): Json<ChangeStatusRequest>,
) -> AppResult<Json<trip::Model>> {
    let trip = state
        .trips
        .change_status(trip_id, claims.sub, payload.status)
        .await?;
    Ok(Json(trip))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSeatsRequest {
    pub total_passenger_count: i32,
}

pub async fn update_seats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
    Json(payload): Json<UpdateSeatsRequest>,
) -> AppResult<Json<trip::Model>> {
    let trip = state
        .trips
        .update_total_passenger_count(trip_id, claims.sub, payload.total_passenger_count)
        .await?;
    Ok(Json(trip))
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub timestamp_proposed: Option<String>,
}

pub async fn reschedule(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
    Json(payload): Json<RescheduleRequest>,
) -> AppResult<Json<trip::Model>> {
    let timestamp = parse_timestamp(payload.timestamp_proposed.as_deref())?;
    let trip = state.trips.reschedule(trip_id, claims.sub, timestamp).await?;
    Ok(Json(trip))
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub response: BookingResponse,
}

/// Accept or reject a rider's request
pub async fn respond_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((trip_id, rider_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<RespondRequest>,
) -> AppResult<Json<booking::Model>> {
    let booking = state
        .bookings
        .respond_booking(trip_id, claims.sub, rider_id, payload.response)
        .await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub verification_code: Option<String>,
}

/// Confirm a rider is on board with the code they show the driver
pub async fn join(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((trip_id, rider_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<JoinRequest>,
) -> AppResult<Json<booking::Model>> {
    let code = payload
        .verification_code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::missing("VERIFICATION_CODE_REQUIRED"))?;

    let booking = state
        .bookings
        .join(trip_id, claims.sub, rider_id, &code)
        .await?;
    Ok(Json(booking))
}
