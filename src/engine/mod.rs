//! Trip matching, booking and fare engine.
//!
//! Nothing here knows about HTTP. Every operation takes typed arguments and
//! returns an [`AppResult`](crate::error::AppResult).

pub mod address;
pub mod booking;
pub mod fare;
pub mod notify;
pub mod trip;

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::config::FareConfig;
use crate::entities::booking::{self as booking_entity, BookingStatus};
use crate::entities::trip as trip_entity;
use crate::error::{AppError, AppResult};

pub use address::{AddressInput, AddressStore};
pub use booking::{BookingEngine, BookingResponse};
pub use notify::{LogNotifier, Notification, Notifier, WebhookNotifier};
pub use trip::{TripDetails, TripEngine, TripSummary, WeekdayMask};

/// Load a trip and hold its row lock until the surrounding transaction ends.
async fn lock_trip<C: ConnectionTrait>(conn: &C, trip_id: Uuid) -> AppResult<trip_entity::Model> {
    trip_entity::Entity::find_by_id(trip_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("TRIP_NOT_FOUND"))
}

/// Seats held by the trip's bookings in any of `statuses`.
async fn seats_in<C: ConnectionTrait>(
    conn: &C,
    trip_id: Uuid,
    statuses: &[BookingStatus],
) -> AppResult<i32> {
    let seats = booking_entity::Entity::find()
        .filter(booking_entity::Column::TripId.eq(trip_id))
        .filter(booking_entity::Column::Accepted.is_in(statuses.iter().copied()))
        .all(conn)
        .await?
        .iter()
        .map(|b| b.passenger_count)
        .sum();
    Ok(seats)
}

/// Stored per-passenger price: the point-to-point distance split across
/// the seats the driver offers. Accepting riders never moves it.
fn trip_price(trip: &trip_entity::Model, fare: &FareConfig) -> f64 {
    fare::price(trip.distance_km, trip.total_passenger_count, fare)
}

fn ensure_future(timestamp: DateTime<Utc>) -> AppResult<()> {
    if timestamp <= Utc::now() {
        return Err(AppError::invalid("TIMESTAMP_NOT_IN_FUTURE"));
    }
    Ok(())
}
