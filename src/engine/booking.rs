use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notify::{dispatch, Notification, Notifier};
use super::{lock_trip, seats_in};
use crate::config::EngineConfig;
use crate::entities::booking::{self, BookingStatus};
use crate::entities::trip::{self, TripStatus};
use crate::error::{AppError, AppResult};

/// A driver's answer to a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingResponse {
    Accept,
    Reject,
}

impl BookingResponse {
    fn status(self) -> BookingStatus {
        match self {
            BookingResponse::Accept => BookingStatus::Accepted,
            BookingResponse::Reject => BookingStatus::Rejected,
        }
    }
}

/// Four digits, never starting with zero.
fn generate_verification_code() -> String {
    rand::thread_rng().gen_range(1000..=9999).to_string()
}

#[derive(Clone)]
pub struct BookingEngine {
    db: DatabaseConnection,
    config: Arc<EngineConfig>,
    notifier: Arc<dyn Notifier>,
}

impl BookingEngine {
    pub fn new(db: DatabaseConnection, config: Arc<EngineConfig>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            config,
            notifier,
        }
    }

    /// Request `passenger_count` seats on a trip.
    ///
    /// The trip row stays locked from the capacity read to the insert, so
    /// two concurrent requests can never both claim the last seats.
    pub async fn book_trip(
        &self,
        trip_id: Uuid,
        rider_id: Uuid,
        passenger_count: i32,
    ) -> AppResult<booking::Model> {
        if passenger_count <= 0 {
            return Err(AppError::invalid("PASSENGER_COUNT_TOO_LOW"));
        }

        let txn = self.db.begin().await?;
        let trip = lock_trip(&txn, trip_id).await?;

        if trip.status != TripStatus::Pending || trip.timestamp_proposed <= Utc::now() {
            return Err(AppError::forbidden("TRIP_NOT_AVAILABLE"));
        }
        if trip.driver_id == rider_id {
            return Err(AppError::forbidden("DRIVER_CANNOT_BOOK_HIS_OWN_TRIP"));
        }

        let previous = booking::Entity::find()
            .filter(booking::Column::TripId.eq(trip_id))
            .filter(booking::Column::UserId.eq(rider_id))
            .all(&txn)
            .await?;
        if previous.iter().any(|b| b.accepted.is_active()) {
            return Err(AppError::conflict("TRIP_ALREADY_BOOKED"));
        }
        if previous.len() as u64 >= self.config.max_booking_attempts {
            return Err(AppError::forbidden("TOO_MANY_BOOKING_ATTEMPTS"));
        }

        let reserved = seats_in(&txn, trip_id, &BookingStatus::ACTIVE).await?;
        if passenger_count > trip.total_passenger_count - reserved {
            return Err(AppError::invalid("PASSENGER_COUNT_TOO_HIGH"));
        }

        let new_booking = booking::ActiveModel {
            id: Set(Uuid::new_v4()),
            trip_id: Set(trip_id),
            user_id: Set(rider_id),
            passenger_count: Set(passenger_count),
            accepted: Set(BookingStatus::Requested),
            verification_code: Set(None),
            joined: Set(false),
            code_attempts: Set(0),
            date_requested: Set(Utc::now()),
        };
        let booking = new_booking.insert(&txn).await?;
        txn.commit().await?;

        tracing::info!(
            trip_id = %trip_id,
            rider_id = %rider_id,
            passenger_count,
            "Booking requested"
        );
        Ok(booking)
    }

    /// Accept or reject a Requested booking. Driver only.
    pub async fn respond_booking(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
        rider_id: Uuid,
        response: BookingResponse,
    ) -> AppResult<booking::Model> {
        let txn = self.db.begin().await?;
        let trip = lock_trip(&txn, trip_id).await?;

        if trip.driver_id != driver_id {
            return Err(AppError::forbidden("NOT_TRIP_DRIVER"));
        }
        if trip.status != TripStatus::Pending {
            return Err(AppError::forbidden("TRIP_NOT_AVAILABLE"));
        }

        let booking = latest_booking(&txn, trip_id, rider_id)
            .await?
            .ok_or_else(|| AppError::not_found("BOOKING_NOT_FOUND"))?;
        if booking.accepted != BookingStatus::Requested {
            return Err(AppError::conflict("BOOKING_ALREADY_RESPONDED"));
        }

        let mut active: booking::ActiveModel = booking.clone().into();
        active.accepted = Set(response.status());

        if response == BookingResponse::Accept {
            // Seats may have been taken since the request was made.
            let accepted = seats_in(&txn, trip_id, &[BookingStatus::Accepted]).await?;
            let accepted_after = accepted + booking.passenger_count;
            if accepted_after > trip.total_passenger_count {
                return Err(AppError::invalid("PASSENGER_COUNT_TOO_HIGH"));
            }
            active.verification_code = Set(Some(generate_verification_code()));
        }

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        tracing::info!(
            trip_id = %trip_id,
            rider_id = %rider_id,
            status = ?updated.accepted,
            "Booking responded"
        );
        dispatch(
            &self.notifier,
            Notification::BookingResponded {
                trip_id,
                rider_id,
                status: updated.accepted,
            },
        );
        Ok(updated)
    }

    /// The rider's boarding code, available once the trip is under way.
    pub async fn get_verification_code(&self, trip_id: Uuid, rider_id: Uuid) -> AppResult<String> {
        let trip = trip::Entity::find_by_id(trip_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("TRIP_NOT_FOUND"))?;

        if trip.status != TripStatus::OnCourse {
            return Err(AppError::forbidden("TRIP_NOT_ON_COURSE"));
        }

        let booking = latest_booking(&self.db, trip_id, rider_id)
            .await?
            .filter(|b| b.accepted == BookingStatus::Accepted)
            .ok_or_else(|| AppError::forbidden("BOOKING_NOT_ACCEPTED"))?;

        booking
            .verification_code
            .ok_or_else(|| AppError::Internal(format!("accepted booking {} has no code", booking.id)))
    }

    /// Mark the rider as on board once the driver enters the right code.
    /// Wrong codes are counted; past the limit the booking can no longer join.
    pub async fn join(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
        rider_id: Uuid,
        supplied_code: &str,
    ) -> AppResult<booking::Model> {
        let txn = self.db.begin().await?;
        let trip = lock_trip(&txn, trip_id).await?;

        if trip.driver_id != driver_id {
            return Err(AppError::forbidden("NOT_TRIP_DRIVER"));
        }
        if trip.status != TripStatus::OnCourse {
            return Err(AppError::forbidden("TRIP_NOT_ON_COURSE"));
        }

        let booking = latest_booking(&txn, trip_id, rider_id)
            .await?
            .filter(|b| b.accepted == BookingStatus::Accepted)
            .ok_or_else(|| AppError::forbidden("BOOKING_NOT_ACCEPTED"))?;
        if booking.joined {
            return Err(AppError::conflict("ALREADY_JOINED"));
        }
        if booking.code_attempts >= self.config.max_code_attempts {
            return Err(AppError::forbidden("TOO_MANY_VERIFICATION_ATTEMPTS"));
        }

        let matches = booking.verification_code.as_deref() == Some(supplied_code.trim());
        let attempts = booking.code_attempts;
        let mut active: booking::ActiveModel = booking.into();

        if !matches {
            active.code_attempts = Set(attempts + 1);
            active.update(&txn).await?;
            txn.commit().await?;
            tracing::warn!(trip_id = %trip_id, rider_id = %rider_id, attempts = attempts + 1, "Wrong verification code");
            return Err(AppError::forbidden("INVALID_VERIFICATION_CODE"));
        }

        active.joined = Set(true);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        tracing::info!(trip_id = %trip_id, rider_id = %rider_id, "Rider boarded");
        Ok(updated)
    }

    /// Withdraw the rider's active booking, releasing its seats.
    pub async fn cancel_booking(&self, rider_id: Uuid, trip_id: Uuid) -> AppResult<booking::Model> {
        let txn = self.db.begin().await?;
        lock_trip(&txn, trip_id).await?;

        let booking = latest_booking(&txn, trip_id, rider_id)
            .await?
            .filter(|b| b.accepted.is_active())
            .ok_or_else(|| AppError::not_found("BOOKING_NOT_FOUND"))?;
        if booking.joined {
            return Err(AppError::forbidden("ALREADY_JOINED"));
        }

        let mut active: booking::ActiveModel = booking.into();
        active.accepted = Set(BookingStatus::Cancelled);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        tracing::info!(trip_id = %trip_id, rider_id = %rider_id, "Booking cancelled");
        Ok(updated)
    }

    /// Every booking the rider has made, newest first.
    pub async fn list_rider_bookings(&self, rider_id: Uuid) -> AppResult<Vec<booking::Model>> {
        Ok(booking::Entity::find()
            .filter(booking::Column::UserId.eq(rider_id))
            .order_by_desc(booking::Column::DateRequested)
            .all(&self.db)
            .await?)
    }
}

/// The rider's most recent booking on the trip. Earlier ones are all
/// Rejected or Cancelled.
async fn latest_booking<C: ConnectionTrait>(
    conn: &C,
    trip_id: Uuid,
    rider_id: Uuid,
) -> AppResult<Option<booking::Model>> {
    Ok(booking::Entity::find()
        .filter(booking::Column::TripId.eq(trip_id))
        .filter(booking::Column::UserId.eq(rider_id))
        .order_by_desc(booking::Column::DateRequested)
        .one(conn)
        .await?)
}
