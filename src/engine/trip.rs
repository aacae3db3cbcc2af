use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use uuid::Uuid;

use super::address::AddressStore;
use super::notify::{dispatch, Notification, Notifier};
use super::{ensure_future, fare, lock_trip, seats_in, trip_price};
use crate::config::EngineConfig;
use crate::entities::booking::{self, BookingStatus};
use crate::entities::trip::{self, TripStatus};
use crate::error::{AppError, AppResult};
use crate::routing::{RiderLeg, RouteEvaluation, RouteProvider};
use crate::utils::geo::GeoPoint;

/// Half-width of the search band around a rider's desired time.
const MATCH_WINDOW_MINUTES: i64 = 60;
/// A trip may be started this long before or after its proposed time.
const START_WINDOW_MINUTES: i64 = 15;
const MAX_RECURRING_SPAN_DAYS: i64 = 366;

/// Days of the week as a bit set, bit 0 = Monday ... bit 6 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdayMask(pub u8);

impl WeekdayMask {
    pub fn from_days(days: &[Weekday]) -> Self {
        Self(
            days.iter()
                .fold(0, |mask, day| mask | (1 << day.num_days_from_monday())),
        )
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }
}

/// A viable match for a rider, as shown in search results.
#[derive(Debug, Clone, Serialize)]
pub struct TripSummary {
    pub trip_id: Uuid,
    pub driver_id: Uuid,
    pub departure_address_id: i32,
    pub arrival_address_id: i32,
    pub timestamp_proposed: DateTime<Utc>,
    pub total_passenger_count: i32,
    pub remaining_seats: i32,
    pub price: f64,
    /// Distance the rider spends in the car.
    pub rider_distance_km: f64,
    pub added_duration_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripDetails {
    #[serde(flatten)]
    pub trip: trip::Model,
    pub accepted_passenger_count: i32,
    pub remaining_seats: i32,
}

/// Which side of a rider's request touches the university.
struct UniversityLeg {
    /// The rider's other address, inserted into the driver's route.
    waypoint_address_id: i32,
    /// Trips must arrive at the university (otherwise: depart from it).
    inbound: bool,
}

#[derive(Clone)]
pub struct TripEngine {
    db: DatabaseConnection,
    config: Arc<EngineConfig>,
    addresses: AddressStore,
    routes: Arc<dyn RouteProvider>,
    notifier: Arc<dyn Notifier>,
}

impl TripEngine {
    pub fn new(
        db: DatabaseConnection,
        config: Arc<EngineConfig>,
        addresses: AddressStore,
        routes: Arc<dyn RouteProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            config,
            addresses,
            routes,
            notifier,
        }
    }

    /// Create a Pending trip priced on the point-to-point distance.
    pub async fn propose_trip(
        &self,
        driver_id: Uuid,
        departure_address_id: i32,
        arrival_address_id: i32,
        total_passenger_count: i32,
        timestamp_proposed: DateTime<Utc>,
    ) -> AppResult<trip::Model> {
        self.validate_seats(total_passenger_count)?;
        ensure_future(timestamp_proposed)?;
        self.university_leg(departure_address_id, arrival_address_id)?;

        if self
            .find_duplicate(
                &self.db,
                driver_id,
                departure_address_id,
                arrival_address_id,
                timestamp_proposed,
                total_passenger_count,
            )
            .await?
            .is_some()
        {
            return Err(AppError::conflict("TRIP_ALREADY_EXISTS"));
        }

        let distance_km = self
            .point_to_point_km(departure_address_id, arrival_address_id)
            .await?;

        let now = Utc::now();
        let new_trip = trip::ActiveModel {
            id: Set(Uuid::new_v4()),
            driver_id: Set(driver_id),
            departure_address_id: Set(departure_address_id),
            arrival_address_id: Set(arrival_address_id),
            total_passenger_count: Set(total_passenger_count),
            timestamp_proposed: Set(timestamp_proposed),
            status: Set(TripStatus::Pending),
            price: Set(fare::price(distance_km, total_passenger_count, &self.config.fare)),
            distance_km: Set(distance_km),
            created_at: Set(now),
        };

        let trip = new_trip.insert(&self.db).await?;
        tracing::info!(
            trip_id = %trip.id,
            driver_id = %driver_id,
            distance_km,
            price = trip.price,
            "Trip proposed"
        );
        Ok(trip)
    }

    /// Pending trips near `desired_time` that can absorb the rider's detour,
    /// ordered by added travel time.
    pub async fn find_matching_trips(
        &self,
        rider_departure_id: i32,
        rider_arrival_id: i32,
        passenger_count: i32,
        desired_time: DateTime<Utc>,
    ) -> AppResult<Vec<TripSummary>> {
        if passenger_count <= 0 {
            return Err(AppError::invalid("PASSENGER_COUNT_TOO_LOW"));
        }
        let leg = self.university_leg(rider_departure_id, rider_arrival_id)?;

        let university = self
            .addresses
            .coordinates(self.config.university_address_id)
            .await?;
        let waypoint = self.addresses.coordinates(leg.waypoint_address_id).await?;
        let university_ids = self.addresses.ids_at(university).await?;

        let window = Duration::minutes(MATCH_WINDOW_MINUTES);
        let endpoint = if leg.inbound {
            trip::Column::ArrivalAddressId
        } else {
            trip::Column::DepartureAddressId
        };
        let candidates = trip::Entity::find()
            .filter(trip::Column::Status.eq(TripStatus::Pending))
            .filter(endpoint.is_in(university_ids))
            .filter(trip::Column::TimestampProposed.gt(Utc::now()))
            .filter(
                trip::Column::TimestampProposed
                    .between(desired_time - window, desired_time + window),
            )
            .order_by_asc(trip::Column::TimestampProposed)
            .all(&self.db)
            .await?;

        let mut open = Vec::new();
        for candidate in candidates {
            let reserved = seats_in(&self.db, candidate.id, &BookingStatus::ACTIVE).await?;
            if candidate.total_passenger_count - reserved >= passenger_count {
                open.push((candidate, reserved));
            }
        }

        let rider_leg = if leg.inbound {
            RiderLeg::WaypointToDestination
        } else {
            RiderLeg::OriginToWaypoint
        };
        let evaluations = self.evaluate_candidates(&open, waypoint, rider_leg).await;

        let mut matches = Vec::new();
        for (candidate, reserved) in open {
            let Some(eval) = evaluations.get(&candidate.id).copied() else {
                continue;
            };
            if !eval.viable {
                continue;
            }

            let Some(price) = self.refresh_price(candidate.id).await? else {
                continue;
            };

            matches.push(TripSummary {
                trip_id: candidate.id,
                driver_id: candidate.driver_id,
                departure_address_id: candidate.departure_address_id,
                arrival_address_id: candidate.arrival_address_id,
                timestamp_proposed: candidate.timestamp_proposed,
                total_passenger_count: candidate.total_passenger_count,
                remaining_seats: candidate.total_passenger_count - reserved,
                price,
                rider_distance_km: eval.leg_distance_km,
                added_duration_seconds: eval.added_duration_seconds,
            });
        }

        matches.sort_by(|a, b| {
            a.added_duration_seconds
                .cmp(&b.added_duration_seconds)
                .then(a.price.total_cmp(&b.price))
                .then(a.timestamp_proposed.cmp(&b.timestamp_proposed))
                .then(a.trip_id.cmp(&b.trip_id))
        });

        tracing::info!(
            waypoint_address_id = leg.waypoint_address_id,
            matches = matches.len(),
            "Trip search finished"
        );
        Ok(matches)
    }

    /// Recompute a trip's stored price under its row lock. `None` once the
    /// trip is gone or no longer Pending.
    async fn refresh_price(&self, trip_id: Uuid) -> AppResult<Option<f64>> {
        let txn = self.db.begin().await?;
        let Some(trip) = trip::Entity::find_by_id(trip_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .filter(|t| t.status == TripStatus::Pending)
        else {
            return Ok(None);
        };
        let price = trip_price(&trip, &self.config.fare);

        if price != trip.price {
            let mut active: trip::ActiveModel = trip.into();
            active.price = Set(price);
            active.update(&txn).await?;
        }
        txn.commit().await?;
        Ok(Some(price))
    }

    /// Evaluate every candidate concurrently. A candidate whose evaluation
    /// fails or times out is simply absent from the result.
    async fn evaluate_candidates(
        &self,
        candidates: &[(trip::Model, i32)],
        waypoint: GeoPoint,
        rider_leg: RiderLeg,
    ) -> HashMap<Uuid, RouteEvaluation> {
        let mut tasks = JoinSet::new();

        for (candidate, _) in candidates {
            let (origin, destination) = match self.endpoints(candidate).await {
                Ok(points) => points,
                Err(e) => {
                    tracing::warn!(trip_id = %candidate.id, error = %e, "Skipping trip without coordinates");
                    continue;
                }
            };

            let routes = Arc::clone(&self.routes);
            let tolerance = self.config.detour_tolerance_minutes;
            // Two provider calls per evaluation.
            let budget = self.config.route_timeout * 2;
            let trip_id = candidate.id;
            let departure = candidate.timestamp_proposed;

            tasks.spawn(async move {
                let outcome = tokio::time::timeout(
                    budget,
                    routes.evaluate_detour(
                        origin,
                        destination,
                        waypoint,
                        tolerance,
                        rider_leg,
                        Some(departure),
                    ),
                )
                .await;
                (trip_id, outcome)
            });
        }

        let mut evaluations = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((trip_id, Ok(Ok(eval)))) => {
                    tracing::debug!(
                        %trip_id,
                        viable = eval.viable,
                        added_seconds = eval.added_duration_seconds,
                        "Detour evaluated"
                    );
                    evaluations.insert(trip_id, eval);
                }
                Ok((trip_id, Ok(Err(e)))) => {
                    tracing::warn!(%trip_id, error = %e, "Route unavailable, trip treated as not viable");
                }
                Ok((trip_id, Err(_))) => {
                    tracing::warn!(%trip_id, "Route evaluation timed out, trip treated as not viable");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Route evaluation task failed");
                }
            }
        }
        evaluations
    }

    /// One trip per matching weekday in `[date_start, date_end]`, inserted
    /// together or not at all. Dates and `time_of_day` are local to
    /// `utc_offset`.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_recurring_trips(
        &self,
        driver_id: Uuid,
        departure_address_id: i32,
        arrival_address_id: i32,
        date_start: NaiveDate,
        date_end: NaiveDate,
        time_of_day: NaiveTime,
        utc_offset: FixedOffset,
        total_passenger_count: i32,
        weekdays: WeekdayMask,
    ) -> AppResult<Vec<trip::Model>> {
        if date_start < Utc::now().with_timezone(&utc_offset).date_naive() {
            return Err(AppError::invalid("DATE_START_IN_PAST"));
        }
        if date_start > date_end {
            return Err(AppError::invalid("DATE_START_AFTER_DATE_END"));
        }
        if (date_end - date_start).num_days() > MAX_RECURRING_SPAN_DAYS {
            return Err(AppError::invalid("DATE_RANGE_TOO_LONG"));
        }
        self.validate_seats(total_passenger_count)?;
        self.university_leg(departure_address_id, arrival_address_id)?;

        let mut timestamps = Vec::new();
        for date in date_start.iter_days().take_while(|d| *d <= date_end) {
            if weekdays.contains(date.weekday()) {
                let timestamp = date
                    .and_time(time_of_day)
                    .and_local_timezone(utc_offset)
                    .single()
                    .ok_or_else(|| AppError::invalid("INVALID_TIME"))?
                    .with_timezone(&Utc);
                ensure_future(timestamp)?;
                timestamps.push(timestamp);
            }
        }
        if timestamps.is_empty() {
            return Err(AppError::invalid("NO_MATCHING_WEEKDAYS"));
        }

        let distance_km = self
            .point_to_point_km(departure_address_id, arrival_address_id)
            .await?;
        let price = fare::price(distance_km, total_passenger_count, &self.config.fare);
        let now = Utc::now();

        let txn = self.db.begin().await?;
        let mut trips = Vec::with_capacity(timestamps.len());
        for timestamp in timestamps {
            if self
                .find_duplicate(
                    &txn,
                    driver_id,
                    departure_address_id,
                    arrival_address_id,
                    timestamp,
                    total_passenger_count,
                )
                .await?
                .is_some()
            {
                return Err(AppError::conflict("TRIP_ALREADY_EXISTS"));
            }
            trips.push(trip::Model {
                id: Uuid::new_v4(),
                driver_id,
                departure_address_id,
                arrival_address_id,
                total_passenger_count,
                timestamp_proposed: timestamp,
                status: TripStatus::Pending,
                price,
                distance_km,
                created_at: now,
            });
        }

        trip::Entity::insert_many(trips.iter().cloned().map(trip::ActiveModel::from))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        tracing::info!(driver_id = %driver_id, count = trips.len(), "Recurring trips created");
        Ok(trips)
    }

    /// Move a trip along `Pending -> OnCourse -> Completed` or
    /// `Pending -> Canceled`. Only the driver may do this.
    pub async fn change_status(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
        new_status: TripStatus,
    ) -> AppResult<trip::Model> {
        let txn = self.db.begin().await?;
        let trip = lock_trip(&txn, trip_id).await?;

        if trip.driver_id != driver_id {
            return Err(AppError::forbidden("NOT_TRIP_DRIVER"));
        }
        if !trip.status.can_transition_to(new_status) {
            return Err(AppError::forbidden("INVALID_STATUS_TRANSITION"));
        }
        if new_status == TripStatus::OnCourse {
            let offset = Utc::now() - trip.timestamp_proposed;
            if offset.num_seconds().abs() > START_WINDOW_MINUTES * 60 {
                return Err(AppError::forbidden("OUTSIDE_START_WINDOW"));
            }
        }

        let mut released_riders = Vec::new();
        if new_status == TripStatus::Canceled {
            released_riders = booking::Entity::find()
                .filter(booking::Column::TripId.eq(trip_id))
                .filter(booking::Column::Accepted.is_in(BookingStatus::ACTIVE))
                .all(&txn)
                .await?
                .into_iter()
                .map(|b| b.user_id)
                .collect();

            booking::Entity::update_many()
                .col_expr(booking::Column::Accepted, Expr::value(BookingStatus::Cancelled))
                .filter(booking::Column::TripId.eq(trip_id))
                .filter(booking::Column::Accepted.is_in(BookingStatus::ACTIVE))
                .exec(&txn)
                .await?;
        }

        let previous = trip.status;
        let mut active: trip::ActiveModel = trip.into();
        active.status = Set(new_status);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        tracing::info!(
            trip_id = %trip_id,
            from = ?previous,
            to = ?new_status,
            "Trip status changed"
        );

        if new_status == TripStatus::Canceled {
            dispatch(
                &self.notifier,
                Notification::TripCanceled {
                    trip_id,
                    rider_ids: released_riders,
                },
            );
        }
        Ok(updated)
    }

    pub async fn get_trip(&self, trip_id: Uuid) -> AppResult<TripDetails> {
        let trip = trip::Entity::find_by_id(trip_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("TRIP_NOT_FOUND"))?;
        self.details(trip).await
    }

    /// Trips proposed by the driver, most recent departure first.
    pub async fn list_driver_trips(&self, driver_id: Uuid) -> AppResult<Vec<TripDetails>> {
        let trips = trip::Entity::find()
            .filter(trip::Column::DriverId.eq(driver_id))
            .order_by_desc(trip::Column::TimestampProposed)
            .all(&self.db)
            .await?;

        let mut details = Vec::with_capacity(trips.len());
        for trip in trips {
            details.push(self.details(trip).await?);
        }
        Ok(details)
    }

    /// Every booking ever made on the trip. Driver only.
    pub async fn trip_passengers(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
    ) -> AppResult<Vec<booking::Model>> {
        let trip = trip::Entity::find_by_id(trip_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("TRIP_NOT_FOUND"))?;

        if trip.driver_id != driver_id {
            return Err(AppError::forbidden("NOT_TRIP_DRIVER"));
        }

        Ok(booking::Entity::find()
            .filter(booking::Column::TripId.eq(trip_id))
            .order_by_asc(booking::Column::DateRequested)
            .all(&self.db)
            .await?)
    }

    /// Change the number of seats offered on a Pending trip.
    pub async fn update_total_passenger_count(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
        total_passenger_count: i32,
    ) -> AppResult<trip::Model> {
        self.validate_seats(total_passenger_count)?;

        let txn = self.db.begin().await?;
        let trip = self.lock_pending_owned(&txn, trip_id, driver_id).await?;

        let reserved = seats_in(&txn, trip_id, &BookingStatus::ACTIVE).await?;
        if total_passenger_count < reserved {
            return Err(AppError::invalid("PASSENGER_COUNT_BELOW_BOOKED"));
        }
        if let Some(other) = self
            .find_duplicate(
                &txn,
                driver_id,
                trip.departure_address_id,
                trip.arrival_address_id,
                trip.timestamp_proposed,
                total_passenger_count,
            )
            .await?
        {
            if other.id != trip_id {
                return Err(AppError::conflict("TRIP_ALREADY_EXISTS"));
            }
        }

        let mut repriced = trip.clone();
        repriced.total_passenger_count = total_passenger_count;
        let price = trip_price(&repriced, &self.config.fare);

        let mut active: trip::ActiveModel = trip.into();
        active.total_passenger_count = Set(total_passenger_count);
        active.price = Set(price);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        tracing::info!(trip_id = %trip_id, total_passenger_count, "Trip seats updated");
        Ok(updated)
    }

    /// Move a Pending trip with no accepted riders to another time.
    pub async fn reschedule(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
        timestamp_proposed: DateTime<Utc>,
    ) -> AppResult<trip::Model> {
        ensure_future(timestamp_proposed)?;

        let txn = self.db.begin().await?;
        let trip = self.lock_pending_owned(&txn, trip_id, driver_id).await?;

        if seats_in(&txn, trip_id, &[BookingStatus::Accepted]).await? > 0 {
            return Err(AppError::forbidden("TRIP_HAS_ACCEPTED_BOOKINGS"));
        }
        if self
            .find_duplicate(
                &txn,
                driver_id,
                trip.departure_address_id,
                trip.arrival_address_id,
                timestamp_proposed,
                trip.total_passenger_count,
            )
            .await?
            .is_some()
        {
            return Err(AppError::conflict("TRIP_ALREADY_EXISTS"));
        }

        let mut active: trip::ActiveModel = trip.into();
        active.timestamp_proposed = Set(timestamp_proposed);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        tracing::info!(trip_id = %trip_id, %timestamp_proposed, "Trip rescheduled");
        Ok(updated)
    }

    async fn lock_pending_owned<C: ConnectionTrait>(
        &self,
        conn: &C,
        trip_id: Uuid,
        driver_id: Uuid,
    ) -> AppResult<trip::Model> {
        let trip = lock_trip(conn, trip_id).await?;
        if trip.driver_id != driver_id {
            return Err(AppError::forbidden("NOT_TRIP_DRIVER"));
        }
        if trip.status != TripStatus::Pending {
            return Err(AppError::forbidden("TRIP_NOT_PENDING"));
        }
        Ok(trip)
    }

    async fn details(&self, trip: trip::Model) -> AppResult<TripDetails> {
        let accepted = seats_in(&self.db, trip.id, &[BookingStatus::Accepted]).await?;
        let reserved = seats_in(&self.db, trip.id, &BookingStatus::ACTIVE).await?;
        Ok(TripDetails {
            remaining_seats: trip.total_passenger_count - reserved,
            accepted_passenger_count: accepted,
            trip,
        })
    }

    async fn endpoints(&self, trip: &trip::Model) -> AppResult<(GeoPoint, GeoPoint)> {
        let origin = self.addresses.coordinates(trip.departure_address_id).await?;
        let destination = self.addresses.coordinates(trip.arrival_address_id).await?;
        Ok((origin, destination))
    }

    async fn point_to_point_km(&self, from: i32, to: i32) -> AppResult<f64> {
        let origin = self.addresses.coordinates(from).await?;
        let destination = self.addresses.coordinates(to).await?;

        let distance = tokio::time::timeout(
            self.config.route_timeout,
            self.routes.distance_km(origin, destination),
        )
        .await
        .map_err(|_| AppError::ExternalUnavailable("ROUTE_UNAVAILABLE".to_string()))??;
        Ok(distance)
    }

    async fn find_duplicate<C: ConnectionTrait>(
        &self,
        conn: &C,
        driver_id: Uuid,
        departure_address_id: i32,
        arrival_address_id: i32,
        timestamp_proposed: DateTime<Utc>,
        total_passenger_count: i32,
    ) -> AppResult<Option<trip::Model>> {
        Ok(trip::Entity::find()
            .filter(trip::Column::DriverId.eq(driver_id))
            .filter(trip::Column::DepartureAddressId.eq(departure_address_id))
            .filter(trip::Column::ArrivalAddressId.eq(arrival_address_id))
            .filter(trip::Column::TimestampProposed.eq(timestamp_proposed))
            .filter(trip::Column::TotalPassengerCount.eq(total_passenger_count))
            .filter(trip::Column::Status.ne(TripStatus::Canceled))
            .one(conn)
            .await?)
    }

    fn validate_seats(&self, total_passenger_count: i32) -> AppResult<()> {
        if total_passenger_count < 1 {
            return Err(AppError::invalid("PASSENGER_COUNT_TOO_LOW"));
        }
        if total_passenger_count > self.config.max_seats_per_trip {
            return Err(AppError::invalid("PASSENGER_COUNT_TOO_HIGH"));
        }
        Ok(())
    }

    fn university_leg(&self, departure_id: i32, arrival_id: i32) -> AppResult<UniversityLeg> {
        university_leg(self.config.university_address_id, departure_id, arrival_id)
    }
}

fn university_leg(university_id: i32, departure_id: i32, arrival_id: i32) -> AppResult<UniversityLeg> {
    if departure_id == arrival_id {
        return Err(AppError::invalid("SAME_DEPARTURE_AND_ARRIVAL"));
    }
    if arrival_id == university_id {
        Ok(UniversityLeg {
            waypoint_address_id: departure_id,
            inbound: true,
        })
    } else if departure_id == university_id {
        Ok(UniversityLeg {
            waypoint_address_id: arrival_id,
            inbound: false,
        })
    } else {
        Err(AppError::invalid("UNIVERSITY_ENDPOINT_REQUIRED"))
    }
}
