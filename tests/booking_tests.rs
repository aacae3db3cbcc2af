//! Booking state machine, capacity and boarding against SQLite.

mod common;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};

use campus_carpool::engine::{fare, BookingResponse};
use campus_carpool::entities::booking::{self, BookingStatus};
use campus_carpool::entities::trip::TripStatus;
use campus_carpool::AppError;
use common::{TestApp, DIRECT_KM};

/// Sum of accepted seats, read straight from the table.
async fn accepted_seats(app: &TestApp, trip_id: uuid::Uuid) -> i32 {
    booking::Entity::find()
        .filter(booking::Column::TripId.eq(trip_id))
        .filter(booking::Column::Accepted.eq(BookingStatus::Accepted))
        .all(&app.db)
        .await
        .unwrap()
        .iter()
        .map(|b| b.passenger_count)
        .sum()
}

#[tokio::test]
async fn test_driver_cannot_book_own_trip() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let trip = app.trip(driver, 3).await;

    let err = app.bookings.book_trip(trip.id, driver, 1).await.unwrap_err();
    assert_eq!(err.code(), "DRIVER_CANNOT_BOOK_HIS_OWN_TRIP");
}

/// Both requests race for the last seats. The test database has one pooled
/// connection, so SQLite serializes the two transactions; the row lock taken
/// with `FOR UPDATE` only contends on Postgres.
#[tokio::test]
async fn test_concurrent_requests_cannot_overbook() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let rider_a = app.user().await;
    let rider_b = app.user().await;
    let trip = app.trip(driver, 3).await;

    let (a, b) = tokio::join!(
        app.bookings.book_trip(trip.id, rider_a, 2),
        app.bookings.book_trip(trip.id, rider_b, 2),
    );

    let results = [a, b];
    let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].code(), "PASSENGER_COUNT_TOO_HIGH");
}

#[tokio::test]
async fn test_booking_validation() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let rider = app.user().await;
    let trip = app.trip(driver, 2).await;

    let err = app.bookings.book_trip(trip.id, rider, 0).await.unwrap_err();
    assert_eq!(err.code(), "PASSENGER_COUNT_TOO_LOW");

    let err = app.bookings.book_trip(trip.id, rider, 3).await.unwrap_err();
    assert_eq!(err.code(), "PASSENGER_COUNT_TOO_HIGH");

    let err = app
        .bookings
        .book_trip(uuid::Uuid::new_v4(), rider, 1)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TRIP_NOT_FOUND");

    app.bookings.book_trip(trip.id, rider, 1).await.unwrap();
    let err = app.bookings.book_trip(trip.id, rider, 1).await.unwrap_err();
    assert_eq!(err.code(), "TRIP_ALREADY_BOOKED");
}

#[tokio::test]
async fn test_second_active_booking_hits_unique_index() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let rider = app.user().await;
    let trip = app.trip(driver, 3).await;
    let first = app.bookings.book_trip(trip.id, rider, 1).await.unwrap();

    // Written past the engine's own check, as a racing request would be
    let mut copy: booking::ActiveModel = first.into();
    copy.id = Set(uuid::Uuid::new_v4());
    let err: AppError = booking::Entity::insert(copy)
        .exec(&app.db)
        .await
        .unwrap_err()
        .into();
    assert_eq!(err.code(), "TRIP_ALREADY_BOOKED");
}

#[tokio::test]
async fn test_booking_attempts_are_capped() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let rider = app.user().await;
    let trip = app.trip(driver, 3).await;

    for _ in 0..app.config.max_booking_attempts {
        app.bookings.book_trip(trip.id, rider, 1).await.unwrap();
        app.bookings.cancel_booking(rider, trip.id).await.unwrap();
    }

    let err = app.bookings.book_trip(trip.id, rider, 1).await.unwrap_err();
    assert_eq!(err.code(), "TOO_MANY_BOOKING_ATTEMPTS");
}

#[tokio::test]
async fn test_rejected_rider_may_ask_again() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let rider = app.user().await;
    let trip = app.trip(driver, 3).await;

    app.bookings.book_trip(trip.id, rider, 1).await.unwrap();
    let rejected = app
        .bookings
        .respond_booking(trip.id, driver, rider, BookingResponse::Reject)
        .await
        .unwrap();
    assert_eq!(rejected.accepted, BookingStatus::Rejected);
    assert!(rejected.verification_code.is_none());

    let again = app.bookings.book_trip(trip.id, rider, 1).await.unwrap();
    assert_eq!(again.accepted, BookingStatus::Requested);
}

#[tokio::test]
async fn test_respond_rules() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let rider = app.user().await;
    let stranger = app.user().await;
    let trip = app.trip(driver, 3).await;

    let err = app
        .bookings
        .respond_booking(trip.id, driver, rider, BookingResponse::Accept)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BOOKING_NOT_FOUND");

    app.bookings.book_trip(trip.id, rider, 2).await.unwrap();

    let err = app
        .bookings
        .respond_booking(trip.id, stranger, rider, BookingResponse::Accept)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_TRIP_DRIVER");

    app.bookings
        .respond_booking(trip.id, driver, rider, BookingResponse::Accept)
        .await
        .unwrap();
    let err = app
        .bookings
        .respond_booking(trip.id, driver, rider, BookingResponse::Reject)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BOOKING_ALREADY_RESPONDED");
}

#[tokio::test]
async fn test_price_holds_as_riders_are_accepted() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let rider_a = app.user().await;
    let rider_b = app.user().await;
    let trip = app.trip(driver, 3).await;
    let quoted = fare::price(DIRECT_KM, 3, &app.config.fare);
    assert_eq!(trip.price, quoted);

    app.bookings.book_trip(trip.id, rider_a, 1).await.unwrap();
    app.bookings.book_trip(trip.id, rider_b, 2).await.unwrap();

    // A lone accepted rider pays what the search showed
    app.bookings
        .respond_booking(trip.id, driver, rider_a, BookingResponse::Accept)
        .await
        .unwrap();
    assert_eq!(app.reload(trip.id).await.price, quoted);

    app.bookings
        .respond_booking(trip.id, driver, rider_b, BookingResponse::Accept)
        .await
        .unwrap();
    assert_eq!(accepted_seats(&app, trip.id).await, 3);
    assert_eq!(app.reload(trip.id).await.price, quoted);

    app.bookings.cancel_booking(rider_b, trip.id).await.unwrap();
    assert_eq!(accepted_seats(&app, trip.id).await, 1);
    assert_eq!(app.reload(trip.id).await.price, quoted);
}

#[tokio::test]
async fn test_code_and_boarding_flow() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let rider = app.user().await;
    let trip = app.trip(driver, 3).await;

    app.bookings.book_trip(trip.id, rider, 1).await.unwrap();
    let accepted = app
        .bookings
        .respond_booking(trip.id, driver, rider, BookingResponse::Accept)
        .await
        .unwrap();
    let code = accepted.verification_code.clone().unwrap();
    assert_eq!(code.len(), 4);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    // Nothing to show before the trip starts
    let err = app
        .bookings
        .get_verification_code(trip.id, rider)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TRIP_NOT_ON_COURSE");
    let err = app.bookings.join(trip.id, driver, rider, &code).await.unwrap_err();
    assert_eq!(err.code(), "TRIP_NOT_ON_COURSE");

    app.trips
        .change_status(trip.id, driver, TripStatus::OnCourse)
        .await
        .unwrap();
    assert_eq!(
        app.bookings.get_verification_code(trip.id, rider).await.unwrap(),
        code
    );

    let err = app.bookings.join(trip.id, driver, rider, "0000").await.unwrap_err();
    assert_eq!(err.code(), "INVALID_VERIFICATION_CODE");
    assert!(!app.booking(accepted.id).await.joined);

    let boarded = app.bookings.join(trip.id, driver, rider, &code).await.unwrap();
    assert!(boarded.joined);

    let err = app.bookings.join(trip.id, driver, rider, &code).await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_JOINED");

    let err = app.bookings.cancel_booking(rider, trip.id).await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_JOINED");
}

#[tokio::test]
async fn test_join_rejects_unaccepted_and_foreign_drivers() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let rider = app.user().await;
    let stranger = app.user().await;
    let trip = app.trip(driver, 3).await;
    let requested = app.bookings.book_trip(trip.id, rider, 1).await.unwrap();

    app.trips
        .change_status(trip.id, driver, TripStatus::OnCourse)
        .await
        .unwrap();

    let err = app.bookings.join(trip.id, driver, rider, "1234").await.unwrap_err();
    assert_eq!(err.code(), "BOOKING_NOT_ACCEPTED");

    let err = app.bookings.join(trip.id, stranger, rider, "1234").await.unwrap_err();
    assert_eq!(err.code(), "NOT_TRIP_DRIVER");

    let err = app
        .bookings
        .get_verification_code(trip.id, rider)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BOOKING_NOT_ACCEPTED");
    assert!(!app.booking(requested.id).await.joined);

    // Started trips take no new responses
    let err = app
        .bookings
        .respond_booking(trip.id, driver, rider, BookingResponse::Accept)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TRIP_NOT_AVAILABLE");
}

#[tokio::test]
async fn test_wrong_codes_lock_out_boarding() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let rider = app.user().await;
    let trip = app.trip(driver, 3).await;

    app.bookings.book_trip(trip.id, rider, 1).await.unwrap();
    let accepted = app
        .bookings
        .respond_booking(trip.id, driver, rider, BookingResponse::Accept)
        .await
        .unwrap();
    let code = accepted.verification_code.clone().unwrap();
    app.trips
        .change_status(trip.id, driver, TripStatus::OnCourse)
        .await
        .unwrap();

    for _ in 0..app.config.max_code_attempts {
        let err = app.bookings.join(trip.id, driver, rider, "0000").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_VERIFICATION_CODE");
    }

    let err = app.bookings.join(trip.id, driver, rider, &code).await.unwrap_err();
    assert_eq!(err.code(), "TOO_MANY_VERIFICATION_ATTEMPTS");
    assert!(!app.booking(accepted.id).await.joined);
}

#[tokio::test]
async fn test_rider_booking_list() {
    let app = TestApp::new().await;
    let driver = app.user().await;
    let rider = app.user().await;
    let first = app.trip(driver, 3).await;
    let second = app
        .trip_at(driver, 3, first.timestamp_proposed + chrono::Duration::hours(1))
        .await;

    app.bookings.book_trip(first.id, rider, 1).await.unwrap();
    app.bookings.book_trip(second.id, rider, 1).await.unwrap();

    let bookings = app.bookings.list_rider_bookings(rider).await.unwrap();
    assert_eq!(bookings.len(), 2);
    assert_eq!(bookings[0].trip_id, second.id);

    let err = app.bookings.cancel_booking(driver, first.id).await.unwrap_err();
    assert_eq!(err.code(), "BOOKING_NOT_FOUND");
}
