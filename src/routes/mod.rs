use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{driver, rider};
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::{create_user_governor, RateLimitedRole};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    let driver_governor = create_user_governor(RateLimitedRole::Driver);
    let rider_governor = create_user_governor(RateLimitedRole::Rider);

    // Driver routes: trips the caller proposes and operates
    // Rate limit: 500 requests per minute per user
    let driver_routes = Router::new()
        .route("/trips", post(driver::propose_trip).get(driver::my_trips))
        .route("/trips/recurring", post(driver::create_recurring_trips))
        .route("/trips/{id}/passengers", get(driver::trip_passengers))
        .route("/trips/{id}/status", put(driver::change_status))
        .route("/trips/{id}/seats", put(driver::update_seats))
        .route("/trips/{id}/schedule", put(driver::reschedule))
        .route(
            "/trips/{id}/bookings/{rider_id}/respond",
            post(driver::respond_booking),
        )
        .route("/trips/{id}/bookings/{rider_id}/join", post(driver::join))
        // Governor runs after auth so the user id is in extensions
        .layer(driver_governor)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Rider routes: search, book, board
    // Rate limit: 100 requests per minute per user
    let rider_routes = Router::new()
        .route("/trips/search", post(rider::search_trips))
        .route("/trips/{id}", get(rider::get_trip))
        .route(
            "/trips/{id}/booking",
            post(rider::book_trip).delete(rider::cancel_booking),
        )
        .route(
            "/trips/{id}/verification-code",
            get(rider::verification_code),
        )
        .route("/bookings", get(rider::my_bookings))
        .layer(rider_governor)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/driver", driver_routes)
        .nest("/api", rider_routes)
        .with_state(state)
}
