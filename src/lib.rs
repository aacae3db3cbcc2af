pub mod config;
pub mod db;
pub mod engine;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod routing;
pub mod utils;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};

use engine::{AddressStore, BookingEngine, Notifier, TripEngine};
use routing::{Geocoder, RouteProvider};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub addresses: AddressStore,
    pub trips: TripEngine,
    pub bookings: BookingEngine,
}

impl AppState {
    /// Wire the engines. The configured university address is resolved
    /// first, so an empty database gets its anchor row on first start.
    pub async fn build(
        db: DatabaseConnection,
        mut config: Config,
        geocoder: Arc<dyn Geocoder>,
        routes: Arc<dyn RouteProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> AppResult<Self> {
        let addresses = AddressStore::new(db.clone(), geocoder);
        let university_id = addresses.resolve(&config.university).await?;
        config.engine.university_address_id = university_id;
        tracing::info!(university_id, "University address resolved");

        let engine_config = Arc::new(config.engine.clone());
        let trips = TripEngine::new(
            db.clone(),
            Arc::clone(&engine_config),
            addresses.clone(),
            routes,
            Arc::clone(&notifier),
        );
        let bookings = BookingEngine::new(db.clone(), engine_config, notifier);

        Ok(Self {
            db,
            config,
            addresses,
            trips,
            bookings,
        })
    }
}
