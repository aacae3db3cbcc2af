//! Shared fixtures: an in-memory SQLite database, a geocoder that knows a
//! handful of Montreal addresses, and a router with canned durations.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema, Set,
};
use uuid::Uuid;

use campus_carpool::config::{Config, EngineConfig, RouteBackend, RoutingConfig};
use campus_carpool::engine::{AddressInput, AddressStore, BookingEngine, LogNotifier, TripEngine};
use campus_carpool::entities::{address, booking, trip, user};
use campus_carpool::routing::{Geocoder, GeocodingError, RouteError, RouteLeg, RouteProvider};
use campus_carpool::utils::geo::GeoPoint;
use campus_carpool::AppState;

pub const JWT_SECRET: &str = "test-secret";

pub const UNIVERSITY: (&str, &str, f64, f64) = ("845", "Sherbrooke St W", 45.5048, -73.5772);
pub const DRIVER_HOME: (&str, &str, f64, f64) = ("4500", "Rue Saint-Denis", 45.5260, -73.5830);
pub const RIDER_HOME: (&str, &str, f64, f64) = ("120", "Avenue Laurier O", 45.5220, -73.5950);
pub const FAR_AWAY: (&str, &str, f64, f64) = ("1", "Chemin du Lac", 46.8139, -71.2080);

/// Resolves known street names, fails everything else.
pub struct FakeGeocoder {
    known: HashMap<&'static str, GeoPoint>,
}

impl FakeGeocoder {
    pub fn new() -> Self {
        let known = [UNIVERSITY, DRIVER_HOME, RIDER_HOME, FAR_AWAY]
            .into_iter()
            .map(|(_, street, lat, lon)| (street, GeoPoint::new(lat, lon).unwrap()))
            .collect();
        Self { known }
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, GeocodingError> {
        self.known
            .iter()
            .find(|(street, _)| address.contains(**street))
            .map(|(_, point)| *point)
            .ok_or_else(|| GeocodingError::AddressNotFound(address.to_string()))
    }
}

/// Direct route: 20 min, 12 km. Detour: 10 min and 4 km to the waypoint,
/// then 9 km to the destination taking whatever time makes the detour add
/// `added_seconds`. Any route touching `unreachable` fails.
pub struct FakeRouter {
    pub added_seconds: f64,
    pub unreachable: Option<GeoPoint>,
}

pub const DIRECT_KM: f64 = 12.0;
pub const RIDER_LEG_KM: f64 = 9.0;

#[async_trait]
impl RouteProvider for FakeRouter {
    async fn directions(
        &self,
        points: &[GeoPoint],
        _departure: Option<DateTime<Utc>>,
    ) -> Result<Vec<RouteLeg>, RouteError> {
        if let Some(blocked) = self.unreachable {
            if points.contains(&blocked) {
                return Err(RouteError::NoRoute);
            }
        }
        match points.len() {
            2 => Ok(vec![RouteLeg {
                duration_seconds: 1200.0,
                distance_meters: DIRECT_KM * 1000.0,
            }]),
            3 => Ok(vec![
                RouteLeg {
                    duration_seconds: 600.0,
                    distance_meters: 4000.0,
                },
                RouteLeg {
                    duration_seconds: 600.0 + self.added_seconds,
                    distance_meters: RIDER_LEG_KM * 1000.0,
                },
            ]),
            _ => Err(RouteError::NoRoute),
        }
    }
}

pub struct TestApp {
    pub db: DatabaseConnection,
    pub config: Arc<EngineConfig>,
    pub addresses: AddressStore,
    pub trips: TripEngine,
    pub bookings: BookingEngine,
    pub university: i32,
    pub driver_home: i32,
    pub rider_home: i32,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(|_| {}, 12 * 60).await
    }

    /// `added_seconds` is the detour every candidate trip reports.
    pub async fn build(configure: impl FnOnce(&mut EngineConfig), added_seconds: i64) -> Self {
        Self::build_with_router(
            configure,
            FakeRouter {
                added_seconds: added_seconds as f64,
                unreachable: None,
            },
        )
        .await
    }

    pub async fn build_with_router(
        configure: impl FnOnce(&mut EngineConfig),
        router: FakeRouter,
    ) -> Self {
        let db = setup_db().await;
        let addresses = AddressStore::new(db.clone(), Arc::new(FakeGeocoder::new()));

        let university = addresses.resolve(&input(UNIVERSITY)).await.unwrap();
        let driver_home = addresses.resolve(&input(DRIVER_HOME)).await.unwrap();
        let rider_home = addresses.resolve(&input(RIDER_HOME)).await.unwrap();

        let mut engine_config = EngineConfig {
            university_address_id: university,
            ..EngineConfig::default()
        };
        configure(&mut engine_config);
        let config = Arc::new(engine_config);

        let notifier = Arc::new(LogNotifier);
        let trips = TripEngine::new(
            db.clone(),
            Arc::clone(&config),
            addresses.clone(),
            Arc::new(router),
            notifier.clone(),
        );
        let bookings = BookingEngine::new(db.clone(), Arc::clone(&config), notifier);

        Self {
            db,
            config,
            addresses,
            trips,
            bookings,
            university,
            driver_home,
            rider_home,
        }
    }

    pub async fn user(&self) -> Uuid {
        insert_user(&self.db).await
    }

    /// A Pending trip from the driver's home to the university, startable now.
    pub async fn trip(&self, driver: Uuid, seats: i32) -> trip::Model {
        self.trip_at(driver, seats, soon()).await
    }

    pub async fn trip_at(&self, driver: Uuid, seats: i32, at: DateTime<Utc>) -> trip::Model {
        self.trips
            .propose_trip(driver, self.driver_home, self.university, seats, at)
            .await
            .unwrap()
    }

    pub fn state(&self) -> AppState {
        AppState {
            db: self.db.clone(),
            config: config((*self.config).clone()),
            addresses: self.addresses.clone(),
            trips: self.trips.clone(),
            bookings: self.bookings.clone(),
        }
    }

    pub async fn booking(&self, id: Uuid) -> booking::Model {
        booking::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn reload(&self, trip_id: Uuid) -> trip::Model {
        trip::Entity::find_by_id(trip_id)
            .one(&self.db)
            .await
            .unwrap()
            .unwrap()
    }
}

pub async fn insert_user(db: &DatabaseConnection) -> Uuid {
    let id = Uuid::new_v4();
    user::Entity::insert(user::ActiveModel {
        id: Set(id),
        email: Set(None),
        created_at: Set(Utc::now()),
    })
    .exec(db)
    .await
    .unwrap();
    id
}

/// Server config around `engine`, with the university as the campus address.
pub fn config(engine: EngineConfig) -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        university: input(UNIVERSITY),
        engine,
        routing: RoutingConfig {
            backend: RouteBackend::Osm {
                base_url: "http://localhost:5000".to_string(),
            },
            google_base_url: "http://localhost".to_string(),
            nominatim_base_url: "http://localhost".to_string(),
            country_filter: String::new(),
        },
        notify_webhook_url: None,
    }
}

/// Inside the start window of a trip proposed now.
pub fn soon() -> DateTime<Utc> {
    Utc::now() + Duration::minutes(10)
}

pub fn input((number, street, _, _): (&str, &str, f64, f64)) -> AddressInput {
    AddressInput {
        street_number: number.to_string(),
        street_name: street.to_string(),
        city: "Montreal".to_string(),
        postal_code: "H3A 0G4".to_string(),
    }
}

pub async fn setup_db() -> DatabaseConnection {
    // A single connection: every connection to :memory: is its own database.
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    for stmt in [
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(address::Entity),
        schema.create_table_from_entity(trip::Entity),
        schema.create_table_from_entity(booking::Entity),
    ] {
        db.execute(backend.build(&stmt)).await.unwrap();
    }

    for sql in [
        "CREATE UNIQUE INDEX idx_address_unique ON address (street_number, street_name, city)",
        "CREATE UNIQUE INDEX idx_booking_active_rider ON booking (trip_id, user_id) WHERE accepted IN (0, 1)",
        "CREATE UNIQUE INDEX idx_trip_active_unique ON trip (driver_id, departure_address_id, \
         arrival_address_id, timestamp_proposed, total_passenger_count) WHERE status <> 'canceled'",
    ] {
        db.execute_unprepared(sql).await.unwrap();
    }

    db
}
