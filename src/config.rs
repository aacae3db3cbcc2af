use std::env;
use std::time::Duration;

use crate::engine::AddressInput;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    /// Resolved into `engine.university_address_id` when the app state is built.
    pub university: AddressInput,
    pub engine: EngineConfig,
    pub routing: RoutingConfig,
    pub notify_webhook_url: Option<String>,
}

/// Values the trip and booking engines are constructed with.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Row id of the university address. Zero until resolved at startup.
    pub university_address_id: i32,
    pub detour_tolerance_minutes: u32,
    pub max_seats_per_trip: i32,
    pub max_booking_attempts: u64,
    pub max_code_attempts: i32,
    pub route_timeout: Duration,
    pub fare: FareConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FareConfig {
    pub base_rate: f64,
    pub rate_per_km: f64,
    pub cost_per_km: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteBackend {
    Google { api_key: String },
    Osm { base_url: String },
}

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub backend: RouteBackend,
    pub google_base_url: String,
    pub nominatim_base_url: String,
    pub country_filter: String,
}

impl Default for FareConfig {
    fn default() -> Self {
        Self {
            base_rate: 5.0,
            rate_per_km: 0.05,
            cost_per_km: 0.15,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            university_address_id: 0,
            detour_tolerance_minutes: 10,
            max_seats_per_trip: 4,
            max_booking_attempts: 3,
            max_code_attempts: 5,
            route_timeout: Duration::from_secs(5),
            fare: FareConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = EngineConfig::default();
        let fare_defaults = FareConfig::default();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
            university: AddressInput {
                street_number: env::var("UNIVERSITY_STREET_NUMBER")
                    .expect("UNIVERSITY_STREET_NUMBER must be set"),
                street_name: env::var("UNIVERSITY_STREET_NAME")
                    .expect("UNIVERSITY_STREET_NAME must be set"),
                city: env::var("UNIVERSITY_CITY")
                    .expect("UNIVERSITY_CITY must be set"),
                postal_code: env::var("UNIVERSITY_POSTAL_CODE")
                    .expect("UNIVERSITY_POSTAL_CODE must be set"),
            },
            engine: EngineConfig {
                university_address_id: defaults.university_address_id,
                detour_tolerance_minutes: parse_or("DETOUR_TOLERANCE_MINUTES", defaults.detour_tolerance_minutes),
                max_seats_per_trip: parse_or("MAX_SEATS_PER_TRIP", defaults.max_seats_per_trip),
                max_booking_attempts: parse_or("MAX_BOOKING_ATTEMPTS", defaults.max_booking_attempts),
                max_code_attempts: parse_or("MAX_CODE_ATTEMPTS", defaults.max_code_attempts),
                route_timeout: Duration::from_secs(parse_or("ROUTE_TIMEOUT_SECS", 5)),
                fare: FareConfig {
                    base_rate: parse_or("FARE_BASE_RATE", fare_defaults.base_rate),
                    rate_per_km: parse_or("FARE_RATE_PER_KM", fare_defaults.rate_per_km),
                    cost_per_km: parse_or("FARE_COST_PER_KM", fare_defaults.cost_per_km),
                },
            },
            routing: RoutingConfig {
                backend: backend_from_env(),
                google_base_url: env::var("GOOGLE_MAPS_BASE_URL")
                    .unwrap_or_else(|_| "https://maps.googleapis.com".to_string()),
                nominatim_base_url: env::var("NOMINATIM_BASE_URL")
                    .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
                country_filter: env::var("GEOCODING_COUNTRY").unwrap_or_default(),
            },
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok().filter(|u| !u.is_empty()),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn backend_from_env() -> RouteBackend {
    let name = env::var("ROUTE_BACKEND").unwrap_or_else(|_| "osm".to_string());
    match name.to_lowercase().as_str() {
        "google" => RouteBackend::Google {
            api_key: env::var("GOOGLE_MAPS_API_KEY")
                .expect("GOOGLE_MAPS_API_KEY must be set when ROUTE_BACKEND=google"),
        },
        "osm" => RouteBackend::Osm {
            base_url: env::var("OSRM_BASE_URL")
                .unwrap_or_else(|_| "https://router.project-osrm.org".to_string()),
        },
        other => panic!("ROUTE_BACKEND must be `google` or `osm`, got `{other}`"),
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} has an invalid value: {raw}")),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.detour_tolerance_minutes, 10);
        assert_eq!(config.max_seats_per_trip, 4);
        assert_eq!(config.max_booking_attempts, 3);
        assert_eq!(config.route_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_or_falls_back() {
        assert_eq!(parse_or("CAMPUS_CARPOOL_TEST_UNSET_VAR", 42u32), 42);
    }
}
