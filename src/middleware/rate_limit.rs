use axum::body::Body;
use axum::http::Request;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::{KeyExtractor, PeerIpKeyExtractor},
    GovernorError, GovernorLayer,
};
use uuid::Uuid;

use crate::utils::jwt::Claims;

type NoOp = governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>;

/// IP-based rate limiting, applied before authentication
pub type GlobalGovernorLayer = GovernorLayer<PeerIpKeyExtractor, NoOp, Body>;

/// Per-user rate limiting on authenticated routes
pub type UserGovernorLayer = GovernorLayer<UserIdExtractor, NoOp, Body>;

/// Custom key extractor that extracts user ID from JWT claims in request extensions
#[derive(Debug, Clone, Copy)]
pub struct UserIdExtractor;

impl KeyExtractor for UserIdExtractor {
    type Key = Uuid;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        // Claims are set by auth_middleware
        let claims = req
            .extensions()
            .get::<Claims>()
            .ok_or(GovernorError::UnableToExtractKey)?;

        Ok(claims.sub)
    }
}

/// What an authenticated caller is doing, for quota purposes.
/// - Driver: 500 requests per minute
/// - Rider: 100 requests per minute (searches hit the route provider)
pub enum RateLimitedRole {
    Driver,
    Rider,
}

/// Create a GovernorLayer for global rate limiting (per IP address)
/// - 1000 requests per minute (one token every 60ms)
pub fn create_global_governor() -> GlobalGovernorLayer {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(60)
            .burst_size(1000)
            .finish()
            .expect("global governor config is valid"),
    );

    GovernorLayer::new(config)
}

pub fn create_user_governor(role: RateLimitedRole) -> UserGovernorLayer {
    let (per_ms, burst) = match role {
        RateLimitedRole::Driver => (120, 500),
        RateLimitedRole::Rider => (600, 100),
    };

    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(burst)
            .key_extractor(UserIdExtractor)
            .finish()
            .expect("user governor config is valid"),
    );

    GovernorLayer::new(config)
}
