use std::net::SocketAddr;
use std::sync::Arc;

use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use campus_carpool::{
    config::Config,
    db,
    engine::{LogNotifier, Notifier, WebhookNotifier},
    middleware::rate_limit::create_global_governor,
    routes,
    routing::{build_route_provider, NominatimGeocoder},
    AppState,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus_carpool=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    tracing::info!("Starting server at {}", config.server_addr());

    // Connect to database
    let db = db::connect(&config)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Connected to database");

    // Run migrations
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Migrations complete");

    // External providers
    let timeout = config.engine.route_timeout;
    let geocoder = Arc::new(
        NominatimGeocoder::new(
            &config.routing.nominatim_base_url,
            &config.routing.country_filter,
            timeout,
        )
        .expect("Failed to build geocoder"),
    );
    let routes_provider =
        build_route_provider(&config.routing, timeout).expect("Failed to build route provider");
    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url).expect("Failed to build notifier")),
        None => Arc::new(LogNotifier),
    };

    // Create app state, resolving the university address
    let state = AppState::build(db, config.clone(), geocoder, routes_provider, notifier)
        .await
        .expect("Failed to resolve university address");

    // Create router with middleware
    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(create_global_governor());

    // Start server with socket address for rate limiting
    let addr: SocketAddr = config.server_addr().parse().expect("Invalid address");
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
