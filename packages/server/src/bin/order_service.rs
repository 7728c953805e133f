// Order service: saga coordinator for order placement and fulfillment.

use std::sync::Arc;

use anyhow::{Context, Result};
use fulfillment_core::common::JwtService;
use fulfillment_core::domains::orders::store::PgOrderStore;
use fulfillment_core::domains::orders::register_order_handlers;
use fulfillment_core::kernel::{HttpCatalog, NatsEventBus, OrderServiceDeps, ServiceClient};
use fulfillment_core::server::{build_order_app, shutdown_signal, OrderAppState};
use fulfillment_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,fulfillment_core=debug,sqlx=warn,async_nats=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting order service");

    let config = Config::from_env_for("order-service", 8080)
        .context("Failed to load configuration")?;
    tracing::info!(service_id = %config.service_id, "Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations/orders")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    // The broker is required; no degraded mode without it.
    let bus = Arc::new(NatsEventBus::connect(&config.nats_url, config.service_id.clone()).await?);
    let shutdown = bus.shutdown_token();

    let catalog = ServiceClient::new("catalog", &config.catalog_service_url, config.http.clone())?;
    let jwt_service = Arc::new(JwtService::new(&config.jwt_secret, config.jwt_issuer.clone()));

    let deps = OrderServiceDeps::new(
        Arc::new(PgOrderStore::new(pool.clone())),
        Arc::new(HttpCatalog::new(catalog)),
        bus,
        config.pricing.clone(),
        jwt_service,
    );

    register_order_handlers(&deps)
        .await
        .context("Failed to register event handlers")?;

    let app = build_order_app(
        OrderAppState {
            deps,
            db_pool: Some(pool),
        },
        &config.allowed_origins,
    );

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await
    .context("Server error")?;

    tracing::info!("Order service stopped");
    Ok(())
}
