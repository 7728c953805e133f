// Drone service: fleet dispatch, flight simulation and live tracking.

use std::sync::Arc;

use anyhow::{Context, Result};
use fulfillment_core::common::JwtService;
use fulfillment_core::domains::drones::actions::{seed_fleet, DroneSimulation};
use fulfillment_core::domains::drones::store::PgDroneStore;
use fulfillment_core::kernel::{
    DroneServiceDeps, HttpOrderDirectory, NatsEventBus, ServiceClient, TrackingHub,
};
use fulfillment_core::server::{build_drone_app, shutdown_signal, DroneAppState};
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

    tracing::info!("Starting drone service");

    let config = Config::from_env_for("drone-service", 8082)
        .context("Failed to load configuration")?;
    tracing::info!(service_id = %config.service_id, "Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations/drones")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let bus = Arc::new(NatsEventBus::connect(&config.nats_url, config.service_id.clone()).await?);
    let shutdown = bus.shutdown_token();

    let order_service =
        ServiceClient::new("order-service", &config.order_service_url, config.http.clone())?;
    let jwt_service = Arc::new(JwtService::new(&config.jwt_secret, config.jwt_issuer.clone()));
    let drones = Arc::new(PgDroneStore::new(pool.clone()));

    let seeded = seed_fleet(drones.as_ref(), &config.fleet)
        .await
        .context("Failed to seed drone fleet")?;
    tracing::info!(seeded, "Fleet ready");

    let deps = DroneServiceDeps::new(
        drones,
        Arc::new(HttpOrderDirectory::new(order_service)),
        bus,
        TrackingHub::new(),
        config.simulation.clone(),
        config.fleet.clone(),
        jwt_service,
    );

    let simulation = Arc::new(DroneSimulation::new(deps.clone()));
    let simulation_handle = tokio::spawn(simulation.run(shutdown.clone()));

    let app = build_drone_app(
        DroneAppState {
            deps,
            db_pool: Some(pool),
        },
        &config.allowed_origins,
    );

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Tracking socket: ws://localhost:{}/ws", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await
    .context("Server error")?;

    // Covers a server error exit too.
    shutdown.cancel();
    if let Err(e) = simulation_handle.await {
        tracing::warn!(error = %e, "Simulation task ended abnormally");
    }

    tracing::info!("Drone service stopped");
    Ok(())
}
