//! Router assembly for the order and drone services.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::common::JwtService;
use crate::kernel::{DroneServiceDeps, OrderServiceDeps};
use crate::server::middleware::jwt_auth_middleware;
use crate::server::routes::{
    assign_handler, available_drones_handler, cancel_order_handler, complete_order_handler,
    create_order_handler, deliver_handler, drone_for_order_handler, get_order_handler,
    health_handler, list_drones_handler, list_orders_handler, mark_ready_handler, recall_handler,
    restaurant_confirm_handler, tracking_ws_handler, verify_pin_handler, HealthProbe,
};

/// Shared state of the order service
#[derive(Clone)]
pub struct OrderAppState {
    pub deps: OrderServiceDeps,
    pub db_pool: Option<PgPool>,
}

/// Shared state of the drone service
#[derive(Clone)]
pub struct DroneAppState {
    pub deps: DroneServiceDeps,
    pub db_pool: Option<PgPool>,
}

/// Build the order service router.
pub fn build_order_app(state: OrderAppState, allowed_origins: &[String]) -> Router {
    let probe = HealthProbe {
        service: "order-service",
        db_pool: state.db_pool.clone(),
    };
    let jwt_service = state.deps.jwt_service.clone();

    let router = Router::new()
        .route("/orders", post(create_order_handler).get(list_orders_handler))
        .route("/orders/:id", get(get_order_handler))
        .route("/orders/:id/cancel", post(cancel_order_handler))
        .route(
            "/orders/:id/restaurant-confirm",
            post(restaurant_confirm_handler),
        )
        .route("/orders/:id/ready", post(mark_ready_handler))
        .route("/orders/:id/complete", post(complete_order_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state));

    with_common_layers(router, jwt_service, probe, allowed_origins)
}

/// Build the drone service router.
pub fn build_drone_app(state: DroneAppState, allowed_origins: &[String]) -> Router {
    let probe = HealthProbe {
        service: "drone-service",
        db_pool: state.db_pool.clone(),
    };
    let jwt_service = state.deps.jwt_service.clone();

    let router = Router::new()
        .route("/drones", get(list_drones_handler))
        .route("/drones/available", get(available_drones_handler))
        .route("/drones/assign", post(assign_handler))
        .route("/drones/deliver", post(deliver_handler))
        .route("/drones/:order_id", get(drone_for_order_handler))
        .route("/drones/:order_id/verify-pin", post(verify_pin_handler))
        .route("/drones/:order_id/recall", post(recall_handler))
        .route("/ws", get(tracking_ws_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state));

    with_common_layers(router, jwt_service, probe, allowed_origins)
}

// Middleware layers (applied in reverse order - last added runs first)
fn with_common_layers(
    router: Router,
    jwt_service: Arc<JwtService>,
    probe: HealthProbe,
    allowed_origins: &[String],
) -> Router {
    router
        .layer(middleware::from_fn(move |req, next| {
            jwt_auth_middleware(jwt_service.clone(), req, next)
        }))
        .layer(Extension(probe))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// Any origin when the list is empty or contains `*`; otherwise the listed
/// origins only. Unparseable entries are skipped.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}
