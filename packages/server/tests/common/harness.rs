//! Test harness wiring both services to shared in-memory infrastructure.
//!
//! Order and drone services share one `TestEventBus`, so a drone event
//! published by a dispatch action reaches the order saga before the action
//! returns. Postgres-backed tests use a shared testcontainers database instead.

use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use fulfillment_core::common::{Actor, OrderId};
use fulfillment_core::domains::drones::actions::{seed_fleet, DroneSimulation};
use fulfillment_core::domains::drones::models::{Drone, DroneStatus};
use fulfillment_core::domains::drones::store::DroneStore;
use fulfillment_core::domains::orders::actions::create_order;
use fulfillment_core::domains::orders::events::{
    PaymentCompleted, PAYMENTS_EXCHANGE, PAYMENT_COMPLETED,
};
use fulfillment_core::domains::orders::models::Order;
use fulfillment_core::domains::orders::register_order_handlers;
use fulfillment_core::domains::orders::store::OrderStore;
use fulfillment_core::kernel::{
    BaseEventBus, DroneServiceDeps, OrderServiceDeps, TestDependencies,
};
use fulfillment_core::server::{build_drone_app, build_order_app, DroneAppState, OrderAppState};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use super::fixtures::{order_input, CatalogFixture};

/// Long enough for any drone to reach its target in one tick.
const FLIGHT: Duration = Duration::from_secs(3600);

pub fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Both services over in-memory stores, a seeded catalog and a seeded fleet.
///
/// ```ignore
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &mut TestHarness) {
///     let order = ctx.place_paid_order(&ctx.customer.clone()).await;
/// }
/// ```
pub struct TestHarness {
    pub deps: TestDependencies,
    pub orders: OrderServiceDeps,
    pub drones: DroneServiceDeps,
    pub catalog: CatalogFixture,
    pub customer: Actor,
    pub merchant: Actor,
    pub simulation: DroneSimulation,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        init_tracing();

        let deps = TestDependencies::new();
        let orders = deps.order_deps();
        let drones = deps.drone_deps();

        register_order_handlers(&orders)
            .await
            .context("Failed to register order handlers")?;
        seed_fleet(deps.drones.as_ref(), &deps.fleet)
            .await
            .context("Failed to seed fleet")?;

        let catalog = CatalogFixture::seed(&deps);
        let merchant = TestDependencies::merchant_of(catalog.restaurant.id);
        let simulation = DroneSimulation::new(drones.clone());

        Ok(Self {
            customer: TestDependencies::customer(),
            merchant,
            catalog,
            simulation,
            orders,
            drones,
            deps,
        })
    }

    pub fn token_for(&self, actor: &Actor) -> String {
        self.deps.token_for(actor)
    }

    pub fn order_app(&self) -> Router {
        build_order_app(
            OrderAppState {
                deps: self.orders.clone(),
                db_pool: None,
            },
            &[],
        )
    }

    pub fn drone_app(&self) -> Router {
        build_drone_app(
            DroneAppState {
                deps: self.drones.clone(),
                db_pool: None,
            },
            &[],
        )
    }

    /// The standard two-line order (2 × 10.00 + 1 × 5.00).
    pub async fn place_order(&self, customer: &Actor) -> Order {
        create_order(customer, order_input(&self.catalog), &self.orders)
            .await
            .expect("order should be placed")
    }

    /// Publish `payment.completed` the way the payment collaborator would.
    pub async fn complete_payment(&self, order_id: OrderId) {
        let event = PaymentCompleted {
            order_id,
            transaction_id: Some("txn-test".to_string()),
        };
        self.deps
            .bus
            .publish(
                PAYMENTS_EXCHANGE,
                PAYMENT_COMPLETED,
                PAYMENT_COMPLETED,
                serde_json::to_value(event).unwrap(),
            )
            .await
            .expect("publish payment.completed");
    }

    /// Placed, paid and accepted by the kitchen: `preparing`.
    pub async fn place_paid_order(&self, customer: &Actor) -> Order {
        let order = self.place_order(customer).await;
        self.complete_payment(order.id).await;
        fulfillment_core::domains::orders::actions::restaurant_confirm(
            &self.merchant,
            order.id,
            &self.orders,
        )
        .await
        .expect("kitchen confirms");
        // The kitchen's copy has no PIN.
        self.order(order.id).await
    }

    pub async fn order(&self, order_id: OrderId) -> Order {
        self.deps
            .orders
            .get(order_id)
            .await
            .expect("order exists")
    }

    pub async fn drone_for(&self, order_id: OrderId) -> Drone {
        self.deps
            .drones
            .find_by_order(order_id)
            .await
            .expect("store readable")
            .expect("a drone holds the order")
    }

    /// Tick the simulation until the drone holding `order_id` stops moving,
    /// i.e. it has reached and processed its current target.
    pub async fn fly(&self, drone: &Drone) -> Drone {
        for _ in 0..10 {
            self.simulation.tick_for(FLIGHT).await.expect("tick");
            let current = self.deps.drones.get(drone.id).await.expect("drone exists");
            if current.target.is_none() || current.status == DroneStatus::Available {
                return current;
            }
        }
        panic!("drone {} never reached its target", drone.id);
    }
}

/// Shared Postgres for the store tests. Started once, reused by every test.
struct SharedDatabase {
    db_url: String,
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_DB: OnceCell<SharedDatabase> = OnceCell::const_new();

impl SharedDatabase {
    async fn init() -> Result<Self> {
        init_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;
        sqlx::migrate!("./migrations/orders")
            .set_ignore_missing(true)
            .run(&pool)
            .await
            .context("Failed to run order migrations")?;
        sqlx::migrate!("./migrations/drones")
            .set_ignore_missing(true)
            .run(&pool)
            .await
            .context("Failed to run drone migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }
}

/// A pool on the shared test database. Tables are shared across tests, so
/// tests only assert on rows they created.
pub async fn test_pool() -> PgPool {
    let shared = SHARED_DB
        .get_or_init(|| async {
            SharedDatabase::init()
                .await
                .expect("Failed to initialize shared test database")
        })
        .await;
    PgPool::connect(&shared.db_url)
        .await
        .expect("Failed to connect to test database")
}
