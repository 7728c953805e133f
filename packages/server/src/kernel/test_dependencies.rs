// TestDependencies - in-memory collaborators for testing
//
// Wires both services to in-memory stores, one shared TestEventBus, a mock
// catalog and an order directory that reads the order store directly.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::event_bus::TestEventBus;
use super::service_client::ServiceClientError;
use super::traits::{BaseCatalog, BaseOrderDirectory, ProductSnapshot, RestaurantInfo};
use super::{DroneServiceDeps, OrderServiceDeps, TrackingHub};
use crate::common::{Actor, JwtService, OrderId, ProductId, RestaurantId, Role};
use crate::config::{FleetConfig, PricingConfig, SimulationConfig};
use crate::domains::drones::store::InMemoryDroneStore;
use crate::domains::orders::models::Order;
use crate::domains::orders::store::{InMemoryOrderStore, OrderStore};

pub const TEST_JWT_SECRET: &str = "test_secret_key";
pub const TEST_JWT_ISSUER: &str = "fulfillment-test";

// =============================================================================
// Mock Catalog
// =============================================================================

/// How an injected catalog failure presents itself.
#[derive(Debug, Clone, Copy)]
pub enum CatalogFailure {
    /// Answers with this 4xx status.
    Rejected(u16),
    /// Network gone, retries exhausted.
    Unavailable,
}

impl CatalogFailure {
    fn to_error(self) -> ServiceClientError {
        match self {
            CatalogFailure::Rejected(status) => ServiceClientError::Rejected {
                service: "catalog".to_string(),
                status,
                body: "rejected by mock catalog".to_string(),
            },
            CatalogFailure::Unavailable => ServiceClientError::Unavailable {
                service: "catalog".to_string(),
                attempts: 4,
                message: "connection refused".to_string(),
            },
        }
    }
}

#[derive(Default)]
struct CatalogState {
    products: HashMap<ProductId, ProductSnapshot>,
    restaurants: HashMap<RestaurantId, RestaurantInfo>,
    reserve_calls: Vec<(ProductId, u32)>,
    restore_calls: Vec<(ProductId, u32)>,
    reserve_failures: HashMap<ProductId, CatalogFailure>,
    restore_failures: HashSet<ProductId>,
}

/// Catalog collaborator that serves seeded products and records inventory calls.
#[derive(Default)]
pub struct MockCatalog {
    state: Mutex<CatalogState>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_product(&self, product: ProductSnapshot) {
        self.state().products.insert(product.id, product);
    }

    pub fn add_restaurant(&self, restaurant: RestaurantInfo) {
        self.state().restaurants.insert(restaurant.id, restaurant);
    }

    pub fn fail_reserve_for(&self, product_id: ProductId, failure: CatalogFailure) {
        self.state().reserve_failures.insert(product_id, failure);
    }

    pub fn fail_restore_for(&self, product_id: ProductId) {
        self.state().restore_failures.insert(product_id);
    }

    /// Successful reservations, in call order.
    pub fn reserve_calls(&self) -> Vec<(ProductId, u32)> {
        self.state().reserve_calls.clone()
    }

    /// Every restore attempt, failed ones included, in call order.
    pub fn restore_calls(&self) -> Vec<(ProductId, u32)> {
        self.state().restore_calls.clone()
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> ServiceClientError {
    ServiceClientError::Rejected {
        service: "catalog".to_string(),
        status: 404,
        body: format!("{} {} not found", what, id),
    }
}

#[async_trait]
impl BaseCatalog for MockCatalog {
    async fn get_product(&self, id: ProductId) -> Result<ProductSnapshot, ServiceClientError> {
        self.state()
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("product", id))
    }

    async fn get_restaurant(&self, id: RestaurantId) -> Result<RestaurantInfo, ServiceClientError> {
        self.state()
            .restaurants
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("restaurant", id))
    }

    async fn reserve_inventory(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), ServiceClientError> {
        let mut state = self.state();
        if let Some(failure) = state.reserve_failures.get(&product_id) {
            return Err(failure.to_error());
        }
        state.reserve_calls.push((product_id, quantity));
        Ok(())
    }

    async fn restore_inventory(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), ServiceClientError> {
        let mut state = self.state();
        state.restore_calls.push((product_id, quantity));
        if state.restore_failures.contains(&product_id) {
            return Err(CatalogFailure::Rejected(500).to_error());
        }
        Ok(())
    }
}

// =============================================================================
// Order directory backed by the order store
// =============================================================================

/// Stands in for `GET /orders/:id`: verifies the token and applies the same
/// visibility rule the order service does.
pub struct StoreOrderDirectory {
    orders: Arc<dyn OrderStore>,
    jwt_service: Arc<JwtService>,
}

impl StoreOrderDirectory {
    pub fn new(orders: Arc<dyn OrderStore>, jwt_service: Arc<JwtService>) -> Self {
        Self {
            orders,
            jwt_service,
        }
    }
}

fn rejected(status: u16, body: &str) -> ServiceClientError {
    ServiceClientError::Rejected {
        service: "orders".to_string(),
        status,
        body: body.to_string(),
    }
}

#[async_trait]
impl BaseOrderDirectory for StoreOrderDirectory {
    async fn get_order(&self, id: OrderId, bearer: &str) -> Result<Order, ServiceClientError> {
        let claims = self
            .jwt_service
            .verify_token(bearer)
            .map_err(|_| rejected(401, "invalid token"))?;
        let actor = Actor::from_claims(&claims);

        let order = self
            .orders
            .find(id)
            .await
            .map_err(|e| ServiceClientError::Upstream {
                service: "orders".to_string(),
                status: 500,
                body: e.to_string(),
            })?
            .ok_or_else(|| rejected(404, "order not found"))?;

        if !actor.can_view(order.customer_id, order.restaurant_id) {
            return Err(rejected(403, "forbidden"));
        }
        Ok(order.visible_to(&actor))
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Both services' dependencies over shared in-memory infrastructure.
///
/// The two services share one bus here so drone events reach the order
/// saga the way they would through the broker.
#[derive(Clone)]
pub struct TestDependencies {
    pub bus: Arc<TestEventBus>,
    pub catalog: Arc<MockCatalog>,
    pub orders: Arc<InMemoryOrderStore>,
    pub drones: Arc<InMemoryDroneStore>,
    pub tracking: TrackingHub,
    pub jwt_service: Arc<JwtService>,
    pub pricing: PricingConfig,
    pub simulation: SimulationConfig,
    pub fleet: FleetConfig,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            bus: Arc::new(TestEventBus::new("test")),
            catalog: Arc::new(MockCatalog::new()),
            orders: Arc::new(InMemoryOrderStore::new()),
            drones: Arc::new(InMemoryDroneStore::new()),
            tracking: TrackingHub::new(),
            jwt_service: Arc::new(JwtService::new(
                TEST_JWT_SECRET,
                TEST_JWT_ISSUER.to_string(),
            )),
            pricing: PricingConfig::default(),
            simulation: SimulationConfig::default(),
            fleet: FleetConfig::default(),
        }
    }

    pub fn order_deps(&self) -> OrderServiceDeps {
        OrderServiceDeps::new(
            self.orders.clone(),
            self.catalog.clone(),
            self.bus.clone(),
            self.pricing.clone(),
            self.jwt_service.clone(),
        )
    }

    pub fn drone_deps(&self) -> DroneServiceDeps {
        DroneServiceDeps::new(
            self.drones.clone(),
            Arc::new(StoreOrderDirectory::new(
                self.orders.clone(),
                self.jwt_service.clone(),
            )),
            self.bus.clone(),
            self.tracking.clone(),
            self.simulation.clone(),
            self.fleet.clone(),
            self.jwt_service.clone(),
        )
    }

    /// Mint a token for `actor`, signed the way the auth service would.
    pub fn token_for(&self, actor: &Actor) -> String {
        self.jwt_service
            .create_token(
                actor.user_id.into_uuid(),
                actor.role,
                actor.restaurant_id.map(|r| r.into_uuid()),
            )
            .unwrap_or_else(|e| panic!("test token: {}", e))
    }

    pub fn customer() -> Actor {
        Actor {
            user_id: Uuid::new_v4().into(),
            role: Role::Customer,
            restaurant_id: None,
        }
    }

    pub fn merchant_of(restaurant_id: RestaurantId) -> Actor {
        Actor {
            user_id: Uuid::new_v4().into(),
            role: Role::Merchant,
            restaurant_id: Some(restaurant_id),
        }
    }

    pub fn admin() -> Actor {
        Actor {
            user_id: Uuid::new_v4().into(),
            role: Role::Admin,
            restaurant_id: None,
        }
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
