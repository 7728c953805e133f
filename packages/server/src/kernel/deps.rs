//! Service dependencies for actions (using traits for testability)
//!
//! Each binary builds one container. Every external service sits behind a
//! trait object so tests can swap in the in-memory versions.

use std::sync::Arc;

use crate::common::JwtService;
use crate::config::{FleetConfig, PricingConfig, SimulationConfig};
use crate::domains::drones::store::DroneStore;
use crate::domains::orders::store::OrderStore;
use crate::kernel::{BaseCatalog, BaseEventBus, BaseOrderDirectory, TrackingHub};

// =============================================================================
// Order service
// =============================================================================

#[derive(Clone)]
pub struct OrderServiceDeps {
    pub orders: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn BaseCatalog>,
    pub bus: Arc<dyn BaseEventBus>,
    pub pricing: PricingConfig,
    pub jwt_service: Arc<JwtService>,
}

impl OrderServiceDeps {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn BaseCatalog>,
        bus: Arc<dyn BaseEventBus>,
        pricing: PricingConfig,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            orders,
            catalog,
            bus,
            pricing,
            jwt_service,
        }
    }
}

// =============================================================================
// Drone service
// =============================================================================

#[derive(Clone)]
pub struct DroneServiceDeps {
    pub drones: Arc<dyn DroneStore>,
    /// Order service, reached over HTTP with the caller's token.
    pub orders: Arc<dyn BaseOrderDirectory>,
    pub bus: Arc<dyn BaseEventBus>,
    pub tracking: TrackingHub,
    pub simulation: SimulationConfig,
    pub fleet: FleetConfig,
    pub jwt_service: Arc<JwtService>,
}

impl DroneServiceDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        drones: Arc<dyn DroneStore>,
        orders: Arc<dyn BaseOrderDirectory>,
        bus: Arc<dyn BaseEventBus>,
        tracking: TrackingHub,
        simulation: SimulationConfig,
        fleet: FleetConfig,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            drones,
            orders,
            bus,
            tracking,
            simulation,
            fleet,
            jwt_service,
        }
    }
}
