// Common types and utilities shared by the order and drone services

pub mod auth;
pub mod entity_ids;
pub mod geo;
pub mod id;
pub mod money;
pub mod state_machine;
pub mod store;

pub use auth::{Actor, AuthError, Claims, JwtService, Role};
pub use entity_ids::{DroneId, OrderId, ProductId, RestaurantId, UserId};
pub use geo::Position;
pub use id::Id;
pub use money::round_money;
pub use state_machine::{ensure_transition, Lifecycle, TransitionError};
pub use store::{StoreError, MAX_CAS_ATTEMPTS};
