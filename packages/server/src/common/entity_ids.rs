//! Typed ID definitions for every entity the services exchange.
//!
//! Orders and drones are owned here; users, restaurants and products are
//! owned by external collaborators and only referenced.

pub use super::id::Id;

/// Entity marker types. Kept in their own module so they never shadow the
/// domain models that share their names.
pub mod markers {
    pub struct Order;
    pub struct Drone;
    /// Customers, merchants and admins issued by the auth service.
    pub struct User;
    pub struct Restaurant;
    pub struct Product;
}

pub type OrderId = Id<markers::Order>;
pub type DroneId = Id<markers::Drone>;
pub type UserId = Id<markers::User>;
pub type RestaurantId = Id<markers::Restaurant>;
pub type ProductId = Id<markers::Product>;
