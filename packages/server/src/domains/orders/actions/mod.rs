//! Orders domain actions - the saga coordinator's entry points.
//!
//! HTTP routes call the caller-driven actions; bus subscriptions call the
//! payment and delivery continuations.

pub mod create;
pub mod delivery;
mod mutation;
pub mod payments;
pub mod pricing;
pub mod queries;
pub mod transitions;

pub use create::{create_order, CreateOrderInput, OrderItemInput};
pub use delivery::handle_drone_event;
pub use payments::{handle_payment_completed, handle_payment_failed};
pub use queries::{get_order, list_orders};
pub use transitions::{cancel_order, complete_order, mark_ready, restaurant_confirm};
