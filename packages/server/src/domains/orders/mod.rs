pub mod actions;
pub mod error;
pub mod events;
pub mod handlers;
pub mod models;
pub mod store;

pub use error::OrderError;
pub use handlers::register_order_handlers;
