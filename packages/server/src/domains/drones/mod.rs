pub mod actions;
pub mod error;
pub mod events;
pub mod models;
pub mod store;

pub use error::DispatchError;
