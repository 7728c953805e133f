// Order fulfillment saga and drone dispatch - service core
//
// Two services share this crate: the order service coordinates the
// fulfillment saga over the event bus, the drone service dispatches and
// simulates the delivery fleet. They share no memory at runtime.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
