// HTTP routes
pub mod drones;
pub mod health;
pub mod orders;
pub mod tracking;

pub use drones::*;
pub use health::*;
pub use orders::*;
pub use tracking::*;
