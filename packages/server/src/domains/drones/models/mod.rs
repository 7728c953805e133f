pub mod drone;
pub mod status;

pub use drone::{normalize_pin, ArrivalPoint, Assignment, Drone, DroneSnapshot};
pub use status::DroneStatus;
