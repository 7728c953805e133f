//! Drone domain actions - dispatch, fleet bootstrap and the simulation loop.

pub mod dispatch;
pub mod fleet;
pub mod selection;
pub mod simulation;

pub use dispatch::{
    assign_pickup, get_drone_for_order, list_available_drones, list_drones, recall,
    start_delivery, verify_pin,
};
pub use fleet::seed_fleet;
pub use selection::select_nearest;
pub use simulation::{DroneSimulation, TickOutcome};
