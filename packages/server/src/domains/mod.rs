// Business domains
pub mod drones;
pub mod orders;
