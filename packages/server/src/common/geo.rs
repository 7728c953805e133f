//! Flat-earth geometry for city-scale dispatch.
//!
//! Distances are Euclidean in degree space. That is good enough for picking
//! the nearest drone and moving it across a city; it is not geodesic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Planar distance in degrees.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let d_lat = other.lat - self.lat;
        let d_lng = other.lng - self.lng;
        (d_lat * d_lat + d_lng * d_lng).sqrt()
    }

    /// Moves `step` degrees toward `target`, stopping on it rather than past it.
    pub fn step_toward(&self, target: &Position, step: f64) -> Position {
        let distance = self.distance_to(target);
        if distance <= step || distance == 0.0 {
            return *target;
        }
        let ratio = step / distance;
        Position {
            lat: self.lat + (target.lat - self.lat) * ratio,
            lng: self.lng + (target.lng - self.lng) * ratio,
        }
    }
}
