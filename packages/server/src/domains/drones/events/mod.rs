//! Drone lifecycle events, published on the `drones` exchange.
//!
//! The order service consumes these to advance delivery and append tracking
//! entries; there is no other channel between the two services.

use serde::{Deserialize, Serialize};

use super::models::{ArrivalPoint, Drone, DroneStatus};
use crate::common::{DroneId, OrderId, Position};

pub const DRONES_EXCHANGE: &str = "drones";

pub const DRONE_ASSIGNED: &str = "drone.assigned";
pub const DRONE_DELIVERY_STARTED: &str = "drone.delivery.started";
pub const DRONE_ARRIVED: &str = "drone.arrived";
/// Customer verified the PIN and took the parcel.
pub const DRONE_DELIVERY_COMPLETED: &str = "drone.delivery.completed";
pub const DRONE_RECALLED: &str = "drone.recalled";
/// Back at the home station, assignment cleared.
pub const DRONE_RETURNED: &str = "drone.returned";

/// Subscription pattern covering every drone event.
pub const ALL_DRONE_EVENTS: &str = "drone.#";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DroneEvent {
    pub drone_id: DroneId,
    pub order_id: OrderId,
    pub status: DroneStatus,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrived_at: Option<ArrivalPoint>,
}

impl DroneEvent {
    pub fn new(drone: &Drone, order_id: OrderId, arrived_at: Option<ArrivalPoint>) -> Self {
        Self {
            drone_id: drone.id,
            order_id,
            status: drone.status,
            position: drone.position,
            arrived_at,
        }
    }
}
