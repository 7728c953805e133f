//! In-process room hub for real-time drone tracking.
//!
//! Rooms are broadcast channels keyed by name (`customer:{userId}`,
//! `merchant:{restaurantId}`). Producers push drone snapshots; each WebSocket
//! connection holds one receiver per joined room.
//!
//! ```rust,ignore
//! hub.publish_drone(&drone.snapshot()).await;
//! let rx = hub.subscribe(&TrackingHub::customer_room(user_id)).await;
//! ```

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::common::{RestaurantId, UserId};
use crate::domains::drones::models::DroneSnapshot;

#[derive(Clone)]
pub struct TrackingHub {
    rooms: Arc<RwLock<HashMap<String, broadcast::Sender<Value>>>>,
    capacity: usize,
}

impl TrackingHub {
    /// 256 pending messages per room before slow receivers start lagging.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    pub fn customer_room(user_id: UserId) -> String {
        format!("customer:{}", user_id)
    }

    pub fn merchant_room(restaurant_id: RestaurantId) -> String {
        format!("merchant:{}", restaurant_id)
    }

    /// Send a value to one room. Returns how many receivers got it.
    pub async fn publish(&self, room: &str, value: Value) -> usize {
        let rooms = self.rooms.read().await;
        match rooms.get(room) {
            Some(tx) => tx.send(value).unwrap_or(0),
            None => 0,
        }
    }

    /// Fan a drone update out to the customer and merchant rooms of its
    /// assignment. Docked drones have neither and reach nobody.
    pub async fn publish_drone(&self, snapshot: &DroneSnapshot) -> usize {
        self.publish_drone_to(snapshot, snapshot.customer_id, snapshot.restaurant_id)
            .await
    }

    /// `publish_drone` with explicit rooms. A drone back at its station has
    /// already dropped the assignment it is reporting on.
    pub async fn publish_drone_to(
        &self,
        snapshot: &DroneSnapshot,
        customer_id: Option<UserId>,
        restaurant_id: Option<RestaurantId>,
    ) -> usize {
        let message = json!({ "type": "drone:update", "drone": snapshot });
        let mut delivered = 0;
        if let Some(customer_id) = customer_id {
            delivered += self
                .publish(&Self::customer_room(customer_id), message.clone())
                .await;
        }
        if let Some(restaurant_id) = restaurant_id {
            delivered += self
                .publish(&Self::merchant_room(restaurant_id), message)
                .await;
        }
        delivered
    }

    pub async fn subscribe(&self, room: &str) -> broadcast::Receiver<Value> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drop rooms nobody listens to anymore.
    pub async fn cleanup(&self) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, tx| tx.receiver_count() > 0);
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for TrackingHub {
    fn default() -> Self {
        Self::new()
    }
}
