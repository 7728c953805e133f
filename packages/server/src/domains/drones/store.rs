//! Drone persistence.
//!
//! Writes are compare-and-swap on `revision`. An order can be bound to at most
//! one drone: the in-memory store checks it on write, Postgres enforces it
//! with a unique index on `assigned_order`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::models::Drone;
use crate::common::{DroneId, OrderId, Position, RestaurantId, StoreError, UserId};

#[async_trait]
pub trait DroneStore: Send + Sync {
    async fn insert(&self, drone: &Drone) -> Result<(), StoreError>;

    async fn find(&self, id: DroneId) -> Result<Option<Drone>, StoreError>;

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Drone>, StoreError>;

    /// Whole fleet, ordered by drone id.
    async fn list(&self) -> Result<Vec<Drone>, StoreError>;

    /// Persist `drone` if the stored revision equals `drone.revision`.
    /// Returns the stored copy with the bumped revision.
    async fn update(&self, drone: &Drone) -> Result<Drone, StoreError>;

    async fn get(&self, id: DroneId) -> Result<Drone, StoreError> {
        self.find(id).await?.ok_or_else(|| StoreError::NotFound {
            entity: "drone",
            id: id.to_string(),
        })
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.list().await?.len())
    }
}

fn conflict(drone: &Drone) -> StoreError {
    StoreError::Conflict {
        entity: "drone",
        id: drone.id.to_string(),
        expected: drone.revision,
    }
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
pub struct InMemoryDroneStore {
    drones: RwLock<BTreeMap<DroneId, Drone>>,
}

impl InMemoryDroneStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DroneStore for InMemoryDroneStore {
    async fn insert(&self, drone: &Drone) -> Result<(), StoreError> {
        self.drones
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(drone.id, drone.clone());
        Ok(())
    }

    async fn find(&self, id: DroneId) -> Result<Option<Drone>, StoreError> {
        Ok(self
            .drones
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned())
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Drone>, StoreError> {
        Ok(self
            .drones
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|d| d.assigned_order == Some(order_id))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Drone>, StoreError> {
        Ok(self
            .drones
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect())
    }

    async fn update(&self, drone: &Drone) -> Result<Drone, StoreError> {
        let mut drones = self.drones.write().unwrap_or_else(|e| e.into_inner());

        if let Some(order_id) = drone.assigned_order {
            let held_elsewhere = drones
                .values()
                .any(|d| d.id != drone.id && d.assigned_order == Some(order_id));
            if held_elsewhere {
                return Err(conflict(drone));
            }
        }

        let stored = drones.get_mut(&drone.id).ok_or_else(|| StoreError::NotFound {
            entity: "drone",
            id: drone.id.to_string(),
        })?;
        if stored.revision != drone.revision {
            return Err(conflict(drone));
        }

        let mut next = drone.clone();
        next.revision += 1;
        *stored = next.clone();
        Ok(next)
    }
}

// =============================================================================
// PostgreSQL store
// =============================================================================

#[derive(sqlx::FromRow)]
struct DroneRow {
    id: DroneId,
    name: String,
    home_station: Json<Position>,
    position: Json<Position>,
    status: String,
    assigned_order: Option<OrderId>,
    target: Option<Json<Position>>,
    battery: f64,
    delivery_pin: Option<String>,
    arrived_at_customer: bool,
    unlocked: bool,
    restaurant_location: Option<Json<Position>>,
    customer_location: Option<Json<Position>>,
    customer_id: Option<UserId>,
    restaurant_id: Option<RestaurantId>,
    revision: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DroneRow> for Drone {
    type Error = StoreError;

    fn try_from(row: DroneRow) -> Result<Self, Self::Error> {
        Ok(Drone {
            id: row.id,
            name: row.name,
            home_station: row.home_station.0,
            position: row.position.0,
            status: row.status.parse().map_err(|e: anyhow::Error| StoreError::Corrupt {
                entity: "drone",
                message: e.to_string(),
            })?,
            assigned_order: row.assigned_order,
            target: row.target.map(|t| t.0),
            battery: row.battery,
            delivery_pin: row.delivery_pin,
            arrived_at_customer: row.arrived_at_customer,
            unlocked: row.unlocked,
            restaurant_location: row.restaurant_location.map(|p| p.0),
            customer_location: row.customer_location.map(|p| p.0),
            customer_id: row.customer_id,
            restaurant_id: row.restaurant_id,
            revision: row.revision,
            updated_at: row.updated_at,
        })
    }
}

pub struct PgDroneStore {
    pool: PgPool,
}

impl PgDroneStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DroneStore for PgDroneStore {
    async fn insert(&self, drone: &Drone) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO drones (
                id, name, home_station, position, status, assigned_order, target,
                battery, delivery_pin, arrived_at_customer, unlocked,
                restaurant_location, customer_location, customer_id, restaurant_id,
                revision, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(drone.id)
        .bind(&drone.name)
        .bind(Json(drone.home_station))
        .bind(Json(drone.position))
        .bind(drone.status.to_string())
        .bind(drone.assigned_order)
        .bind(drone.target.map(Json))
        .bind(drone.battery)
        .bind(&drone.delivery_pin)
        .bind(drone.arrived_at_customer)
        .bind(drone.unlocked)
        .bind(drone.restaurant_location.map(Json))
        .bind(drone.customer_location.map(Json))
        .bind(drone.customer_id)
        .bind(drone.restaurant_id)
        .bind(drone.revision)
        .bind(drone.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: DroneId) -> Result<Option<Drone>, StoreError> {
        let row = sqlx::query_as::<_, DroneRow>("SELECT * FROM drones WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Drone::try_from).transpose()
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Drone>, StoreError> {
        let row = sqlx::query_as::<_, DroneRow>("SELECT * FROM drones WHERE assigned_order = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Drone::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Drone>, StoreError> {
        let rows = sqlx::query_as::<_, DroneRow>("SELECT * FROM drones ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Drone::try_from).collect()
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM drones")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn update(&self, drone: &Drone) -> Result<Drone, StoreError> {
        let result = sqlx::query_as::<_, DroneRow>(
            r#"
            UPDATE drones
            SET position = $3,
                status = $4,
                assigned_order = $5,
                target = $6,
                battery = $7,
                delivery_pin = $8,
                arrived_at_customer = $9,
                unlocked = $10,
                restaurant_location = $11,
                customer_location = $12,
                customer_id = $13,
                restaurant_id = $14,
                updated_at = $15,
                revision = revision + 1
            WHERE id = $1 AND revision = $2
            RETURNING *
            "#,
        )
        .bind(drone.id)
        .bind(drone.revision)
        .bind(Json(drone.position))
        .bind(drone.status.to_string())
        .bind(drone.assigned_order)
        .bind(drone.target.map(Json))
        .bind(drone.battery)
        .bind(&drone.delivery_pin)
        .bind(drone.arrived_at_customer)
        .bind(drone.unlocked)
        .bind(drone.restaurant_location.map(Json))
        .bind(drone.customer_location.map(Json))
        .bind(drone.customer_id)
        .bind(drone.restaurant_id)
        .bind(drone.updated_at)
        .fetch_optional(&self.pool)
        .await;

        let row = match result {
            Ok(row) => row,
            // Another drone already holds this order.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(conflict(drone))
            }
            Err(e) => return Err(e.into()),
        };

        match row {
            Some(row) => Drone::try_from(row),
            None => match self.find(drone.id).await? {
                Some(_) => Err(conflict(drone)),
                None => Err(StoreError::NotFound {
                    entity: "drone",
                    id: drone.id.to_string(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::drones::models::{Assignment, DroneStatus};

    fn assignment(order_id: OrderId) -> Assignment {
        Assignment {
            order_id,
            restaurant_location: Position::new(10.78, 106.70),
            customer_location: Position::new(10.79, 106.71),
            delivery_pin: "1111".to_string(),
            customer_id: UserId::new(),
            restaurant_id: RestaurantId::new(),
        }
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_id() {
        let store = InMemoryDroneStore::new();
        let home = Position::new(10.77, 106.69);
        let mut ids = Vec::new();
        for name in ["c", "a", "b"] {
            let drone = Drone::docked(name, home);
            ids.push(drone.id);
            store.insert(&drone).await.unwrap();
        }
        ids.sort();

        let listed: Vec<DroneId> = store.list().await.unwrap().iter().map(|d| d.id).collect();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn test_order_cannot_be_held_by_two_drones() {
        let store = InMemoryDroneStore::new();
        let home = Position::new(10.77, 106.69);
        let mut first = Drone::docked("one", home);
        let mut second = Drone::docked("two", home);
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        let order_id = OrderId::new();
        first.assign(&assignment(order_id)).unwrap();
        second.assign(&assignment(order_id)).unwrap();

        store.update(&first).await.unwrap();
        assert!(store.update(&second).await.unwrap_err().is_conflict());

        let holder = store.find_by_order(order_id).await.unwrap().unwrap();
        assert_eq!(holder.id, first.id);
        assert_eq!(
            store.get(second.id).await.unwrap().status,
            DroneStatus::Available
        );
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts() {
        let store = InMemoryDroneStore::new();
        let drone = Drone::docked("one", Position::new(10.77, 106.69));
        store.insert(&drone).await.unwrap();

        let mut tick_copy = drone.clone();
        tick_copy.recharge(1.0);
        let mut operator_copy = drone.clone();
        operator_copy.assign(&assignment(OrderId::new())).unwrap();

        store.update(&operator_copy).await.unwrap();
        // Full battery: recharge changed nothing, but the write still races.
        assert!(store.update(&tick_copy).await.unwrap_err().is_conflict());
    }
}
