//! Order persistence.
//!
//! Every update is a compare-and-swap on `revision`: the write lands only if
//! the stored revision still equals the one the caller read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

use super::models::{
    DeliveryAddress, Order, OrderItem, OrderTotals, StatusChange, Tracking,
};
use crate::common::{OrderId, Position, RestaurantId, StoreError, UserId};

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    async fn find(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Orders placed by `customer_id`, newest first.
    async fn list_for_customer(&self, customer_id: UserId) -> Result<Vec<Order>, StoreError>;

    /// Persist `order` if the stored revision equals `order.revision`.
    /// Returns the stored copy with the bumped revision.
    async fn update(&self, order: &Order) -> Result<Order, StoreError>;

    async fn get(&self, id: OrderId) -> Result<Order, StoreError> {
        self.find(id).await?.ok_or_else(|| StoreError::NotFound {
            entity: "order",
            id: id.to_string(),
        })
    }
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        self.orders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(order.id, order.clone());
        Ok(())
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned())
    }

    async fn list_for_customer(&self, customer_id: UserId) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn update(&self, order: &Order) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().unwrap_or_else(|e| e.into_inner());
        let stored = orders.get_mut(&order.id).ok_or_else(|| StoreError::NotFound {
            entity: "order",
            id: order.id.to_string(),
        })?;

        if stored.revision != order.revision {
            return Err(StoreError::Conflict {
                entity: "order",
                id: order.id.to_string(),
                expected: order.revision,
            });
        }

        let mut next = order.clone();
        next.revision += 1;
        *stored = next.clone();
        Ok(next)
    }
}

// =============================================================================
// PostgreSQL store
// =============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    customer_id: UserId,
    restaurant_id: RestaurantId,
    restaurant_location: Json<Position>,
    items: Json<Vec<OrderItem>>,
    delivery_address: Json<DeliveryAddress>,
    totals: Json<OrderTotals>,
    status: String,
    payment_status: String,
    status_history: Json<Vec<StatusChange>>,
    tracking: Json<Tracking>,
    delivery_pin: String,
    revision: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |e: anyhow::Error| StoreError::Corrupt {
            entity: "order",
            message: e.to_string(),
        };

        Ok(Order {
            id: row.id,
            customer_id: row.customer_id,
            restaurant_id: row.restaurant_id,
            restaurant_location: row.restaurant_location.0,
            items: row.items.0,
            delivery_address: row.delivery_address.0,
            totals: row.totals.0,
            status: row.status.parse().map_err(corrupt)?,
            payment_status: row.payment_status.parse().map_err(corrupt)?,
            status_history: row.status_history.0,
            tracking: row.tracking.0,
            delivery_pin: row.delivery_pin,
            revision: row.revision,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, restaurant_id, restaurant_location, items,
                delivery_address, totals, status, payment_status, status_history,
                tracking, delivery_pin, revision, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.restaurant_id)
        .bind(Json(&order.restaurant_location))
        .bind(Json(&order.items))
        .bind(Json(&order.delivery_address))
        .bind(Json(&order.totals))
        .bind(order.status.to_string())
        .bind(order.payment_status.to_string())
        .bind(Json(&order.status_history))
        .bind(Json(&order.tracking))
        .bind(&order.delivery_pin)
        .bind(order.revision)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn list_for_customer(&self, customer_id: UserId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE customer_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn update(&self, order: &Order) -> Result<Order, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            UPDATE orders
            SET items = $3,
                totals = $4,
                status = $5,
                payment_status = $6,
                status_history = $7,
                tracking = $8,
                updated_at = $9,
                revision = revision + 1
            WHERE id = $1 AND revision = $2
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(order.revision)
        .bind(Json(&order.items))
        .bind(Json(&order.totals))
        .bind(order.status.to_string())
        .bind(order.payment_status.to_string())
        .bind(Json(&order.status_history))
        .bind(Json(&order.tracking))
        .bind(order.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Order::try_from(row),
            // Distinguish a lost race from a missing row.
            None => match self.find(order.id).await? {
                Some(_) => Err(StoreError::Conflict {
                    entity: "order",
                    id: order.id.to_string(),
                    expected: order.revision,
                }),
                None => Err(StoreError::NotFound {
                    entity: "order",
                    id: order.id.to_string(),
                }),
            },
        }
    }
}
