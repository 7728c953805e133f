use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::status::{OrderStatus, PaymentStatus};
use crate::common::{
    ensure_transition, Actor, DroneId, Lifecycle, OrderId, Position, ProductId, RestaurantId,
    TransitionError, UserId,
};

/// Order - the saga's aggregate. Never deleted, only terminalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub customer_id: UserId,
    pub restaurant_id: RestaurantId,
    /// Captured from the catalog at creation.
    pub restaurant_location: Position,
    pub items: Vec<OrderItem>,
    pub delivery_address: DeliveryAddress,
    pub totals: OrderTotals,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub status_history: Vec<StatusChange>,
    pub tracking: Tracking,
    /// 4 digits, zero padded. Empty once redacted for a non-owner.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub delivery_pin: String,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalized copy of a catalog product at order time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    /// Discounted unit price when the product was on sale.
    pub unit_price: Decimal,
    pub quantity: u32,
    pub modifiers: Vec<ItemModifier>,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemModifier {
    pub id: String,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub street: String,
    pub lat: f64,
    pub lng: f64,
}

impl DeliveryAddress {
    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub service_fee: Decimal,
    pub delivery_fee: Decimal,
    pub tip: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Append-only history entry. `from` is `None` for the creation entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStep {
    Placed,
    Confirmed,
    Preparing,
    Ready,
    DroneAssigned,
    DroneAtRestaurant,
    OutForDelivery,
    DroneAtCustomer,
    Delivered,
    DroneReturned,
    Cancelled,
}

impl TrackingStep {
    /// Step shown to the customer when the order enters `status`.
    pub fn for_status(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Pending => TrackingStep::Placed,
            OrderStatus::Confirmed => TrackingStep::Confirmed,
            OrderStatus::Preparing => TrackingStep::Preparing,
            OrderStatus::Ready => TrackingStep::Ready,
            OrderStatus::OutForDelivery => TrackingStep::OutForDelivery,
            OrderStatus::Delivered => TrackingStep::Delivered,
            OrderStatus::Cancelled => TrackingStep::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEntry {
    pub step: TrackingStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drone_id: Option<DroneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

/// Customer-facing projection: current step plus the event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tracking {
    pub current_step: TrackingStep,
    pub events: Vec<TrackingEntry>,
}

impl Order {
    /// Build a freshly placed order: `pending`, unpaid, history `∅ → pending`.
    #[allow(clippy::too_many_arguments)]
    pub fn place(
        customer_id: UserId,
        restaurant_id: RestaurantId,
        restaurant_location: Position,
        items: Vec<OrderItem>,
        delivery_address: DeliveryAddress,
        totals: OrderTotals,
        delivery_pin: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            customer_id,
            restaurant_id,
            restaurant_location,
            items,
            delivery_address,
            totals,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            status_history: vec![StatusChange {
                from: None,
                to: OrderStatus::Pending,
                reason: "order placed".to_string(),
                at: now,
            }],
            tracking: Tracking {
                current_step: TrackingStep::Placed,
                events: vec![TrackingEntry {
                    step: TrackingStep::Placed,
                    drone_id: None,
                    note: None,
                    at: now,
                }],
            },
            delivery_pin,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The order as `actor` may see it. Only the customer and admins keep
    /// the delivery PIN.
    pub fn visible_to(mut self, actor: &Actor) -> Self {
        if actor.user_id != self.customer_id && !actor.is_admin() {
            self.delivery_pin.clear();
        }
        self
    }

    /// Validated status move. Appends history and advances tracking.
    pub fn transition(&mut self, to: OrderStatus, reason: &str) -> Result<(), TransitionError> {
        ensure_transition(self.status, to)?;

        let now = Utc::now();
        self.status_history.push(StatusChange {
            from: Some(self.status),
            to,
            reason: reason.to_string(),
            at: now,
        });
        self.status = to;
        self.push_tracking(TrackingStep::for_status(to), None, None, now);
        self.updated_at = now;
        Ok(())
    }

    /// Append a tracking entry unless `(step, drone_id)` is already logged.
    /// Returns whether anything changed.
    pub fn record_tracking(
        &mut self,
        step: TrackingStep,
        drone_id: Option<DroneId>,
        note: Option<String>,
    ) -> bool {
        let seen = self
            .tracking
            .events
            .iter()
            .any(|e| e.step == step && e.drone_id == drone_id);
        if seen {
            return false;
        }

        let now = Utc::now();
        self.push_tracking(step, drone_id, note, now);
        // A terminal order keeps its final step; later entries are log only.
        if self.status.is_terminal() {
            self.tracking.current_step = TrackingStep::for_status(self.status);
        }
        self.updated_at = now;
        true
    }

    fn push_tracking(
        &mut self,
        step: TrackingStep,
        drone_id: Option<DroneId>,
        note: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.tracking.current_step = step;
        self.tracking.events.push(TrackingEntry {
            step,
            drone_id,
            note,
            at,
        });
    }

    pub fn delivery_position(&self) -> Position {
        self.delivery_address.position()
    }
}
