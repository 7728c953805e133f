//! Order saga events.
//!
//! The order service publishes on `orders` and consumes `payments`. Payloads
//! are camelCase JSON inside the bus envelope.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::models::{Order, OrderStatus, PaymentStatus};
use crate::common::{OrderId, ProductId, RestaurantId, UserId};

pub const ORDERS_EXCHANGE: &str = "orders";
pub const PAYMENTS_EXCHANGE: &str = "payments";

pub const ORDER_CREATED: &str = "order.created";
pub const ORDER_UPDATED: &str = "order.updated";
pub const ORDER_CANCELLED: &str = "order.cancelled";
pub const PAYMENT_REQUIRED: &str = "payment.required";
pub const PAYMENT_COMPLETED: &str = "payment.completed";
pub const PAYMENT_FAILED: &str = "payment.failed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub restaurant_id: RestaurantId,
    pub items: Vec<OrderLine>,
    pub total: Decimal,
}

/// Asks the payment collaborator to charge the customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdated {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub restaurant_id: RestaurantId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub restaurant_id: RestaurantId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompleted {
    pub order_id: OrderId,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
    pub order_id: OrderId,
    #[serde(default)]
    pub reason: Option<String>,
}

impl From<&Order> for OrderCreated {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id,
            restaurant_id: order.restaurant_id,
            items: order
                .items
                .iter()
                .map(|item| OrderLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
            total: order.totals.total,
        }
    }
}

impl From<&Order> for PaymentRequired {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id,
            amount: order.totals.total,
        }
    }
}

impl From<&Order> for OrderUpdated {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id,
            restaurant_id: order.restaurant_id,
            status: order.status,
            payment_status: order.payment_status,
        }
    }
}

impl OrderCancelled {
    pub fn new(order: &Order, reason: &str) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id,
            restaurant_id: order.restaurant_id,
            reason: reason.to_string(),
        }
    }
}
