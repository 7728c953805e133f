//! Payment outcomes from the payment collaborator.
//!
//! Delivery is at-least-once, so both continuations re-check state and treat
//! an already-applied outcome as a no-op.

use tracing::{debug, info, warn};

use super::mutation::{mutate_order, publish, restore_inventory};
use crate::common::ensure_transition;
use crate::domains::orders::error::OrderError;
use crate::domains::orders::events::{
    OrderCancelled, OrderUpdated, PaymentCompleted, PaymentFailed, ORDERS_EXCHANGE,
    ORDER_CANCELLED, ORDER_UPDATED,
};
use crate::domains::orders::models::{OrderStatus, PaymentStatus};
use crate::kernel::OrderServiceDeps;

const PAYMENT_FAILED_REASON: &str = "payment failed";

/// Paid: `pending → confirmed`. Returns whether the order changed.
pub async fn handle_payment_completed(
    event: PaymentCompleted,
    deps: &OrderServiceDeps,
) -> Result<bool, OrderError> {
    if deps.orders.find(event.order_id).await?.is_none() {
        warn!(order_id = %event.order_id, "Payment completed for unknown order");
        return Ok(false);
    }

    let mutation = mutate_order(event.order_id, deps, |order| {
        if order.status != OrderStatus::Pending {
            return Ok(false);
        }
        ensure_transition(order.payment_status, PaymentStatus::Completed)?;
        order.payment_status = PaymentStatus::Completed;
        order.transition(OrderStatus::Confirmed, "payment completed")?;
        Ok(true)
    })
    .await?;

    if !mutation.changed {
        debug!(order_id = %event.order_id, status = %mutation.order.status, "Payment completion already applied");
        return Ok(false);
    }

    info!(order_id = %event.order_id, transaction_id = ?event.transaction_id, "Payment completed, order confirmed");
    publish(
        deps,
        ORDERS_EXCHANGE,
        ORDER_UPDATED,
        &OrderUpdated::from(&mutation.order),
    )
    .await?;
    Ok(true)
}

/// Payment declined: mark it, cancel the order and give the stock back.
/// Returns whether the order changed.
pub async fn handle_payment_failed(
    event: PaymentFailed,
    deps: &OrderServiceDeps,
) -> Result<bool, OrderError> {
    if deps.orders.find(event.order_id).await?.is_none() {
        warn!(order_id = %event.order_id, "Payment failed for unknown order");
        return Ok(false);
    }

    // Set only when this write is the one that cancels. An order the
    // customer already cancelled has had its stock returned.
    let mut cancelled_here = false;
    let mutation = mutate_order(event.order_id, deps, |order| {
        cancelled_here = false;
        if order.payment_status != PaymentStatus::Pending {
            return Ok(false);
        }
        order.payment_status = PaymentStatus::Failed;
        if order.status == OrderStatus::Pending {
            order.transition(OrderStatus::Cancelled, PAYMENT_FAILED_REASON)?;
            cancelled_here = true;
        }
        Ok(true)
    })
    .await?;

    if !mutation.changed {
        debug!(order_id = %event.order_id, "Payment failure already applied");
        return Ok(false);
    }

    let order = mutation.order;
    warn!(order_id = %order.id, reason = ?event.reason, "Payment failed");

    if cancelled_here {
        restore_inventory(&order, deps).await;
        publish(
            deps,
            ORDERS_EXCHANGE,
            ORDER_CANCELLED,
            &OrderCancelled::new(&order, PAYMENT_FAILED_REASON),
        )
        .await?;
    }
    Ok(true)
}
