//! Caller-driven order transitions: customer cancel and operator steps.

use tracing::info;

use super::mutation::{mutate_order, publish, restore_inventory};
use crate::common::{Actor, AuthError, OrderId};
use crate::domains::orders::error::OrderError;
use crate::domains::orders::events::{
    OrderCancelled, OrderUpdated, ORDERS_EXCHANGE, ORDER_CANCELLED, ORDER_UPDATED,
};
use crate::domains::orders::models::{Order, OrderStatus};
use crate::kernel::OrderServiceDeps;

/// Owner or admin cancels a pending order. Stock is given back per line,
/// best-effort, after the cancellation is committed.
pub async fn cancel_order(
    actor: &Actor,
    order_id: OrderId,
    deps: &OrderServiceDeps,
) -> Result<Order, OrderError> {
    let current = deps.orders.get(order_id).await?;
    if current.customer_id != actor.user_id && !actor.is_admin() {
        return Err(AuthError::PermissionDenied(format!(
            "order {} belongs to another customer",
            order_id
        ))
        .into());
    }

    let reason = if actor.is_admin() && current.customer_id != actor.user_id {
        "cancelled by admin"
    } else {
        "cancelled by customer"
    };

    let cancelled = mutate_order(order_id, deps, |order| {
        if order.status != OrderStatus::Pending {
            return Err(OrderError::Conflict(format!(
                "order {} is {}; only pending orders can be cancelled",
                order.id, order.status
            )));
        }
        order.transition(OrderStatus::Cancelled, reason)?;
        Ok(true)
    })
    .await?
    .order;

    let restored = restore_inventory(&cancelled, deps).await;
    info!(order_id = %order_id, restored, lines = cancelled.items.len(), "Order cancelled");

    publish(
        deps,
        ORDERS_EXCHANGE,
        ORDER_CANCELLED,
        &OrderCancelled::new(&cancelled, reason),
    )
    .await?;
    Ok(cancelled)
}

/// Kitchen accepted the paid order: `confirmed → preparing`.
pub async fn restaurant_confirm(
    actor: &Actor,
    order_id: OrderId,
    deps: &OrderServiceDeps,
) -> Result<Order, OrderError> {
    operator_transition(actor, order_id, OrderStatus::Preparing, "accepted by restaurant", deps)
        .await
}

/// `preparing → ready`; the drone may now leave with it.
pub async fn mark_ready(
    actor: &Actor,
    order_id: OrderId,
    deps: &OrderServiceDeps,
) -> Result<Order, OrderError> {
    operator_transition(actor, order_id, OrderStatus::Ready, "ready for pickup", deps).await
}

/// Manual close-out: `out_for_delivery → delivered`.
pub async fn complete_order(
    actor: &Actor,
    order_id: OrderId,
    deps: &OrderServiceDeps,
) -> Result<Order, OrderError> {
    operator_transition(actor, order_id, OrderStatus::Delivered, "completed by operator", deps)
        .await
}

async fn operator_transition(
    actor: &Actor,
    order_id: OrderId,
    to: OrderStatus,
    reason: &str,
    deps: &OrderServiceDeps,
) -> Result<Order, OrderError> {
    let current = deps.orders.get(order_id).await?;
    actor.require_operator_of(current.restaurant_id)?;

    let updated = mutate_order(order_id, deps, |order| {
        order.transition(to, reason)?;
        Ok(true)
    })
    .await?
    .order;

    info!(order_id = %order_id, status = %updated.status, "Order advanced by operator");
    publish(deps, ORDERS_EXCHANGE, ORDER_UPDATED, &OrderUpdated::from(&updated)).await?;
    Ok(updated.visible_to(actor))
}
