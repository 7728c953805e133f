//! Drone events as seen by the order saga.
//!
//! Tracking entries are deduplicated on `(step, droneId)`; status moves are
//! guarded on the current status, so redelivered events change nothing.

use tracing::{debug, info, warn};

use super::mutation::{mutate_order, publish};
use crate::domains::drones::events::{
    DroneEvent, DRONE_ARRIVED, DRONE_ASSIGNED, DRONE_DELIVERY_COMPLETED, DRONE_DELIVERY_STARTED,
    DRONE_RETURNED,
};
use crate::domains::drones::models::ArrivalPoint;
use crate::domains::orders::error::OrderError;
use crate::domains::orders::events::{OrderUpdated, ORDERS_EXCHANGE, ORDER_UPDATED};
use crate::domains::orders::models::{Order, OrderStatus, TrackingStep};
use crate::kernel::OrderServiceDeps;

enum Effect {
    Track(TrackingStep),
    Advance {
        from: OrderStatus,
        to: OrderStatus,
        reason: &'static str,
    },
}

fn effect_of(event_type: &str, event: &DroneEvent) -> Option<Effect> {
    match event_type {
        DRONE_ASSIGNED => Some(Effect::Track(TrackingStep::DroneAssigned)),
        DRONE_ARRIVED => match event.arrived_at {
            Some(ArrivalPoint::Restaurant) => Some(Effect::Track(TrackingStep::DroneAtRestaurant)),
            Some(ArrivalPoint::Customer) => Some(Effect::Track(TrackingStep::DroneAtCustomer)),
            _ => None,
        },
        DRONE_RETURNED => Some(Effect::Track(TrackingStep::DroneReturned)),
        DRONE_DELIVERY_STARTED => Some(Effect::Advance {
            from: OrderStatus::Ready,
            to: OrderStatus::OutForDelivery,
            reason: "drone left the restaurant",
        }),
        DRONE_DELIVERY_COMPLETED => Some(Effect::Advance {
            from: OrderStatus::OutForDelivery,
            to: OrderStatus::Delivered,
            reason: "delivery PIN verified",
        }),
        _ => None,
    }
}

/// Apply one drone event. Returns whether the order changed.
pub async fn handle_drone_event(
    event_type: &str,
    event: DroneEvent,
    deps: &OrderServiceDeps,
) -> Result<bool, OrderError> {
    let Some(effect) = effect_of(event_type, &event) else {
        debug!(event_type, order_id = %event.order_id, "Drone event has no order effect");
        return Ok(false);
    };

    if deps.orders.find(event.order_id).await?.is_none() {
        warn!(event_type, order_id = %event.order_id, "Drone event for unknown order");
        return Ok(false);
    }

    let drone_id = event.drone_id;
    let mutation = mutate_order(event.order_id, deps, |order| match &effect {
        Effect::Track(step) => Ok(order.record_tracking(*step, Some(drone_id), None)),
        Effect::Advance { from, to, reason } => advance(order, *from, *to, reason),
    })
    .await?;

    if !mutation.changed {
        debug!(event_type, order_id = %event.order_id, "Drone event already applied");
        return Ok(false);
    }

    if let Effect::Advance { .. } = effect {
        info!(order_id = %event.order_id, drone_id = %drone_id, status = %mutation.order.status, "Order advanced by drone");
        publish(
            deps,
            ORDERS_EXCHANGE,
            ORDER_UPDATED,
            &OrderUpdated::from(&mutation.order),
        )
        .await?;
    }
    Ok(true)
}

fn advance(
    order: &mut Order,
    from: OrderStatus,
    to: OrderStatus,
    reason: &str,
) -> Result<bool, OrderError> {
    if order.status == from {
        order.transition(to, reason)?;
        return Ok(true);
    }
    if order.status != to {
        warn!(order_id = %order.id, status = %order.status, expected = %from, "Drone event out of step with order");
    }
    Ok(false)
}
