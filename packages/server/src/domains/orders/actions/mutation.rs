use serde::Serialize;
use tracing::{debug, warn};

use crate::common::{OrderId, MAX_CAS_ATTEMPTS};
use crate::domains::orders::error::OrderError;
use crate::domains::orders::models::Order;
use crate::kernel::OrderServiceDeps;

/// Result of a guarded read-modify-write.
pub(crate) struct Mutation {
    pub order: Order,
    /// False when the guard found nothing to do and no write happened.
    pub changed: bool,
}

/// Read `order_id`, let `apply` edit it, write it back with CAS.
///
/// `apply` returns `Ok(false)` when the order is already in the wanted state;
/// that is an idempotent no-op and nothing is written. On a lost race the
/// whole cycle re-runs against the fresh copy.
pub(crate) async fn mutate_order<F>(
    order_id: OrderId,
    deps: &OrderServiceDeps,
    mut apply: F,
) -> Result<Mutation, OrderError>
where
    F: FnMut(&mut Order) -> Result<bool, OrderError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut order = deps.orders.get(order_id).await?;
        if !apply(&mut order)? {
            return Ok(Mutation {
                order,
                changed: false,
            });
        }

        match deps.orders.update(&order).await {
            Ok(saved) => {
                return Ok(Mutation {
                    order: saved,
                    changed: true,
                })
            }
            Err(e) if e.is_conflict() && attempt < MAX_CAS_ATTEMPTS => {
                debug!(order_id = %order_id, attempt, "Order write lost a race, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

pub(crate) async fn publish<T: Serialize>(
    deps: &OrderServiceDeps,
    exchange: &str,
    routing_key: &str,
    payload: &T,
) -> Result<(), OrderError> {
    let data = serde_json::to_value(payload).map_err(|e| OrderError::Bus(e.into()))?;
    deps.bus
        .publish(exchange, routing_key, routing_key, data)
        .await
        .map_err(OrderError::Bus)
}

/// Give back every line's stock. Failures are logged and skipped; they never
/// block the cancellation that triggered them.
pub(crate) async fn restore_inventory(order: &Order, deps: &OrderServiceDeps) -> usize {
    let mut restored = 0;
    for item in &order.items {
        match deps
            .catalog
            .restore_inventory(item.product_id, item.quantity)
            .await
        {
            Ok(()) => restored += 1,
            Err(e) => warn!(
                order_id = %order.id,
                product_id = %item.product_id,
                quantity = item.quantity,
                error = %e,
                "Inventory restore failed"
            ),
        }
    }
    restored
}
