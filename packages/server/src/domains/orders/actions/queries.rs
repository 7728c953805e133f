use crate::common::{Actor, AuthError, OrderId};
use crate::domains::orders::error::OrderError;
use crate::domains::orders::models::Order;
use crate::kernel::OrderServiceDeps;

/// Visible to the customer, the restaurant's operators and admins.
pub async fn get_order(
    actor: &Actor,
    order_id: OrderId,
    deps: &OrderServiceDeps,
) -> Result<Order, OrderError> {
    let order = deps.orders.get(order_id).await?;
    if !actor.can_view(order.customer_id, order.restaurant_id) {
        return Err(AuthError::PermissionDenied(format!("order {} is not yours", order_id)).into());
    }
    Ok(order.visible_to(actor))
}

/// The caller's own orders, newest first.
pub async fn list_orders(actor: &Actor, deps: &OrderServiceDeps) -> Result<Vec<Order>, OrderError> {
    Ok(deps.orders.list_for_customer(actor.user_id).await?)
}
