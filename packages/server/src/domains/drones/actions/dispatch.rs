//! Drone dispatch actions - operator and customer entry points.
//!
//! Every write is a compare-and-swap on the drone's revision. A lost race
//! re-reads, re-validates and tries again, up to `MAX_CAS_ATTEMPTS` times.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::{Actor, AuthError, DroneId, OrderId, Role, MAX_CAS_ATTEMPTS};
use crate::domains::drones::error::DispatchError;
use crate::domains::drones::events::{
    DroneEvent, DRONES_EXCHANGE, DRONE_ASSIGNED, DRONE_DELIVERY_COMPLETED, DRONE_DELIVERY_STARTED,
    DRONE_RECALLED,
};
use crate::domains::drones::models::{ArrivalPoint, Assignment, Drone, DroneSnapshot};
use crate::domains::orders::models::{Order, OrderStatus};
use crate::kernel::{DroneServiceDeps, ServiceClientError};

use super::select_nearest;

/// Bind the nearest eligible drone to `order_id` and send it to the restaurant.
pub async fn assign_pickup(
    actor: &Actor,
    order_id: OrderId,
    bearer: &str,
    deps: &DroneServiceDeps,
) -> Result<DroneSnapshot, DispatchError> {
    let order = fetch_order(order_id, bearer, deps).await?;
    actor.require_operator_of(order.restaurant_id)?;

    if !order.status.is_dispatchable() {
        return Err(DispatchError::OrderNotDispatchable {
            order_id,
            status: order.status,
            expected: "confirmed, preparing or ready",
        });
    }

    let assignment = Assignment {
        order_id,
        restaurant_location: order.restaurant_location,
        customer_location: order.delivery_position(),
        delivery_pin: delivery_pin_of(&order, deps).await?,
        customer_id: order.customer_id,
        restaurant_id: order.restaurant_id,
    };

    let mut attempt = 0;
    let drone = loop {
        attempt += 1;
        if deps.drones.find_by_order(order_id).await?.is_some() {
            return Err(DispatchError::AlreadyAssigned(order_id));
        }

        let fleet = deps.drones.list().await?;
        let mut drone = select_nearest(
            &fleet,
            assignment.restaurant_location,
            deps.simulation.min_battery,
        )
        .cloned()
        .ok_or(DispatchError::NoDroneAvailable)?;
        drone.assign(&assignment)?;

        match deps.drones.update(&drone).await {
            Ok(saved) => break saved,
            Err(e) if e.is_conflict() && attempt < MAX_CAS_ATTEMPTS => {
                debug!(order_id = %order_id, drone_id = %drone.id, attempt, "Assignment lost a write race, retrying");
            }
            // A concurrent assign may have won with another drone.
            Err(e) if e.is_conflict() => {
                if deps.drones.find_by_order(order_id).await?.is_some() {
                    return Err(DispatchError::AlreadyAssigned(order_id));
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }
    };

    info!(order_id = %order_id, drone_id = %drone.id, "Drone assigned for pickup");
    announce(&drone, order_id, DRONE_ASSIGNED, None, deps).await?;
    Ok(drone.snapshot())
}

/// Send the drone holding `order_id` from the restaurant to the customer.
/// The kitchen must have marked the order ready.
pub async fn start_delivery(
    actor: &Actor,
    order_id: OrderId,
    bearer: &str,
    deps: &DroneServiceDeps,
) -> Result<DroneSnapshot, DispatchError> {
    let order = fetch_order(order_id, bearer, deps).await?;
    actor.require_operator_of(order.restaurant_id)?;

    if order.status != OrderStatus::Ready {
        return Err(DispatchError::OrderNotDispatchable {
            order_id,
            status: order.status,
            expected: "ready",
        });
    }

    let drone_id = drone_for_order(order_id, deps).await?.id;
    let drone = mutate_drone(drone_id, deps, |drone| {
        ensure_holds(drone, order_id)?;
        drone.start_delivery()
    })
    .await?;

    info!(order_id = %order_id, drone_id = %drone.id, "Delivery started");
    announce(&drone, order_id, DRONE_DELIVERY_STARTED, None, deps).await?;
    Ok(drone.snapshot())
}

/// PIN gate at the customer's door. A wrong PIN leaves the drone untouched.
pub async fn verify_pin(
    actor: &Actor,
    order_id: OrderId,
    pin: &str,
    deps: &DroneServiceDeps,
) -> Result<DroneSnapshot, DispatchError> {
    let current = drone_for_order(order_id, deps).await?;
    ensure_recipient(actor, &current)?;

    let result = mutate_drone(current.id, deps, |drone| {
        ensure_holds(drone, order_id)?;
        drone.verify_pin(pin)
    })
    .await;

    let drone = match result {
        Ok(drone) => drone,
        Err(DispatchError::InvalidPin) => {
            warn!(order_id = %order_id, drone_id = %current.id, "Wrong delivery PIN submitted");
            return Err(DispatchError::InvalidPin);
        }
        Err(e) => return Err(e),
    };

    info!(order_id = %order_id, drone_id = %drone.id, "PIN verified, parcel released");
    announce(&drone, order_id, DRONE_DELIVERY_COMPLETED, None, deps).await?;
    Ok(drone.snapshot())
}

/// Abort a pickup and fly the drone home empty.
pub async fn recall(
    actor: &Actor,
    order_id: OrderId,
    deps: &DroneServiceDeps,
) -> Result<DroneSnapshot, DispatchError> {
    let current = drone_for_order(order_id, deps).await?;
    match current.restaurant_id {
        Some(restaurant_id) => actor.require_operator_of(restaurant_id)?,
        None => actor.require_operator()?,
    }

    let drone = mutate_drone(current.id, deps, |drone| {
        ensure_holds(drone, order_id)?;
        drone.recall()
    })
    .await?;

    info!(order_id = %order_id, drone_id = %drone.id, "Drone recalled");
    announce(&drone, order_id, DRONE_RECALLED, None, deps).await?;
    Ok(drone.snapshot())
}

/// The drone currently bound to `order_id`, as the customer or operator sees it.
pub async fn get_drone_for_order(
    actor: &Actor,
    order_id: OrderId,
    deps: &DroneServiceDeps,
) -> Result<DroneSnapshot, DispatchError> {
    let drone = drone_for_order(order_id, deps).await?;
    ensure_participant(actor, &drone)?;
    Ok(drone.snapshot())
}

pub async fn list_drones(
    actor: &Actor,
    deps: &DroneServiceDeps,
) -> Result<Vec<DroneSnapshot>, DispatchError> {
    actor.require_operator()?;
    let fleet = deps.drones.list().await?;
    Ok(fleet.iter().map(Drone::snapshot).collect())
}

pub async fn list_available_drones(
    actor: &Actor,
    deps: &DroneServiceDeps,
) -> Result<Vec<DroneSnapshot>, DispatchError> {
    actor.require_operator()?;
    let fleet = deps.drones.list().await?;
    Ok(fleet
        .iter()
        .filter(|d| d.is_eligible(deps.simulation.min_battery))
        .map(Drone::snapshot)
        .collect())
}

/// Publish the drone event and push a tracking snapshot.
pub(crate) async fn announce(
    drone: &Drone,
    order_id: OrderId,
    event_type: &str,
    arrived_at: Option<ArrivalPoint>,
    deps: &DroneServiceDeps,
) -> Result<(), DispatchError> {
    deps.tracking.publish_drone(&drone.snapshot()).await;
    publish_event(drone, order_id, event_type, arrived_at, deps).await
}

/// Bus half of `announce`, for callers that route tracking themselves.
pub(crate) async fn publish_event(
    drone: &Drone,
    order_id: OrderId,
    event_type: &str,
    arrived_at: Option<ArrivalPoint>,
    deps: &DroneServiceDeps,
) -> Result<(), DispatchError> {
    let event = DroneEvent::new(drone, order_id, arrived_at);
    let data = serde_json::to_value(&event).map_err(|e| DispatchError::Bus(e.into()))?;
    deps.bus
        .publish(DRONES_EXCHANGE, event_type, event_type, data)
        .await
        .map_err(DispatchError::Bus)
}

/// Read-modify-write with CAS retries. `apply` re-runs against a fresh copy
/// on every attempt; its error aborts without writing.
pub(crate) async fn mutate_drone<F>(
    drone_id: DroneId,
    deps: &DroneServiceDeps,
    mut apply: F,
) -> Result<Drone, DispatchError>
where
    F: FnMut(&mut Drone) -> Result<(), DispatchError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut drone = deps.drones.get(drone_id).await?;
        apply(&mut drone)?;

        match deps.drones.update(&drone).await {
            Ok(saved) => return Ok(saved),
            Err(e) if e.is_conflict() && attempt < MAX_CAS_ATTEMPTS => {
                debug!(drone_id = %drone_id, attempt, "Drone write lost a race, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn drone_for_order(order_id: OrderId, deps: &DroneServiceDeps) -> Result<Drone, DispatchError> {
    deps.drones
        .find_by_order(order_id)
        .await?
        .ok_or(DispatchError::NoDroneForOrder(order_id))
}

/// The assignment may have ended between the lookup and the write.
fn ensure_holds(drone: &Drone, order_id: OrderId) -> Result<(), DispatchError> {
    if drone.assigned_order == Some(order_id) {
        Ok(())
    } else {
        Err(DispatchError::NoDroneForOrder(order_id))
    }
}

/// Only the order's customer may unlock the drone.
fn ensure_recipient(actor: &Actor, drone: &Drone) -> Result<(), DispatchError> {
    if drone.customer_id == Some(actor.user_id) {
        Ok(())
    } else {
        Err(AuthError::PermissionDenied("only the customer can enter the delivery PIN".to_string()).into())
    }
}

/// Customer of the assignment, or an operator of its restaurant.
fn ensure_participant(actor: &Actor, drone: &Drone) -> Result<(), DispatchError> {
    let is_customer = drone.customer_id == Some(actor.user_id);
    let is_operator = match drone.restaurant_id {
        Some(restaurant_id) => actor.operates(restaurant_id),
        None => actor.is_admin(),
    };
    if is_customer || is_operator {
        Ok(())
    } else {
        Err(AuthError::PermissionDenied("not a participant of this delivery".to_string()).into())
    }
}

/// Operators read orders with the PIN redacted. The drone service then
/// reads it under its own admin identity.
async fn delivery_pin_of(order: &Order, deps: &DroneServiceDeps) -> Result<String, DispatchError> {
    if !order.delivery_pin.is_empty() {
        return Ok(order.delivery_pin.clone());
    }
    let token = deps
        .jwt_service
        .create_token(Uuid::nil(), Role::Admin, None)
        .map_err(DispatchError::ServiceToken)?;
    let pin = fetch_order(order.id, &token, deps).await?.delivery_pin;
    if pin.is_empty() {
        return Err(DispatchError::Conflict(format!("order {} has no delivery PIN", order.id)));
    }
    Ok(pin)
}

async fn fetch_order(
    order_id: OrderId,
    bearer: &str,
    deps: &DroneServiceDeps,
) -> Result<Order, DispatchError> {
    deps.orders
        .get_order(order_id, bearer)
        .await
        .map_err(|e| match e {
            e if e.is_not_found() => DispatchError::OrderNotFound(order_id),
            ServiceClientError::Rejected { status: 401, .. } => AuthError::InvalidToken.into(),
            ServiceClientError::Rejected { status: 403, .. } => {
                AuthError::PermissionDenied(format!("order {} is not visible to caller", order_id))
                    .into()
            }
            other => DispatchError::Collaborator(other),
        })
}
