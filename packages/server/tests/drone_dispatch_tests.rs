//! Drone dispatch and its choreography with the order saga over one bus.

mod common;

use common::*;
use fulfillment_core::common::RestaurantId;
use fulfillment_core::domains::drones::actions::{
    assign_pickup, get_drone_for_order, list_available_drones, recall, start_delivery, verify_pin,
};
use fulfillment_core::domains::drones::events::{
    DRONE_ARRIVED, DRONE_ASSIGNED, DRONE_DELIVERY_COMPLETED, DRONE_DELIVERY_STARTED,
    DRONE_RECALLED, DRONE_RETURNED,
};
use fulfillment_core::domains::drones::models::DroneStatus;
use fulfillment_core::domains::drones::store::DroneStore;
use fulfillment_core::domains::drones::DispatchError;
use fulfillment_core::domains::orders::actions::{get_order, mark_ready};
use fulfillment_core::domains::orders::models::{OrderStatus, TrackingStep};
use fulfillment_core::kernel::{TestDependencies, TrackingHub};
use test_context::test_context;

#[test_context(TestHarness)]
#[tokio::test]
async fn test_full_delivery_with_pin_gate(ctx: &mut TestHarness) {
    let customer = ctx.customer.clone();
    let merchant = ctx.merchant.clone();
    let token = ctx.token_for(&merchant);
    let order = ctx.place_paid_order(&customer).await;

    // Assign: nearest drone heads to the restaurant.
    let assigned = assign_pickup(&merchant, order.id, &token, &ctx.drones)
        .await
        .unwrap();
    assert_eq!(assigned.status, DroneStatus::Pickup);
    assert_eq!(assigned.target, Some(ctx.catalog.restaurant.location));
    assert!(ctx
        .order(order.id)
        .await
        .tracking
        .events
        .iter()
        .any(|e| e.step == TrackingStep::DroneAssigned && e.drone_id == Some(assigned.id)));

    // Fly to the restaurant and park.
    let drone = ctx.drone_for(order.id).await;
    let parked = ctx.fly(&drone).await;
    assert_eq!(parked.status, DroneStatus::WaitingAtRestaurant);
    assert_eq!(parked.position, ctx.catalog.restaurant.location);

    // Delivery cannot start before the kitchen is done.
    let early = start_delivery(&merchant, order.id, &token, &ctx.drones).await;
    assert!(matches!(early, Err(DispatchError::OrderNotDispatchable { .. })));

    mark_ready(&merchant, order.id, &ctx.orders).await.unwrap();
    let delivering = start_delivery(&merchant, order.id, &token, &ctx.drones)
        .await
        .unwrap();
    assert_eq!(delivering.status, DroneStatus::Delivering);
    assert_eq!(ctx.order(order.id).await.status, OrderStatus::OutForDelivery);

    // Reach the customer.
    let at_door = ctx.fly(&parked).await;
    assert_eq!(at_door.status, DroneStatus::Delivering);
    assert!(at_door.arrived_at_customer);
    assert_eq!(at_door.target, None);
    assert_eq!(
        ctx.order(order.id).await.tracking.current_step,
        TrackingStep::DroneAtCustomer
    );

    // Wrong PIN changes nothing.
    let wrong = verify_pin(&customer, order.id, &wrong_pin(&order.delivery_pin), &ctx.drones).await;
    assert!(matches!(wrong, Err(DispatchError::InvalidPin)));
    let unchanged = ctx.drone_for(order.id).await;
    assert_eq!(unchanged.status, DroneStatus::Delivering);
    assert!(unchanged.arrived_at_customer);
    assert_eq!(unchanged.target, None);
    assert_eq!(ctx.order(order.id).await.status, OrderStatus::OutForDelivery);

    // Correct PIN unlocks and sends the drone home.
    let returning = verify_pin(&customer, order.id, &order.delivery_pin, &ctx.drones)
        .await
        .unwrap();
    assert_eq!(returning.status, DroneStatus::Returning);
    assert_eq!(returning.target, Some(returning.home_station));
    assert!(returning.unlocked);
    assert_eq!(ctx.order(order.id).await.status, OrderStatus::Delivered);

    // A second correct PIN is rejected: the drone already left.
    let again = verify_pin(&customer, order.id, &order.delivery_pin, &ctx.drones).await;
    assert!(again.is_err());

    // Back at the station the drone is free again.
    let home = ctx.fly(&at_door).await;
    assert_eq!(home.status, DroneStatus::Available);
    assert_eq!(home.assigned_order, None);
    assert_eq!(home.delivery_pin, None);

    let delivered = ctx.order(order.id).await;
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered
        .tracking
        .events
        .iter()
        .any(|e| e.step == TrackingStep::DroneReturned));
    assert_eq!(delivered.tracking.current_step, TrackingStep::Delivered);

    let keys = ctx.deps.bus.routing_keys();
    for key in [
        DRONE_ASSIGNED,
        DRONE_ARRIVED,
        DRONE_DELIVERY_STARTED,
        DRONE_DELIVERY_COMPLETED,
        DRONE_RETURNED,
    ] {
        assert!(keys.iter().any(|k| k == key), "missing {}", key);
    }
    assert_eq!(ctx.deps.bus.count_for(DRONE_ARRIVED), 2);
    assert!(ctx.deps.bus.dropped().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_order_is_held_by_exactly_one_drone(ctx: &mut TestHarness) {
    let customer = ctx.customer.clone();
    let merchant = ctx.merchant.clone();
    let token = ctx.token_for(&merchant);
    let order = ctx.place_paid_order(&customer).await;

    let (first, second) = tokio::join!(
        assign_pickup(&merchant, order.id, &token, &ctx.drones),
        assign_pickup(&merchant, order.id, &token, &ctx.drones),
    );
    let winners = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1);
    let loser = if first.is_err() { first } else { second };
    assert!(matches!(loser, Err(DispatchError::AlreadyAssigned(_))));

    let holders = ctx
        .deps
        .drones
        .list()
        .await
        .unwrap()
        .into_iter()
        .filter(|d| d.assigned_order == Some(order.id))
        .count();
    assert_eq!(holders, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_assign_requires_dispatchable_order_and_operator(ctx: &mut TestHarness) {
    let customer = ctx.customer.clone();
    let merchant = ctx.merchant.clone();
    let token = ctx.token_for(&merchant);

    // Unpaid orders stay on the ground.
    let pending = ctx.place_order(&customer).await;
    let result = assign_pickup(&merchant, pending.id, &token, &ctx.drones).await;
    assert!(matches!(result, Err(DispatchError::OrderNotDispatchable { .. })));

    // Customers cannot dispatch, even their own order.
    let paid = ctx.place_paid_order(&customer).await;
    let customer_token = ctx.token_for(&customer);
    let result = assign_pickup(&customer, paid.id, &customer_token, &ctx.drones).await;
    assert!(matches!(result, Err(DispatchError::Auth(_))));

    // A merchant of another restaurant cannot even read the order.
    let outsider = TestDependencies::merchant_of(RestaurantId::new());
    let outsider_token = ctx.token_for(&outsider);
    let result = assign_pickup(&outsider, paid.id, &outsider_token, &ctx.drones).await;
    assert!(matches!(result, Err(DispatchError::Auth(_))));

    // A bad token never gets as far as the order.
    let result = assign_pickup(&merchant, paid.id, "not-a-token", &ctx.drones).await;
    assert!(matches!(result, Err(DispatchError::Auth(_))));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_no_drone_available_when_fleet_is_busy(ctx: &mut TestHarness) {
    let customer = ctx.customer.clone();
    let merchant = ctx.merchant.clone();
    let token = ctx.token_for(&merchant);

    let fleet_size = ctx.deps.fleet.size;
    for _ in 0..fleet_size {
        let order = ctx.place_paid_order(&customer).await;
        assign_pickup(&merchant, order.id, &token, &ctx.drones)
            .await
            .unwrap();
    }
    assert!(list_available_drones(&merchant, &ctx.drones)
        .await
        .unwrap()
        .is_empty());

    let extra = ctx.place_paid_order(&customer).await;
    let result = assign_pickup(&merchant, extra.id, &token, &ctx.drones).await;
    assert!(matches!(result, Err(DispatchError::NoDroneAvailable)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_pin_before_arrival_is_rejected(ctx: &mut TestHarness) {
    let customer = ctx.customer.clone();
    let merchant = ctx.merchant.clone();
    let token = ctx.token_for(&merchant);
    let order = ctx.place_paid_order(&customer).await;
    assign_pickup(&merchant, order.id, &token, &ctx.drones)
        .await
        .unwrap();

    let result = verify_pin(&customer, order.id, &order.delivery_pin, &ctx.drones).await;
    assert!(matches!(result, Err(DispatchError::NotArrived)));

    let malformed = verify_pin(&customer, order.id, "12ab", &ctx.drones).await;
    assert!(malformed.is_err());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_pin_stays_with_the_customer(ctx: &mut TestHarness) {
    let customer = ctx.customer.clone();
    let merchant = ctx.merchant.clone();
    let token = ctx.token_for(&merchant);
    let order = ctx.place_paid_order(&customer).await;

    // The kitchen sees the order without its PIN.
    let seen = get_order(&merchant, order.id, &ctx.orders).await.unwrap();
    assert!(seen.delivery_pin.is_empty());
    let admin = TestDependencies::admin();
    assert_eq!(
        get_order(&admin, order.id, &ctx.orders).await.unwrap().delivery_pin,
        order.delivery_pin
    );

    // Dispatch still arms the drone with the real PIN.
    assign_pickup(&merchant, order.id, &token, &ctx.drones)
        .await
        .unwrap();
    let drone = ctx.drone_for(order.id).await;
    assert_eq!(drone.delivery_pin.as_deref(), Some(order.delivery_pin.as_str()));

    ctx.fly(&drone).await;
    mark_ready(&merchant, order.id, &ctx.orders).await.unwrap();
    start_delivery(&merchant, order.id, &token, &ctx.drones)
        .await
        .unwrap();
    ctx.fly(&drone).await;

    // Only the customer may unlock it.
    let by_merchant = verify_pin(&merchant, order.id, &order.delivery_pin, &ctx.drones).await;
    assert!(matches!(by_merchant, Err(DispatchError::Auth(_))));
    let by_admin = verify_pin(&admin, order.id, &order.delivery_pin, &ctx.drones).await;
    assert!(matches!(by_admin, Err(DispatchError::Auth(_))));
    assert!(!ctx.drone_for(order.id).await.unlocked);

    let unlocked = verify_pin(&customer, order.id, &order.delivery_pin, &ctx.drones)
        .await
        .unwrap();
    assert_eq!(unlocked.status, DroneStatus::Returning);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_recall_sends_drone_home_without_touching_order(ctx: &mut TestHarness) {
    let customer = ctx.customer.clone();
    let merchant = ctx.merchant.clone();
    let token = ctx.token_for(&merchant);
    let order = ctx.place_paid_order(&customer).await;
    let assigned = assign_pickup(&merchant, order.id, &token, &ctx.drones)
        .await
        .unwrap();

    // The customer may look but not recall.
    assert!(get_drone_for_order(&customer, order.id, &ctx.drones).await.is_ok());
    let denied = recall(&customer, order.id, &ctx.drones).await;
    assert!(matches!(denied, Err(DispatchError::Auth(_))));

    let recalled = recall(&merchant, order.id, &ctx.drones).await.unwrap();
    assert_eq!(recalled.status, DroneStatus::Returning);
    assert_eq!(recalled.target, Some(assigned.home_station));
    assert_eq!(ctx.deps.bus.count_for(DRONE_RECALLED), 1);
    assert_eq!(ctx.order(order.id).await.status, OrderStatus::Preparing);

    let home = ctx.fly(&ctx.drone_for(order.id).await).await;
    assert_eq!(home.status, DroneStatus::Available);
    assert!(ctx
        .deps
        .drones
        .find_by_order(order.id)
        .await
        .unwrap()
        .is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_tracking_rooms_receive_updates_without_pin(ctx: &mut TestHarness) {
    let customer = ctx.customer.clone();
    let merchant = ctx.merchant.clone();
    let token = ctx.token_for(&merchant);
    let order = ctx.place_paid_order(&customer).await;

    let mut customer_rx = ctx
        .deps
        .tracking
        .subscribe(&TrackingHub::customer_room(customer.user_id))
        .await;
    let mut merchant_rx = ctx
        .deps
        .tracking
        .subscribe(&TrackingHub::merchant_room(ctx.catalog.restaurant.id))
        .await;

    assign_pickup(&merchant, order.id, &token, &ctx.drones)
        .await
        .unwrap();

    for rx in [&mut customer_rx, &mut merchant_rx] {
        let message = rx.recv().await.unwrap();
        assert_eq!(message["type"], "drone:update");
        assert_eq!(message["drone"]["assignedOrder"], order.id.to_string());
        assert!(message["drone"].get("deliveryPin").is_none());
    }
}
