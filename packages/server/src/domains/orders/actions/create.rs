//! Order placement - the opening steps of the fulfillment saga.
//!
//! validate → price from the catalog → persist → reserve stock → announce.
//! A failed reservation compensates the lines already reserved and cancels
//! the order before the caller hears about it.

use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{info, warn};

use super::mutation::{mutate_order, publish};
use super::pricing::{compute_totals, line_total};
use crate::common::{Actor, ProductId, RestaurantId};
use crate::domains::orders::error::OrderError;
use crate::domains::orders::events::{
    OrderCancelled, OrderCreated, PaymentRequired, ORDERS_EXCHANGE, ORDER_CANCELLED,
    ORDER_CREATED, PAYMENT_REQUIRED,
};
use crate::domains::orders::models::{DeliveryAddress, ItemModifier, Order, OrderItem, OrderStatus};
use crate::kernel::{OrderServiceDeps, ProductSnapshot, ServiceClientError};

const RESERVATION_FAILED: &str = "inventory reservation failed";

/// Largest tip accepted, in the currency's major unit.
pub const MAX_TIP: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderInput {
    pub items: Vec<OrderItemInput>,
    pub delivery_address: DeliveryAddress,
    #[serde(default)]
    pub tip: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: ProductId,
    /// Signed so that zero and negative quantities reach validation.
    pub quantity: i64,
    #[serde(default)]
    pub modifier_ids: Vec<String>,
}

/// Every problem with the payload, in field order. Empty when valid.
pub fn validate(input: &CreateOrderInput) -> Vec<String> {
    let mut reasons = Vec::new();

    if input.items.is_empty() {
        reasons.push("items must not be empty".to_string());
    }
    for (i, item) in input.items.iter().enumerate() {
        if item.quantity <= 0 {
            reasons.push(format!("items[{}].quantity must be positive", i));
        } else if item.quantity > i64::from(u32::MAX) {
            reasons.push(format!("items[{}].quantity is too large", i));
        }
        let mut seen = HashSet::new();
        for id in &item.modifier_ids {
            if !seen.insert(id.as_str()) {
                reasons.push(format!("items[{}].modifierIds contains duplicate '{}'", i, id));
            }
        }
    }

    let address = &input.delivery_address;
    if address.street.trim().is_empty() {
        reasons.push("deliveryAddress.street must not be empty".to_string());
    }
    if !address.lat.is_finite() || !(-90.0..=90.0).contains(&address.lat) {
        reasons.push("deliveryAddress.lat must be between -90 and 90".to_string());
    }
    if !address.lng.is_finite() || !(-180.0..=180.0).contains(&address.lng) {
        reasons.push("deliveryAddress.lng must be between -180 and 180".to_string());
    }

    if input.tip < Decimal::ZERO {
        reasons.push("tip must not be negative".to_string());
    } else if input.tip > MAX_TIP {
        reasons.push(format!("tip must not exceed {}", MAX_TIP));
    }

    reasons
}

/// Four digits, zero padded.
pub fn generate_delivery_pin() -> String {
    format!("{:04}", rand::thread_rng().gen_range(0..10_000))
}

pub async fn create_order(
    actor: &Actor,
    input: CreateOrderInput,
    deps: &OrderServiceDeps,
) -> Result<Order, OrderError> {
    let reasons = validate(&input);
    if !reasons.is_empty() {
        return Err(OrderError::Validation(reasons));
    }

    let (items, restaurant_id) = price_items(&input, deps).await?;
    let restaurant = match deps.catalog.get_restaurant(restaurant_id).await {
        Ok(restaurant) => restaurant,
        Err(e) if e.is_not_found() => {
            return Err(OrderError::Validation(vec![format!(
                "restaurant {} not found",
                restaurant_id
            )]))
        }
        Err(e) => return Err(e.into()),
    };

    let line_totals: Vec<Decimal> = items.iter().map(|item| item.line_total).collect();
    let totals = compute_totals(&line_totals, &deps.pricing, input.tip, Decimal::ZERO)
        .ok_or_else(|| OrderError::Validation(vec!["order total is out of range".to_string()]))?;

    let order = Order::place(
        actor.user_id,
        restaurant_id,
        restaurant.location,
        items,
        input.delivery_address,
        totals,
        generate_delivery_pin(),
    );
    deps.orders.insert(&order).await?;
    info!(order_id = %order.id, customer_id = %order.customer_id, total = %order.totals.total, "Order placed");

    if let Err(source) = reserve_all(&order, deps).await {
        compensate_reservation(&order, deps).await?;
        return Err(OrderError::Reservation {
            order_id: order.id,
            source,
        });
    }

    publish(deps, ORDERS_EXCHANGE, ORDER_CREATED, &OrderCreated::from(&order)).await?;
    publish(deps, ORDERS_EXCHANGE, PAYMENT_REQUIRED, &PaymentRequired::from(&order)).await?;

    Ok(order)
}

/// Snapshot every line from the catalog. Catalog-side problems with the
/// request are collected as validation reasons; outages abort.
async fn price_items(
    input: &CreateOrderInput,
    deps: &OrderServiceDeps,
) -> Result<(Vec<OrderItem>, RestaurantId), OrderError> {
    let mut reasons = Vec::new();
    let mut items = Vec::with_capacity(input.items.len());
    let mut restaurants = Vec::new();

    for (i, line) in input.items.iter().enumerate() {
        let product = match deps.catalog.get_product(line.product_id).await {
            Ok(product) => product,
            Err(e) if e.is_not_found() => {
                reasons.push(format!("items[{}]: product {} not found", i, line.product_id));
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if !product.available {
            reasons.push(format!("items[{}]: {} is unavailable", i, product.name));
        }
        if !restaurants.contains(&product.restaurant_id) {
            restaurants.push(product.restaurant_id);
        }

        match snapshot_item(&product, line) {
            Ok(item) => items.push(item),
            Err(problems) => reasons.extend(
                problems
                    .into_iter()
                    .map(|problem| format!("items[{}]: {}", i, problem)),
            ),
        }
    }

    if restaurants.len() > 1 {
        reasons.push("items span more than one restaurant".to_string());
    }
    if !reasons.is_empty() {
        return Err(OrderError::Validation(reasons));
    }

    match restaurants.first() {
        Some(restaurant_id) => Ok((items, *restaurant_id)),
        None => Err(OrderError::Validation(vec!["items must not be empty".to_string()])),
    }
}

/// Denormalized line. `Err` lists what is wrong with the requested line.
fn snapshot_item(product: &ProductSnapshot, line: &OrderItemInput) -> Result<OrderItem, Vec<String>> {
    let mut modifiers = Vec::with_capacity(line.modifier_ids.len());
    let mut missing = Vec::new();
    for id in &line.modifier_ids {
        match product.modifiers.iter().find(|m| &m.id == id) {
            Some(m) => modifiers.push(ItemModifier {
                id: m.id.clone(),
                name: m.name.clone(),
                price: m.price,
            }),
            None => missing.push(format!("modifier '{}' does not exist on {}", id, product.name)),
        }
    }
    if !missing.is_empty() {
        return Err(missing);
    }

    // Validation bounds quantity to 1..=u32::MAX.
    let quantity = u32::try_from(line.quantity).unwrap_or(u32::MAX);
    let unit_price = product.effective_price();
    let modifier_prices: Vec<Decimal> = modifiers.iter().map(|m| m.price).collect();

    let total = line_total(unit_price, &modifier_prices, quantity)
        .ok_or_else(|| vec!["line total is out of range".to_string()])?;

    Ok(OrderItem {
        product_id: product.id,
        name: product.name.clone(),
        unit_price,
        quantity,
        line_total: total,
        modifiers,
    })
}

/// Reserve line by line. On the first failure, lines already reserved are
/// given back before the error is returned.
async fn reserve_all(order: &Order, deps: &OrderServiceDeps) -> Result<(), ServiceClientError> {
    for (i, item) in order.items.iter().enumerate() {
        if let Err(e) = deps
            .catalog
            .reserve_inventory(item.product_id, item.quantity)
            .await
        {
            warn!(order_id = %order.id, product_id = %item.product_id, error = %e, "Inventory reservation failed");
            for reserved in &order.items[..i] {
                if let Err(restore) = deps
                    .catalog
                    .restore_inventory(reserved.product_id, reserved.quantity)
                    .await
                {
                    warn!(order_id = %order.id, product_id = %reserved.product_id, error = %restore, "Inventory restore failed");
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

/// The order already exists; terminalize it so it never reaches payment.
async fn compensate_reservation(order: &Order, deps: &OrderServiceDeps) -> Result<(), OrderError> {
    let cancelled = mutate_order(order.id, deps, |order| {
        if order.status != OrderStatus::Pending {
            return Ok(false);
        }
        order.transition(OrderStatus::Cancelled, RESERVATION_FAILED)?;
        Ok(true)
    })
    .await?;

    if cancelled.changed {
        publish(
            deps,
            ORDERS_EXCHANGE,
            ORDER_CANCELLED,
            &OrderCancelled::new(&cancelled.order, RESERVATION_FAILED),
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CreateOrderInput {
        CreateOrderInput {
            items: vec![OrderItemInput {
                product_id: ProductId::new(),
                quantity: 1,
                modifier_ids: Vec::new(),
            }],
            delivery_address: DeliveryAddress {
                street: "12 Nguyen Hue".to_string(),
                lat: 10.7743,
                lng: 106.7038,
            },
            tip: Decimal::ZERO,
        }
    }

    #[test]
    fn test_valid_payload_has_no_reasons() {
        assert!(validate(&input()).is_empty());
    }

    #[test]
    fn test_reasons_are_itemized() {
        let mut bad = input();
        bad.items[0].quantity = 0;
        bad.items[0].modifier_ids = vec!["cheese".to_string(), "cheese".to_string()];
        bad.delivery_address.street = "  ".to_string();
        bad.delivery_address.lat = 91.0;
        bad.delivery_address.lng = -181.0;
        bad.tip = Decimal::new(-1, 0);

        let reasons = validate(&bad);
        assert_eq!(reasons.len(), 6);
        assert!(reasons[0].contains("quantity"));
        assert!(reasons[1].contains("duplicate 'cheese'"));
        assert!(reasons.last().unwrap().contains("tip"));
    }

    #[test]
    fn test_tip_is_bounded() {
        let mut bad = input();
        bad.tip = Decimal::MAX;
        let reasons = validate(&bad);
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("tip must not exceed"));

        let mut generous = input();
        generous.tip = MAX_TIP;
        assert!(validate(&generous).is_empty());
    }

    #[test]
    fn test_empty_items_rejected() {
        let mut bad = input();
        bad.items.clear();
        assert_eq!(validate(&bad), vec!["items must not be empty".to_string()]);
    }

    #[test]
    fn test_pin_is_four_digits() {
        for _ in 0..100 {
            let pin = generate_delivery_pin();
            assert_eq!(pin.len(), 4);
            assert!(pin.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_input_contract() {
        let json = serde_json::json!({
            "items": [{"productId": "0190c4d2-6f3a-7c1e-9d0b-3a8f5e2c1b00", "quantity": 2, "modifierIds": ["extra"]}],
            "deliveryAddress": {"street": "1 Le Loi", "lat": 10.77, "lng": 106.70},
            "tip": 5000
        });
        let parsed: CreateOrderInput = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.items[0].quantity, 2);
        assert_eq!(parsed.tip, Decimal::new(5000, 0));
    }
}
