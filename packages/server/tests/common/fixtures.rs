//! Test fixtures: a seeded restaurant with two products and the standard order.

use fulfillment_core::common::{Position, ProductId, RestaurantId};
use fulfillment_core::domains::orders::actions::{CreateOrderInput, OrderItemInput};
use fulfillment_core::domains::orders::models::DeliveryAddress;
use fulfillment_core::kernel::{ProductModifier, ProductSnapshot, RestaurantInfo, TestDependencies};
use rust_decimal::Decimal;

pub struct CatalogFixture {
    pub restaurant: RestaurantInfo,
    /// 10.00 per unit.
    pub burger: ProductSnapshot,
    /// 5.00 per unit.
    pub fries: ProductSnapshot,
}

impl CatalogFixture {
    pub fn seed(deps: &TestDependencies) -> Self {
        let restaurant = RestaurantInfo {
            id: RestaurantId::new(),
            name: "Saigon Grill".to_string(),
            location: Position::new(10.7800, 106.6990),
        };
        let burger = product(&restaurant, "Burger", Decimal::new(1000, 2));
        let fries = ProductSnapshot {
            modifiers: vec![ProductModifier {
                id: "salt".to_string(),
                name: "Extra salt".to_string(),
                price: Decimal::ZERO,
            }],
            ..product(&restaurant, "Fries", Decimal::new(500, 2))
        };

        deps.catalog.add_restaurant(restaurant.clone());
        deps.catalog.add_product(burger.clone());
        deps.catalog.add_product(fries.clone());

        Self {
            restaurant,
            burger,
            fries,
        }
    }

    /// A product of another restaurant, for cross-restaurant rejections.
    pub fn foreign_product(&self, deps: &TestDependencies) -> ProductSnapshot {
        let other = RestaurantInfo {
            id: RestaurantId::new(),
            name: "Elsewhere".to_string(),
            location: Position::new(10.80, 106.65),
        };
        let snapshot = product(&other, "Pho", Decimal::new(4500, 2));
        deps.catalog.add_restaurant(other);
        deps.catalog.add_product(snapshot.clone());
        snapshot
    }
}

pub fn product(restaurant: &RestaurantInfo, name: &str, price: Decimal) -> ProductSnapshot {
    ProductSnapshot {
        id: ProductId::new(),
        name: name.to_string(),
        price,
        discount_price: None,
        available: true,
        restaurant_id: restaurant.id,
        modifiers: Vec::new(),
    }
}

pub fn delivery_address() -> DeliveryAddress {
    DeliveryAddress {
        street: "12 Nguyen Hue, District 1".to_string(),
        lat: 10.7743,
        lng: 106.7038,
    }
}

/// Two lines: 2 × burger and 1 × fries, no tip.
pub fn order_input(catalog: &CatalogFixture) -> CreateOrderInput {
    CreateOrderInput {
        items: vec![
            OrderItemInput {
                product_id: catalog.burger.id,
                quantity: 2,
                modifier_ids: Vec::new(),
            },
            OrderItemInput {
                product_id: catalog.fries.id,
                quantity: 1,
                modifier_ids: Vec::new(),
            },
        ],
        delivery_address: delivery_address(),
        tip: Decimal::ZERO,
    }
}

/// Any 4-digit code other than `pin`.
pub fn wrong_pin(pin: &str) -> String {
    if pin == "0000" {
        "1111".to_string()
    } else {
        "0000".to_string()
    }
}
