// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Collaborator services are reached through these so the saga and the
// dispatch engine can be exercised without a network.
//
// Naming convention: Base* for trait names (e.g., BaseCatalog, BaseOrderDirectory)

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::service_client::ServiceClientError;
use crate::common::{OrderId, Position, ProductId, RestaurantId};
use crate::domains::orders::models::Order;

// =============================================================================
// Catalog collaborator
// =============================================================================

/// Price and availability snapshot of a catalog product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub discount_price: Option<Decimal>,
    pub available: bool,
    pub restaurant_id: RestaurantId,
    #[serde(default)]
    pub modifiers: Vec<ProductModifier>,
}

impl ProductSnapshot {
    /// The price a customer pays per unit before modifiers.
    pub fn effective_price(&self) -> Decimal {
        match self.discount_price {
            Some(discounted) if discounted < self.price => discounted,
            _ => self.price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductModifier {
    pub id: String,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantInfo {
    pub id: RestaurantId,
    pub name: String,
    pub location: Position,
}

#[async_trait]
pub trait BaseCatalog: Send + Sync {
    async fn get_product(&self, id: ProductId) -> Result<ProductSnapshot, ServiceClientError>;

    async fn get_restaurant(&self, id: RestaurantId) -> Result<RestaurantInfo, ServiceClientError>;

    async fn reserve_inventory(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), ServiceClientError>;

    async fn restore_inventory(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), ServiceClientError>;
}

// =============================================================================
// Order service as seen by the drone service
// =============================================================================

#[async_trait]
pub trait BaseOrderDirectory: Send + Sync {
    /// Fetch an order on behalf of the caller whose token is `bearer`.
    async fn get_order(&self, id: OrderId, bearer: &str) -> Result<Order, ServiceClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_contract_accepts_numeric_prices() {
        let json = serde_json::json!({
            "id": "0190c4d2-6f3a-7c1e-9d0b-3a8f5e2c1b00",
            "name": "Pho Bo",
            "price": 45000,
            "discountPrice": 40000.5,
            "available": true,
            "restaurantId": "0190c4d2-6f3a-7c1e-9d0b-3a8f5e2c1b01",
            "modifiers": [{"id": "extra-beef", "name": "Extra beef", "price": "10000"}]
        });

        let product: ProductSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(product.effective_price(), Decimal::new(400005, 1));
        assert_eq!(product.modifiers[0].price, Decimal::new(10000, 0));
    }

    #[test]
    fn test_discount_above_price_is_ignored() {
        let product = ProductSnapshot {
            id: ProductId::new(),
            name: "Tea".to_string(),
            price: Decimal::new(10, 0),
            discount_price: Some(Decimal::new(12, 0)),
            available: true,
            restaurant_id: RestaurantId::new(),
            modifiers: Vec::new(),
        };
        assert_eq!(product.effective_price(), Decimal::new(10, 0));
    }
}
