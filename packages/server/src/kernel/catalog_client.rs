use async_trait::async_trait;
use serde::Serialize;

use super::service_client::{ServiceClient, ServiceClientError};
use super::traits::{BaseCatalog, ProductSnapshot, RestaurantInfo};
use crate::common::{ProductId, RestaurantId};

#[derive(Debug, Serialize)]
struct InventoryChange {
    quantity: u32,
}

/// Catalog collaborator over HTTP.
pub struct HttpCatalog {
    client: ServiceClient,
}

impl HttpCatalog {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BaseCatalog for HttpCatalog {
    async fn get_product(&self, id: ProductId) -> Result<ProductSnapshot, ServiceClientError> {
        self.client
            .get_json(&format!("/products/{}", id), None)
            .await
    }

    async fn get_restaurant(&self, id: RestaurantId) -> Result<RestaurantInfo, ServiceClientError> {
        self.client
            .get_json(&format!("/restaurants/{}", id), None)
            .await
    }

    async fn reserve_inventory(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), ServiceClientError> {
        self.client
            .post(
                &format!("/products/{}/inventory/reserve", product_id),
                &InventoryChange { quantity },
                None,
            )
            .await
    }

    async fn restore_inventory(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), ServiceClientError> {
        self.client
            .post(
                &format!("/products/{}/inventory/restore", product_id),
                &InventoryChange { quantity },
                None,
            )
            .await
    }
}
