use async_trait::async_trait;

use super::service_client::{ServiceClient, ServiceClientError};
use super::traits::BaseOrderDirectory;
use crate::common::OrderId;
use crate::domains::orders::models::Order;

/// Reads orders from the order service, forwarding the caller's token so the
/// order service applies its own ownership rules.
pub struct HttpOrderDirectory {
    client: ServiceClient,
}

impl HttpOrderDirectory {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BaseOrderDirectory for HttpOrderDirectory {
    async fn get_order(&self, id: OrderId, bearer: &str) -> Result<Order, ServiceClientError> {
        self.client
            .get_json(&format!("/orders/{}", id), Some(bearer))
            .await
    }
}
