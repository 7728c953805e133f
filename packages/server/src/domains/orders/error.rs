use thiserror::Error;

use crate::common::{AuthError, OrderId, StoreError, TransitionError};
use crate::kernel::ServiceClientError;

#[derive(Debug, Error)]
pub enum OrderError {
    /// Itemized reasons, reported together.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Operation not possible in the current state, or lost a write race.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Catalog refused to reserve stock; the order was cancelled.
    #[error("inventory reservation failed for order {order_id}: {source}")]
    Reservation {
        order_id: OrderId,
        #[source]
        source: ServiceClientError,
    },

    #[error(transparent)]
    Collaborator(#[from] ServiceClientError),

    #[error(transparent)]
    Store(StoreError),

    #[error("event bus error: {0}")]
    Bus(anyhow::Error),
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => match OrderId::parse(&id) {
                Ok(order_id) => OrderError::NotFound(order_id),
                Err(_) => OrderError::Store(StoreError::NotFound { entity: "order", id }),
            },
            StoreError::Conflict { id, .. } => {
                OrderError::Conflict(format!("order {} was modified concurrently", id))
            }
            other => OrderError::Store(other),
        }
    }
}
