use thiserror::Error;

use crate::common::{AuthError, DroneId, OrderId, StoreError, TransitionError};
use crate::domains::orders::models::OrderStatus;
use crate::kernel::ServiceClientError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("drone {0} not found")]
    DroneNotFound(DroneId),

    #[error("no drone is assigned to order {0}")]
    NoDroneForOrder(OrderId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("no drone available")]
    NoDroneAvailable,

    #[error("order {0} already has a drone assigned")]
    AlreadyAssigned(OrderId),

    #[error("order {order_id} is {status}; expected one of {expected}")]
    OrderNotDispatchable {
        order_id: OrderId,
        status: OrderStatus,
        expected: &'static str,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("drone has not arrived at the customer")]
    NotArrived,

    #[error("invalid PIN")]
    InvalidPin,

    #[error("PIN must be 1 to 4 digits")]
    MalformedPin,

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Collaborator(#[from] ServiceClientError),

    #[error(transparent)]
    Store(StoreError),

    #[error("event bus error: {0}")]
    Bus(anyhow::Error),

    #[error("could not sign service token: {0}")]
    ServiceToken(anyhow::Error),
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { id, .. } => {
                DispatchError::Conflict(format!("drone {} was modified concurrently", id))
            }
            StoreError::NotFound { id, .. } => match DroneId::parse(&id) {
                Ok(drone_id) => DispatchError::DroneNotFound(drone_id),
                Err(_) => DispatchError::Store(StoreError::NotFound { entity: "drone", id }),
            },
            other => DispatchError::Store(other),
        }
    }
}
