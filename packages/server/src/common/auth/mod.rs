/// Authorization primitives shared by the order and drone services.
///
/// Tokens are issued by the external auth service; both services only verify
/// them and decide what the caller may touch:
///
/// ```rust,ignore
/// let actor = Actor::from_claims(&claims);
/// actor.require_operator_of(order.restaurant_id)?;
/// ```
mod errors;
mod jwt;

pub use errors::AuthError;
pub use jwt::{Claims, JwtService};

use serde::{Deserialize, Serialize};

use crate::common::{RestaurantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Merchant,
    Admin,
}

/// The authenticated caller of a request or tracking channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    pub restaurant_id: Option<RestaurantId>,
}

impl Actor {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: UserId::from_uuid(claims.user_id),
            role: claims.role,
            restaurant_id: claims.restaurant_id.map(RestaurantId::from_uuid),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Merchants operate their own restaurant only; admins operate all of them.
    pub fn operates(&self, restaurant_id: RestaurantId) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Merchant => self.restaurant_id == Some(restaurant_id),
            Role::Customer => false,
        }
    }

    pub fn require_operator_of(&self, restaurant_id: RestaurantId) -> Result<(), AuthError> {
        if self.operates(restaurant_id) {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied(format!(
                "not an operator of restaurant {}",
                restaurant_id
            )))
        }
    }

    /// Any merchant or admin. Used for fleet-wide drone operations.
    pub fn require_operator(&self) -> Result<(), AuthError> {
        match self.role {
            Role::Merchant | Role::Admin => Ok(()),
            Role::Customer => Err(AuthError::PermissionDenied(
                "operator role required".to_string(),
            )),
        }
    }

    /// Owner, operating merchant, or admin may read an order.
    pub fn can_view(&self, customer_id: UserId, restaurant_id: RestaurantId) -> bool {
        self.user_id == customer_id || self.operates(restaurant_id)
    }
}
