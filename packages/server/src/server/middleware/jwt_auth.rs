use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::common::{Actor, AuthError, JwtService};
use crate::server::error::ApiError;

/// Authenticated caller, resolved from the bearer token.
///
/// The raw token is kept so the drone service can forward it when reading
/// orders on the caller's behalf.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub actor: Actor,
    pub token: String,
}

/// JWT authentication middleware
///
/// Verifies the bearer token and adds AuthUser to request extensions.
/// Requests without a valid token continue anonymously; handlers that need a
/// caller reject them through the `AuthUser` extractor.
pub async fn jwt_auth_middleware(
    jwt_service: Arc<JwtService>,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match bearer_token(request.headers()).and_then(|token| authenticate(&token, &jwt_service)) {
        Some(user) => {
            debug!(user_id = %user.actor.user_id, role = ?user.actor.role, "Authenticated caller");
            request.extensions_mut().insert(user);
        }
        None => debug!("No valid authentication token"),
    }

    next.run(request).await
}

/// Token from the Authorization header, with or without the `Bearer ` prefix.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("authorization")?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub fn authenticate(token: &str, jwt_service: &JwtService) -> Option<AuthUser> {
    let claims = jwt_service.verify_token(token).ok()?;
    Some(AuthUser {
        actor: Actor::from_claims(&claims),
        token: token.to_string(),
    })
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AuthError::AuthenticationRequired.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Role;
    use uuid::Uuid;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", value.parse().unwrap());
        headers
    }

    #[test]
    fn test_extract_token_with_bearer() {
        let jwt_service = JwtService::new("test_secret", "test_issuer".to_string());
        let user_id = Uuid::new_v4();
        let token = jwt_service
            .create_token(user_id, Role::Customer, None)
            .unwrap();

        let found = bearer_token(&headers_with(&format!("Bearer {}", token))).unwrap();
        let user = authenticate(&found, &jwt_service).unwrap();
        assert_eq!(user.actor.user_id.into_uuid(), user_id);
        assert_eq!(user.token, token);
    }

    #[test]
    fn test_extract_token_without_bearer() {
        let jwt_service = JwtService::new("test_secret", "test_issuer".to_string());
        let restaurant_id = Uuid::new_v4();
        let token = jwt_service
            .create_token(Uuid::new_v4(), Role::Merchant, Some(restaurant_id))
            .unwrap();

        let found = bearer_token(&headers_with(&token)).unwrap();
        let user = authenticate(&found, &jwt_service).unwrap();
        assert_eq!(user.actor.role, Role::Merchant);
        assert_eq!(
            user.actor.restaurant_id.map(|id| id.into_uuid()),
            Some(restaurant_id)
        );
    }

    #[test]
    fn test_no_auth_header() {
        assert!(bearer_token(&HeaderMap::new()).is_none());
        assert!(bearer_token(&headers_with("Bearer ")).is_none());
    }

    #[test]
    fn test_invalid_token() {
        let jwt_service = JwtService::new("test_secret", "test_issuer".to_string());
        assert!(authenticate("invalid_token", &jwt_service).is_none());
    }
}
