use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

/// JWT Claims issued by the auth service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,                    // Subject (user_id as string)
    pub user_id: Uuid,                  // User UUID
    pub role: Role,                     // customer | merchant | admin
    pub restaurant_id: Option<Uuid>,    // Set for merchant operators
    pub exp: i64,                       // Expiration timestamp
    pub iat: i64,                       // Issued at timestamp
    pub iss: String,                    // Issuer
    pub jti: String,                    // JWT ID
}

/// JWT Service - verifies tokens handed to clients by the auth service.
///
/// Token issuance lives with the auth collaborator; `create_token` exists so
/// local tooling and tests can mint tokens signed with the shared secret.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    pub fn new(secret: &str, issuer: String) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
        }
    }

    /// Create a token valid for 24 hours.
    pub fn create_token(
        &self,
        user_id: Uuid,
        role: Role,
        restaurant_id: Option<Uuid>,
    ) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(24);

        let claims = Claims {
            sub: user_id.to_string(),
            user_id,
            role,
            restaurant_id,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify and decode a token. Rejects expired tokens and foreign issuers.
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_verify_merchant_token() {
        let service = JwtService::new("test_secret_key", "test_issuer".to_string());
        let user_id = Uuid::new_v4();
        let restaurant_id = Uuid::new_v4();

        let token = service
            .create_token(user_id, Role::Merchant, Some(restaurant_id))
            .unwrap();

        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.role, Role::Merchant);
        assert_eq!(claims.restaurant_id, Some(restaurant_id));
        assert_eq!(claims.iss, "test_issuer");
    }

    #[test]
    fn test_invalid_token() {
        let service = JwtService::new("test_secret_key", "test_issuer".to_string());
        assert!(service.verify_token("invalid_token").is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let service1 = JwtService::new("secret1", "test_issuer".to_string());
        let service2 = JwtService::new("secret2", "test_issuer".to_string());

        let token = service1
            .create_token(Uuid::new_v4(), Role::Customer, None)
            .unwrap();

        assert!(service2.verify_token(&token).is_err());
    }

    #[test]
    fn test_wrong_issuer() {
        let issuer_a = JwtService::new("shared", "auth-a".to_string());
        let issuer_b = JwtService::new("shared", "auth-b".to_string());

        let token = issuer_a
            .create_token(Uuid::new_v4(), Role::Admin, None)
            .unwrap();

        assert!(issuer_b.verify_token(&token).is_err());
    }
}
