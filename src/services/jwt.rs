use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;

use crate::models::UserRole;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // User ID
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtService;

impl JwtService {
    pub fn generate_access_token(
        user_id: &ObjectId,
        email: &str,
        role: UserRole,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        Self::sign(
            user_id,
            email,
            role,
            crate::config::Config::jwt_expiry(),
            &crate::config::Config::jwt_secret(),
        )
    }

    pub fn generate_refresh_token(
        user_id: &ObjectId,
        email: &str,
        role: UserRole,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        Self::sign(
            user_id,
            email,
            role,
            crate::config::Config::jwt_refresh_expiry(),
            &crate::config::Config::jwt_refresh_secret(),
        )
    }

    pub fn verify_token(token: &str, is_refresh: bool) -> Result<Claims, jsonwebtoken::errors::Error> {
        let secret = if is_refresh {
            crate::config::Config::jwt_refresh_secret()
        } else {
            crate::config::Config::jwt_secret()
        };
        Self::decode_with(token, &secret)
    }

    fn sign(
        user_id: &ObjectId,
        email: &str,
        role: UserRole,
        ttl: i64,
        secret: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();

        let claims = Claims {
            sub: user_id.to_hex(),
            email: email.to_string(),
            role,
            exp: now + ttl,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    fn decode_with(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_signed_with_one_secret_fails_under_another() {
        let user_id = ObjectId::new();
        let token =
            JwtService::sign(&user_id, "a@example.com", UserRole::Collector, 60, "access").unwrap();

        let claims = JwtService::decode_with(&token, "access").unwrap();
        assert_eq!(claims.sub, user_id.to_hex());
        assert_eq!(claims.role, UserRole::Collector);

        assert!(JwtService::decode_with(&token, "refresh").is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        // Beyond the default 60s leeway.
        let token =
            JwtService::sign(&ObjectId::new(), "a@example.com", UserRole::Household, -600, "s")
                .unwrap();
        assert!(JwtService::decode_with(&token, "s").is_err());
    }
}
