//! JWT token validation

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use helpdesk_shared::Role;

use super::{AuthUser, TokenVerifier};

/// JWT claims issued by the storefront identity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// User role (CUSTOMER, SUPPORT or ADMIN)
    pub role: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

/// HS256 token verifier
#[derive(Clone)]
pub struct JwtManager {
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Validate and decode a token
    /// Explicit algorithm validation prevents algorithm confusion attacks
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })
    }
}

impl TokenVerifier for JwtManager {
    fn verify(&self, token: &str) -> Result<AuthUser, JwtError> {
        let claims = self.validate_token(token)?;
        let role: Role = claims.role.parse().map_err(JwtError::UnknownRole)?;
        Ok(AuthUser {
            user_id: claims.sub,
            role,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Unknown role: {0}")]
    UnknownRole(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use time::{Duration, OffsetDateTime};

    const SECRET: &str = "test-secret-key-at-least-32-chars!";

    fn token(sub: Uuid, role: &str, ttl: Duration, secret: &str) -> String {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub,
            role: role.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_staff_token() {
        let jwt = JwtManager::new(SECRET);
        let user_id = Uuid::new_v4();

        let user = jwt
            .verify(&token(user_id, "SUPPORT", Duration::hours(1), SECRET))
            .expect("valid token");

        assert_eq!(user.user_id, user_id);
        assert_eq!(user.role, Role::Support);
        assert!(user.actor().is_staff());
    }

    #[test]
    fn test_expired_token() {
        let jwt = JwtManager::new(SECRET);
        let stale = token(Uuid::new_v4(), "CUSTOMER", Duration::hours(-2), SECRET);

        assert!(matches!(jwt.verify(&stale), Err(JwtError::Expired)));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let jwt = JwtManager::new(SECRET);
        let forged = token(
            Uuid::new_v4(),
            "ADMIN",
            Duration::hours(1),
            "another-secret-that-is-also-32-chars",
        );

        assert!(jwt.verify(&forged).is_err());
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let jwt = JwtManager::new(SECRET);
        let odd = token(Uuid::new_v4(), "OWNER", Duration::hours(1), SECRET);

        assert!(matches!(jwt.verify(&odd), Err(JwtError::UnknownRole(_))));
    }
}
