//! Authentication
//!
//! Tokens are opaque to the rest of the service: a [`TokenVerifier`] turns a
//! bearer string into an [`AuthUser`] or rejects it.

pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, JwtError, JwtManager};
pub use middleware::{require_auth, AuthState, AuthUser};

/// Verify a token into the caller it identifies
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AuthUser, JwtError>;
}
