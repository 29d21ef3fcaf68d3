//! Access token validation for the WebSocket upgrade.
//!
//! Token issuance lives in the identity service; the hub only needs a user
//! id for a presented token, behind the [`TokenValidator`] seam.

mod claims;
mod jwt;

pub use claims::Claims;
pub use jwt::JwtValidator;

use crate::error::AppError;

/// Resolves the user behind an access token
pub trait TokenValidator: Send + Sync {
    fn resolve_user(&self, token: &str) -> Result<String, AppError>;
}
