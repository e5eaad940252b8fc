//! JWT token generation and validation

use crate::core::error::{LeafError, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub exp: usize,
}

/// Generate an HS256 token for a user, valid for `ttl_hours`
pub fn generate_token(user_id: &str, secret: &str, ttl_hours: i64) -> Result<String> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(ttl_hours))
        .ok_or_else(|| LeafError::AuthenticationError("Failed to calculate expiration".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        user_id: user_id.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| LeafError::AuthenticationError(format!("Failed to generate token: {}", e)))
}

/// Validate a token's signature and expiry and extract its claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| LeafError::AuthenticationError(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}
