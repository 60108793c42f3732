use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use souk_core::identity::Principal;

use crate::error::AppError;
use crate::middleware::MarketClaims;
use crate::state::AuthConfig;

/// Signs a bearer token for `principal`, valid for the configured lifetime.
pub fn issue_token(auth: &AuthConfig, principal: &Principal) -> Result<String, AppError> {
    let exp = (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize;
    let claims = MarketClaims::from_principal(principal, exp);

    encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}
