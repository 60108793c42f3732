use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use souk_core::identity::{Principal, Role};
use souk_shared::Id;

use crate::error::AppError;
use crate::state::AppState;

pub const ROLE_CLIENT: &str = "CLIENT";
pub const ROLE_VENDOR: &str = "VENDOR";
pub const ROLE_DELIVERY_AGENT: &str = "DELIVERY_AGENT";
pub const ROLE_SUPERUSER: &str = "SUPERUSER";

/// Bearer token payload. `sub` is the user id, `profile_id` the client,
/// vendor or delivery agent profile the role acts as.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MarketClaims {
    pub sub: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<Id>,
    pub exp: usize,
}

impl MarketClaims {
    pub fn from_principal(principal: &Principal, exp: usize) -> Self {
        let (role, profile_id) = match principal.role {
            Role::Client(id) => (ROLE_CLIENT, Some(id)),
            Role::Vendor(id) => (ROLE_VENDOR, Some(id)),
            Role::DeliveryAgent(id) => (ROLE_DELIVERY_AGENT, Some(id)),
            Role::Superuser => (ROLE_SUPERUSER, None),
        };
        Self {
            sub: principal.user_id.to_string(),
            role: role.to_owned(),
            profile_id,
            exp,
        }
    }

    pub fn principal(&self) -> Result<Principal, AppError> {
        let user_id: Id = self
            .sub
            .parse()
            .map_err(|_| AppError::AuthenticationError("token subject is not a user id".to_string()))?;
        let profile = || {
            self.profile_id
                .ok_or_else(|| AppError::AuthenticationError(format!("{} token without profile_id", self.role)))
        };
        let role = match self.role.as_str() {
            ROLE_CLIENT => Role::Client(profile()?),
            ROLE_VENDOR => Role::Vendor(profile()?),
            ROLE_DELIVERY_AGENT => Role::DeliveryAgent(profile()?),
            ROLE_SUPERUSER => Role::Superuser,
            other => return Err(AppError::AuthenticationError(format!("unknown role {}", other))),
        };
        Ok(Principal::new(user_id, role))
    }
}

/// Resolves the bearer token into a `Principal` request extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("missing bearer token".to_string()))?;

    let token_data = decode::<MarketClaims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(format!("invalid token: {}", e)))?;

    let principal = token_data.claims.principal()?;
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_resolve_to_principal() {
        let agent = Principal::new(1007, Role::DeliveryAgent(7));
        let claims = MarketClaims::from_principal(&agent, 0);
        assert_eq!(claims.role, "DELIVERY_AGENT");
        assert_eq!(claims.principal().unwrap(), agent);

        let admin = MarketClaims::from_principal(&Principal::new(1, Role::Superuser), 0);
        assert_eq!(admin.profile_id, None);
        assert!(admin.principal().unwrap().is_superuser());
    }

    #[test]
    fn test_profile_roles_need_a_profile_id() {
        let claims = MarketClaims {
            sub: "12".to_string(),
            role: ROLE_VENDOR.to_string(),
            profile_id: None,
            exp: 0,
        };
        assert!(matches!(claims.principal(), Err(AppError::AuthenticationError(_))));

        let claims = MarketClaims {
            role: "GUEST".to_string(),
            profile_id: Some(3),
            ..claims
        };
        assert!(claims.principal().is_err());
    }
}
