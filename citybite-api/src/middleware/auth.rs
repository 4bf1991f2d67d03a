use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use citybite_core::{Actor, Role};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
    pub exp: usize,
}

impl Claims {
    /// `None` for roles a token may not carry.
    pub fn into_actor(self) -> Option<Actor> {
        let id = self.sub;
        match self.role {
            Role::Customer => Some(Actor::Customer { id }),
            Role::Restaurant => Some(Actor::Restaurant { id }),
            Role::Rider => Some(Actor::Rider {
                id,
                name: self.name.unwrap_or_default(),
            }),
            Role::Operator => Some(Actor::Operator { id }),
            // Timers and webhooks only
            Role::System => None,
        }
    }
}

pub fn issue_token(
    secret: &str,
    sub: &str,
    role: Role,
    name: Option<String>,
    ttl_seconds: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: sub.to_string(),
        role,
        name,
        exp: (chrono::Utc::now().timestamp() as u64 + ttl_seconds) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

// ============================================================================
// Actor Authentication Middleware
// ============================================================================

pub async fn actor_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract bearer token
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Decode and validate JWT
    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    // 3. Map claims to an actor
    let actor = token_data.claims.into_actor().ok_or(StatusCode::FORBIDDEN)?;

    // 4. Inject actor
    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}

// ============================================================================
// Operator Middleware (runs after actor_auth_middleware)
// ============================================================================

pub async fn operator_middleware(req: Request, next: Next) -> Result<Response, StatusCode> {
    match req.extensions().get::<Actor>() {
        Some(Actor::Operator { .. }) => Ok(next.run(req).await),
        Some(_) => Err(StatusCode::FORBIDDEN),
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

// ============================================================================
// Access helpers
// ============================================================================

pub fn ensure(allowed: bool, what: &str) -> Result<(), AppError> {
    if allowed {
        Ok(())
    } else {
        Err(AppError::AuthorizationError(format!("not allowed to {}", what)))
    }
}

pub fn is_operator(actor: &Actor) -> bool {
    matches!(actor, Actor::Operator { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip_to_actor() {
        let token = issue_token("secret", "rd-9", Role::Rider, Some("Ravi".into()), 60).unwrap();
        let data = decode::<Claims>(&token, &DecodingKey::from_secret(b"secret"), &Validation::default()).unwrap();
        assert_eq!(
            data.claims.into_actor(),
            Some(Actor::Rider {
                id: "rd-9".into(),
                name: "Ravi".into()
            })
        );
    }

    #[test]
    fn test_system_role_is_not_accepted_from_tokens() {
        let claims = Claims {
            sub: "x".into(),
            role: Role::System,
            name: None,
            exp: 0,
        };
        assert_eq!(claims.into_actor(), None);
    }
}
