use axum::{extract::State, routing::post, Extension, Json, Router};
use citybite_core::{Actor, Role};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::auth::issue_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub sub: String,
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
}

/// Operator-only; the router wraps it in `operator_middleware`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/admin/tokens", post(mint_token))
}

/// POST /v1/admin/tokens
/// Issues a bearer token for a customer, restaurant, rider or operator,
/// valid for the configured expiration.
async fn mint_token(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    if body.role == Role::System {
        return Err(AppError::ValidationError("system tokens cannot be issued".into()));
    }
    if body.sub.trim().is_empty() {
        return Err(AppError::ValidationError("sub must not be empty".into()));
    }

    let expires_in = state.auth.expiration;
    let token = issue_token(&state.auth.secret, &body.sub, body.role, body.name, expires_in)
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;

    tracing::info!(operator = ?actor.id(), sub = %body.sub, role = ?body.role, "Token issued");
    Ok(Json(TokenResponse { token, expires_in }))
}
