use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use citybite_core::Actor;
use citybite_order::wallet::WithdrawalRequest;
use citybite_order::{RestaurantWallet, SettlementOutcome};
use serde::Serialize;

use crate::error::AppError;
use crate::middleware::auth::{ensure, is_operator};
use crate::riders::AmountRequest;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/restaurants/{id}/wallet", get(get_wallet))
        .route("/v1/restaurants/{id}/wallet/settle", post(settle))
        .route("/v1/restaurants/{id}/wallet/withdrawals", post(withdraw))
}

#[derive(Debug, Serialize)]
pub struct SettleResponse {
    pub wallet: RestaurantWallet,
    pub outcome: SettlementOutcome,
}

fn owns_wallet(actor: &Actor, restaurant_id: &str) -> bool {
    actor.is_restaurant(restaurant_id) || is_operator(actor)
}

/// GET /v1/restaurants/{id}/wallet
async fn get_wallet(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(restaurant_id): Path<String>,
) -> Result<Json<RestaurantWallet>, AppError> {
    ensure(owns_wallet(&actor, &restaurant_id), "view this wallet")?;
    Ok(Json(state.service.wallet(&restaurant_id, Utc::now()).await?))
}

/// POST /v1/restaurants/{id}/wallet/settle
async fn settle(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(restaurant_id): Path<String>,
) -> Result<Json<SettleResponse>, AppError> {
    ensure(owns_wallet(&actor, &restaurant_id), "settle this wallet")?;
    let (wallet, outcome) = state.service.settle_wallet(&restaurant_id, Utc::now()).await?;
    let label = match outcome {
        SettlementOutcome::Settled { .. } => "settled",
        SettlementOutcome::Skipped(_) => "skipped",
    };
    state.metrics.settlements.with_label_values(&[label]).inc();
    Ok(Json(SettleResponse { wallet, outcome }))
}

/// POST /v1/restaurants/{id}/wallet/withdrawals
async fn withdraw(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(restaurant_id): Path<String>,
    Json(body): Json<AmountRequest>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    ensure(actor.is_restaurant(&restaurant_id), "withdraw from this wallet")?;
    let request = state
        .service
        .withdraw_restaurant(&restaurant_id, body.amount_paise, Utc::now())
        .await?;
    Ok(Json(request))
}
