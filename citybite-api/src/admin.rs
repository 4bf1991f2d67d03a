use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Extension, Json, Router,
};
use citybite_core::Actor;
use citybite_order::{CustomerProfile, MarketConditions, RestaurantProfile};
use citybite_pricing::{PricingConfig, VersionedPricing};
use citybite_rider::RiderState;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

/// Operator-only routes; the router wraps them in `operator_middleware`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/pricing", get(get_pricing).put(put_pricing))
        .route("/v1/admin/riders/{id}/reset-suspicion", post(reset_suspicion))
        .route("/v1/admin/restaurants/{id}", put(put_restaurant))
        .route("/v1/admin/customers/{id}/membership", put(put_membership))
        .route("/v1/admin/conditions", get(get_conditions).put(put_conditions))
}

#[derive(Debug, Deserialize)]
pub struct MembershipRequest {
    pub is_member: bool,
}

/// GET /v1/admin/pricing
async fn get_pricing(State(state): State<AppState>) -> Json<VersionedPricing> {
    Json(state.service.pricing().as_ref().clone())
}

/// PUT /v1/admin/pricing
/// Applies to orders placed from now on; placed orders keep their snapshot.
async fn put_pricing(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(config): Json<PricingConfig>,
) -> Result<Json<VersionedPricing>, AppError> {
    let next = state.service.update_pricing(config)?;
    tracing::info!(operator = ?actor.id(), version = next.version, "Pricing config replaced");
    Ok(Json(next.as_ref().clone()))
}

/// POST /v1/admin/riders/{id}/reset-suspicion
async fn reset_suspicion(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(rider_id): Path<String>,
) -> Result<Json<RiderState>, AppError> {
    let rider = state.service.reset_suspicion(&rider_id).await?;
    tracing::info!(operator = ?actor.id(), rider_id = %rider_id, "Rider suspicion reset");
    Ok(Json(rider))
}

/// PUT /v1/admin/restaurants/{id}
async fn put_restaurant(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
    Json(mut profile): Json<RestaurantProfile>,
) -> Result<Json<RestaurantProfile>, AppError> {
    profile.id = restaurant_id;
    Ok(Json(state.service.register_restaurant(profile).await?))
}

/// PUT /v1/admin/customers/{id}/membership
async fn put_membership(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(body): Json<MembershipRequest>,
) -> Result<Json<CustomerProfile>, AppError> {
    Ok(Json(state.service.set_membership(&customer_id, body.is_member).await?))
}

/// GET /v1/admin/conditions
async fn get_conditions(State(state): State<AppState>) -> Json<MarketConditions> {
    Json(state.service.conditions())
}

/// PUT /v1/admin/conditions
/// Weather and manual peak surge for orders placed from now on.
async fn put_conditions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(conditions): Json<MarketConditions>,
) -> Json<MarketConditions> {
    state.service.set_conditions(conditions);
    tracing::info!(operator = ?actor.id(), "Market conditions replaced");
    Json(conditions)
}
