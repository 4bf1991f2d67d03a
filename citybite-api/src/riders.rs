use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use citybite_core::Actor;
use citybite_order::TelemetryReport;
use citybite_rider::{RiderState, TelemetryData, WalletTransaction};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::auth::{ensure, is_operator};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/riders/{id}", get(get_rider))
        .route("/v1/riders/{id}/telemetry", post(post_telemetry))
        .route("/v1/riders/{id}/withdrawals", post(withdraw))
        .route("/v1/riders/{id}/cod-deposits", post(deposit_cod))
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount_paise: i64,
}

/// POST /v1/riders/{id}/telemetry
async fn post_telemetry(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(rider_id): Path<String>,
    Json(sample): Json<TelemetryData>,
) -> Result<Json<TelemetryReport>, AppError> {
    ensure(actor.is_rider(&rider_id), "report telemetry for this rider")?;

    let report = state.service.record_telemetry(&rider_id, sample).await?;
    if let Some(flag) = report.analysis.flag {
        state.metrics.fraud_flags.with_label_values(&[flag.as_str()]).inc();
    }
    Ok(Json(report))
}

/// GET /v1/riders/{id}
async fn get_rider(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(rider_id): Path<String>,
) -> Result<Json<RiderState>, AppError> {
    ensure(actor.is_rider(&rider_id) || is_operator(&actor), "view this rider")?;
    Ok(Json(state.service.rider(&rider_id).await?))
}

/// POST /v1/riders/{id}/withdrawals
async fn withdraw(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(rider_id): Path<String>,
    Json(body): Json<AmountRequest>,
) -> Result<Json<WalletTransaction>, AppError> {
    ensure(actor.is_rider(&rider_id), "withdraw for this rider")?;
    let tx = state.service.rider_withdraw(&rider_id, body.amount_paise).await?;
    tracing::info!(rider_id = %rider_id, amount_paise = body.amount_paise, "Rider withdrawal recorded");
    Ok(Json(tx))
}

/// POST /v1/riders/{id}/cod-deposits
async fn deposit_cod(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(rider_id): Path<String>,
    Json(body): Json<AmountRequest>,
) -> Result<Json<WalletTransaction>, AppError> {
    ensure(actor.is_rider(&rider_id) || is_operator(&actor), "deposit cash for this rider")?;
    let tx = state.service.rider_deposit_cod(&rider_id, body.amount_paise).await?;
    tracing::info!(rider_id = %rider_id, amount_paise = body.amount_paise, "COD deposit recorded");
    Ok(Json(tx))
}
