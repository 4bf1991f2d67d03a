use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use citybite_core::Actor;
use citybite_order::OrderEvent;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::WEBHOOK_SECRET_HEADER;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub event: String,
    pub order_id: Uuid,
    pub payment_id: String,
}

/// POST /v1/webhooks/payments
/// Payment gateway callback. Only `payment.captured` moves an order; other
/// events are acknowledged and dropped.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PaymentWebhook>,
) -> Result<StatusCode, AppError> {
    let secret = headers.get(WEBHOOK_SECRET_HEADER).and_then(|h| h.to_str().ok());
    if secret != Some(state.auth.webhook_secret.as_str()) {
        return Err(AppError::AuthenticationError("invalid webhook secret".into()));
    }

    tracing::info!("Received payment webhook: {} for order {}", payload.event, payload.order_id);

    if payload.event == "payment.captured" {
        let event = OrderEvent::CapturePayment {
            payment_id: payload.payment_id,
        };
        match state.service.apply(payload.order_id, event, Actor::System).await {
            Ok(applied) => {
                state
                    .metrics
                    .record_event("capture_payment", if applied.changed { "ok" } else { "noop" });
            }
            Err(e) => {
                state.metrics.record_event("capture_payment", "error");
                return Err(e.into());
            }
        }
    }

    Ok(StatusCode::OK)
}
