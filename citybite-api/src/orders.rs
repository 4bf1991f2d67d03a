use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use citybite_core::Actor;
use citybite_order::{Applied, Order, OrderDraft, OrderEvent};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::ensure;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(place_order))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/events", post(post_event))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Order,
    pub version: u64,
    pub changed: bool,
}

impl From<Applied> for OrderResponse {
    fn from(applied: Applied) -> Self {
        Self {
            order: applied.order,
            version: applied.version,
            changed: applied.changed,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
///
/// The body is an `OrderDraft`. Restaurant facts, membership and surge
/// conditions come from the server; UPI orders start PENDING until the
/// gateway webhook confirms capture.
async fn place_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(draft): Json<OrderDraft>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let Actor::Customer { id: customer_id } = actor else {
        return Err(AppError::AuthorizationError("only customers place orders".into()));
    };

    let applied = state.service.place_order(&customer_id, draft).await?;
    state.metrics.orders_placed.inc();
    Ok((StatusCode::CREATED, Json(applied.into())))
}

/// GET /v1/orders/{id}
async fn get_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.service.order(order_id).await?;
    ensure(can_view(&actor, &order), "view this order")?;
    Ok(Json(order))
}

/// POST /v1/orders/{id}/events
///
/// Body is the tagged event, e.g. `{"type": "accept", "prep_time_minutes": 20}`.
/// Role checks happen in the state machine.
async fn post_event(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
    Json(event): Json<OrderEvent>,
) -> Result<Json<OrderResponse>, AppError> {
    if matches!(event, OrderEvent::TrackLocation { .. }) {
        return Err(AppError::ValidationError(
            "locations are reported through /v1/riders/{id}/telemetry".into(),
        ));
    }

    let name = event.name();
    match state.service.apply(order_id, event, actor).await {
        Ok(applied) => {
            let outcome = if applied.changed { "ok" } else { "noop" };
            state.metrics.record_event(name, outcome);
            Ok(Json(applied.into()))
        }
        Err(e) => {
            state.metrics.record_event(name, "error");
            Err(e.into())
        }
    }
}

fn can_view(actor: &Actor, order: &Order) -> bool {
    match actor {
        Actor::Customer { id } => *id == order.customer_id,
        Actor::Restaurant { id } => *id == order.restaurant_id,
        Actor::Rider { id, .. } => order.is_assigned_to(id),
        Actor::Operator { .. } | Actor::System => true,
    }
}

