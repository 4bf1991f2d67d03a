use axum::{
    http::Method,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod orders;
pub mod restaurants;
pub mod riders;
pub mod state;
pub mod stream;
pub mod webhooks;
pub mod worker;

pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let admin = admin::routes()
        .merge(auth::routes())
        .route_layer(axum::middleware::from_fn(middleware::operator_middleware));

    let authenticated = Router::new()
        .merge(orders::routes())
        .merge(riders::routes())
        .merge(restaurants::routes())
        .merge(admin)
        .route("/v1/events/stream", get(stream::event_stream))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::actor_auth_middleware,
        ));

    Router::new()
        .merge(authenticated)
        .route("/v1/webhooks/payments", post(webhooks::handle_payment_webhook))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
