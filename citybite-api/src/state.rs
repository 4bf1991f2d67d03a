use citybite_core::notify::BroadcastDispatcher;
use citybite_order::OrderService;
use std::sync::Arc;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    pub webhook_secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub service: OrderService,
    /// Source for the SSE stream; the service dispatches into the same channel.
    pub notifications: BroadcastDispatcher,
    pub auth: AuthConfig,
    pub metrics: Arc<Metrics>,
}
