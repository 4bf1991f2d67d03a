use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderName},
};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::state::AppState;

/// Collectors live in a registry owned by the app state rather than the
/// process-global one, so several routers can coexist in one test binary.
pub struct Metrics {
    registry: Registry,
    pub orders_placed: IntCounter,
    pub order_events: IntCounterVec,
    pub fraud_flags: IntCounterVec,
    pub settlements: IntCounterVec,
    pub live_mailboxes: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("citybite".into()), None)?;

        let orders_placed = IntCounter::new("orders_placed_total", "Orders accepted at checkout")?;
        let order_events = IntCounterVec::new(
            Opts::new("order_events_total", "Order events by name and outcome"),
            &["event", "outcome"],
        )?;
        let fraud_flags = IntCounterVec::new(Opts::new("fraud_flags_total", "Telemetry fraud flags raised"), &["flag"])?;
        let settlements = IntCounterVec::new(
            Opts::new("wallet_settlements_total", "Wallet settlement attempts by outcome"),
            &["outcome"],
        )?;
        let live_mailboxes = IntGauge::new("order_mailboxes", "Order actors currently running")?;

        registry.register(Box::new(orders_placed.clone()))?;
        registry.register(Box::new(order_events.clone()))?;
        registry.register(Box::new(fraud_flags.clone()))?;
        registry.register(Box::new(settlements.clone()))?;
        registry.register(Box::new(live_mailboxes.clone()))?;

        Ok(Self {
            registry,
            orders_placed,
            order_events,
            fraud_flags,
            settlements,
            live_mailboxes,
        })
    }

    pub fn record_event(&self, event: &str, outcome: &str) {
        self.order_events.with_label_values(&[event, outcome]).inc();
    }

    pub fn encode(&self) -> (String, Vec<u8>) {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::error!(error = %e, "Failed to encode prometheus metrics");
        }
        (encoder.format_type().to_string(), buf)
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> ([(HeaderName, String); 1], Bytes) {
    state.metrics.live_mailboxes.set(state.service.live_mailboxes() as i64);
    let (content_type, buf) = state.metrics.encode();
    ([(CONTENT_TYPE, content_type)], buf.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported_with_prefix() {
        let metrics = Metrics::new().unwrap();
        metrics.record_event("accept", "ok");
        metrics.fraud_flags.with_label_values(&["IMPOSSIBLE_SPEED"]).inc();

        let (_, buf) = metrics.encode();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("citybite_order_events_total{event=\"accept\",outcome=\"ok\"} 1"));
        assert!(text.contains("citybite_fraud_flags_total"));
    }
}
