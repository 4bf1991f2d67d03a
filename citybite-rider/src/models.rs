use chrono::{DateTime, Utc};
use citybite_core::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fraud::FraudAnalysis;

/// One GPS fix reported by a rider's device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryData {
    pub lat: f64,
    pub lng: f64,
    /// Reported accuracy radius in metres
    pub accuracy_m: f64,
    #[serde(default)]
    pub speed_kmh: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryData {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    Idle,
    OnDelivery,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionSource {
    OrderPayout,
    Tip,
    Withdrawal,
    CodDeposit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub source: TransactionSource,
    /// Positive for credits, negative for debits
    pub amount_paise: i64,
    pub description: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiderState {
    pub rider_id: String,
    pub name: Option<String>,
    pub wallet_balance_paise: i64,
    /// Cash collected on COD orders and not yet deposited
    pub cod_balance_paise: i64,
    pub suspicion_score: u32,
    pub freeze_count: u32,
    pub accuracy_abuse_count: u32,
    pub last_telemetry: Option<TelemetryData>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub active_order_id: Option<Uuid>,
    pub availability: Availability,
    pub total_deliveries: u32,
    pub wallet_history: Vec<WalletTransaction>,
}

impl RiderState {
    pub fn new(rider_id: impl Into<String>) -> Self {
        Self {
            rider_id: rider_id.into(),
            name: None,
            wallet_balance_paise: 0,
            cod_balance_paise: 0,
            suspicion_score: 0,
            freeze_count: 0,
            accuracy_abuse_count: 0,
            last_telemetry: None,
            last_seen_at: None,
            active_order_id: None,
            availability: Availability::Idle,
            total_deliveries: 0,
            wallet_history: Vec::new(),
        }
    }

    /// Fold one analysed sample into the trailing counters.
    pub fn record_sample(&mut self, sample: TelemetryData, analysis: &FraudAnalysis) {
        self.suspicion_score = self.suspicion_score.saturating_add(analysis.score_increase);

        self.freeze_count = if analysis.freeze_sample {
            self.freeze_count.saturating_add(1)
        } else {
            0
        };
        self.accuracy_abuse_count = if analysis.accuracy_sample {
            self.accuracy_abuse_count.saturating_add(1)
        } else {
            0
        };

        self.last_seen_at = Some(sample.timestamp);
        self.last_telemetry = Some(sample);
    }

    /// Operator action; the only way the score ever goes down.
    pub fn reset_suspicion(&mut self) {
        self.suspicion_score = 0;
        self.freeze_count = 0;
        self.accuracy_abuse_count = 0;
    }
}
