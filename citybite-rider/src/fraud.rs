use citybite_core::geo::haversine_km;
use citybite_shared::OrderStatus;
use serde::{Deserialize, Serialize};

use crate::models::{RiderState, TelemetryData};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudFlag {
    ImpossibleSpeed,
    TeleportDetected,
    LocationFreeze,
    AccuracyAbuse,
}

impl FraudFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            FraudFlag::ImpossibleSpeed => "IMPOSSIBLE_SPEED",
            FraudFlag::TeleportDetected => "TELEPORT_DETECTED",
            FraudFlag::LocationFreeze => "LOCATION_FREEZE",
            FraudFlag::AccuracyAbuse => "ACCURACY_ABUSE",
        }
    }
}

/// Measurements backing a raised flag, kept for operator review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Speed { speed_kmh: f64, limit_kmh: f64 },
    Teleport { distance_km: f64, elapsed_secs: f64 },
    Freeze { elapsed_secs: f64, freeze_count: u32 },
    Accuracy { accuracy_m: f64, abuse_count: u32 },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FraudAnalysis {
    pub score_increase: u32,
    pub flag: Option<FraudFlag>,
    pub evidence: Option<Evidence>,
    /// Sample counts toward the freeze streak
    pub freeze_sample: bool,
    /// Sample counts toward the accuracy-abuse streak
    pub accuracy_sample: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FraudThresholds {
    pub max_speed_kmh: f64,
    pub teleport_distance_km: f64,
    pub teleport_window_secs: f64,
    pub freeze_distance_km: f64,
    pub freeze_min_elapsed_secs: f64,
    pub freeze_streak: u32,
    pub max_accuracy_m: f64,
    pub accuracy_streak: u32,
}

impl Default for FraudThresholds {
    fn default() -> Self {
        Self {
            max_speed_kmh: 120.0,
            teleport_distance_km: 3.0,
            teleport_window_secs: 60.0,
            // 0.1 m
            freeze_distance_km: 0.0001,
            freeze_min_elapsed_secs: 30.0,
            freeze_streak: 10,
            max_accuracy_m: 200.0,
            accuracy_streak: 3,
        }
    }
}

/// Compares a rider's next GPS sample with the previous one. Produces a score
/// delta and at most one flag; it never blocks a rider on its own.
#[derive(Debug, Clone, Default)]
pub struct FraudGuard {
    thresholds: FraudThresholds,
}

impl FraudGuard {
    pub fn new(thresholds: FraudThresholds) -> Self {
        Self { thresholds }
    }

    pub fn analyze(
        &self,
        rider: &RiderState,
        next: &TelemetryData,
        current_status: Option<OrderStatus>,
    ) -> FraudAnalysis {
        let t = &self.thresholds;
        let mut analysis = FraudAnalysis {
            accuracy_sample: next.accuracy_m > t.max_accuracy_m,
            ..Default::default()
        };

        let Some(prev) = rider.last_telemetry.as_ref() else {
            return analysis;
        };

        let distance_km = haversine_km(prev.position(), next.position());
        let elapsed_secs = (next.timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0;
        let delivering = current_status == Some(OrderStatus::OutForDelivery);

        // Speed
        if elapsed_secs > 0.0 {
            let speed_kmh = distance_km / (elapsed_secs / 3600.0);
            if speed_kmh > t.max_speed_kmh {
                analysis.score_increase += 3;
                analysis.flag = Some(FraudFlag::ImpossibleSpeed);
                analysis.evidence = Some(Evidence::Speed { speed_kmh, limit_kmh: t.max_speed_kmh });
            }
        }

        // Teleport
        if elapsed_secs < t.teleport_window_secs && distance_km > t.teleport_distance_km {
            analysis.score_increase += 3;
            analysis.flag = Some(FraudFlag::TeleportDetected);
            analysis.evidence = Some(Evidence::Teleport { distance_km, elapsed_secs });
        }

        // Freeze
        let stationary = distance_km < t.freeze_distance_km;
        analysis.freeze_sample = stationary && delivering;
        if analysis.freeze_sample
            && elapsed_secs > t.freeze_min_elapsed_secs
            && rider.freeze_count > t.freeze_streak
        {
            analysis.score_increase += 2;
            analysis.flag = Some(FraudFlag::LocationFreeze);
            analysis.evidence = Some(Evidence::Freeze { elapsed_secs, freeze_count: rider.freeze_count });
        }

        // Accuracy
        if analysis.accuracy_sample && rider.accuracy_abuse_count > t.accuracy_streak {
            analysis.score_increase += 1;
            analysis.flag = Some(FraudFlag::AccuracyAbuse);
            analysis.evidence = Some(Evidence::Accuracy {
                accuracy_m: next.accuracy_m,
                abuse_count: rider.accuracy_abuse_count,
            });
        }

        if let Some(flag) = analysis.flag {
            tracing::warn!(
                rider_id = %rider.rider_id,
                flag = flag.as_str(),
                score_increase = analysis.score_increase,
                "Telemetry anomaly detected"
            );
        }

        analysis
    }
}
