use chrono::{DateTime, Duration, Timelike, Utc};
use citybite_core::geo::ServiceArea;
use serde::{Deserialize, Serialize};

/// Local hours `[start_hour, end_hour)` treated as peak demand.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeakWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl PeakWindow {
    fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            // wraps midnight
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Operational rules for the order runtime, loaded from the `business_rules`
/// config section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusinessRules {
    /// Window a restaurant has to accept before the order auto-expires
    pub auto_expire_seconds: u64,
    pub settlement_interval_hours: i64,
    pub tax_rate: f64,
    /// Copy the full pricing config onto each order for audit
    pub snapshot_pricing: bool,
    pub service_area: Option<ServiceArea>,
    /// Cadence of the settlement and stale-order sweeps
    pub sweep_interval_seconds: u64,
    /// Upper bound on items plus packing for a single order
    pub max_order_value_paise: i64,
    /// Offset of the city's local time from UTC, used for peak windows
    pub utc_offset_minutes: i32,
    pub peak_hours: Vec<PeakWindow>,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            auto_expire_seconds: 300,
            settlement_interval_hours: 24,
            tax_rate: 0.05,
            snapshot_pricing: true,
            service_area: None,
            sweep_interval_seconds: 60,
            max_order_value_paise: 10_000_000,
            utc_offset_minutes: 330,
            peak_hours: vec![
                PeakWindow { start_hour: 12, end_hour: 14 },
                PeakWindow { start_hour: 19, end_hour: 22 },
            ],
        }
    }
}

impl BusinessRules {
    pub fn auto_expire_after(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.auto_expire_seconds)
    }

    pub fn settlement_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.settlement_interval_hours)
    }

    pub fn is_peak_at(&self, now: DateTime<Utc>) -> bool {
        let hour = (now + Duration::minutes(self.utc_offset_minutes as i64)).hour();
        self.peak_hours.iter().any(|w| w.contains(hour))
    }
}
