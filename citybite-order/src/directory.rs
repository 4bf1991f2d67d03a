use serde::{Deserialize, Serialize};

/// Server-held facts about a customer. Checkout reads membership from here,
/// never from the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerProfile {
    pub customer_id: String,
    #[serde(default)]
    pub is_member: bool,
}

impl CustomerProfile {
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            is_member: false,
        }
    }
}

/// City-wide demand signals set by operators. Peak is also derived from the
/// configured peak windows.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarketConditions {
    pub is_peak_hour: bool,
    pub is_weather_bad: bool,
}
