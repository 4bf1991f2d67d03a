use serde::{Deserialize, Serialize};

use crate::PricingError;

/// How a configurable charge behaves at checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentKind {
    Free,
    Fixed,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingComponent {
    pub amount_paise: i64,
    pub kind: ComponentKind,
    #[serde(default)]
    pub display_text: Option<String>,
}

impl PricingComponent {
    pub fn fixed(amount_paise: i64) -> Self {
        Self {
            amount_paise,
            kind: ComponentKind::Fixed,
            display_text: None,
        }
    }

    /// Amount actually charged: FREE and DISABLED components contribute nothing.
    pub fn effective_paise(&self) -> i64 {
        match self.kind {
            ComponentKind::Fixed => self.amount_paise.max(0),
            ComponentKind::Free | ComponentKind::Disabled => 0,
        }
    }
}

/// Platform-wide economics tunables. All money is in paise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PricingConfig {
    /// Base delivery fee, covers the first kilometre
    pub delivery_fee: PricingComponent,

    /// Customer-side rate for every kilometre after the first
    pub per_km_rate_paise: i64,

    pub platform_fee: PricingComponent,

    pub commission_pct: f64,
    pub min_commission_pct: f64,
    pub max_commission_pct: f64,

    pub weather_multiplier: f64,
    pub peak_multiplier: f64,
    pub max_delivery_fee_paise: i64,

    pub rider_base_pay_paise: i64,
    pub rider_per_km_paise: i64,
    pub rider_peak_bonus_paise: i64,
    pub rider_weather_bonus_paise: i64,

    /// Flat ad revenue from sponsored restaurants
    pub ad_tier_revenue_paise: i64,

    /// Share of the membership fee attributed to each member order
    pub membership_allocation_paise: i64,

    pub min_net_profit_paise: i64,

    /// Fees and payouts are rounded to this unit (100 = whole rupee)
    pub rounding_unit_paise: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            delivery_fee: PricingComponent::fixed(2_500),
            per_km_rate_paise: 600,
            platform_fee: PricingComponent::fixed(500),
            commission_pct: 15.0,
            min_commission_pct: 10.0,
            max_commission_pct: 20.0,
            weather_multiplier: 1.5,
            peak_multiplier: 1.2,
            max_delivery_fee_paise: 10_000,
            rider_base_pay_paise: 2_000,
            rider_per_km_paise: 600,
            rider_peak_bonus_paise: 1_000,
            rider_weather_bonus_paise: 1_500,
            ad_tier_revenue_paise: 500,
            membership_allocation_paise: 1_500,
            min_net_profit_paise: 500,
            rounding_unit_paise: 100,
        }
    }
}

impl PricingConfig {
    pub fn validate(&self) -> Result<(), PricingError> {
        let amounts = [
            ("delivery_fee", self.delivery_fee.amount_paise),
            ("platform_fee", self.platform_fee.amount_paise),
            ("per_km_rate_paise", self.per_km_rate_paise),
            ("max_delivery_fee_paise", self.max_delivery_fee_paise),
            ("rider_base_pay_paise", self.rider_base_pay_paise),
            ("rider_per_km_paise", self.rider_per_km_paise),
            ("rider_peak_bonus_paise", self.rider_peak_bonus_paise),
            ("rider_weather_bonus_paise", self.rider_weather_bonus_paise),
            ("ad_tier_revenue_paise", self.ad_tier_revenue_paise),
            ("membership_allocation_paise", self.membership_allocation_paise),
        ];
        if let Some((name, _)) = amounts.iter().find(|(_, v)| *v < 0) {
            return Err(PricingError::InvalidConfig(format!("{} must not be negative", name)));
        }

        if self.rounding_unit_paise <= 0 {
            return Err(PricingError::InvalidConfig("rounding_unit_paise must be positive".into()));
        }

        if self.min_commission_pct > self.max_commission_pct {
            return Err(PricingError::InvalidConfig("commission bounds are inverted".into()));
        }

        if !(self.min_commission_pct..=self.max_commission_pct).contains(&self.commission_pct) {
            return Err(PricingError::InvalidConfig(format!(
                "commission {}% outside [{}%, {}%]",
                self.commission_pct, self.min_commission_pct, self.max_commission_pct
            )));
        }

        for (name, m) in [("weather_multiplier", self.weather_multiplier), ("peak_multiplier", self.peak_multiplier)] {
            if !m.is_finite() || m < 1.0 {
                return Err(PricingError::InvalidConfig(format!("{} must be >= 1.0", name)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PricingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_commission_outside_bounds() {
        let config = PricingConfig { commission_pct: 25.0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let config = PricingConfig { rider_per_km_paise: -1, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rider_per_km_paise"));
    }

    #[test]
    fn test_free_component_charges_nothing() {
        let free = PricingComponent {
            amount_paise: 2_500,
            kind: ComponentKind::Free,
            display_text: Some("Free delivery".into()),
        };
        assert_eq!(free.effective_paise(), 0);
        assert_eq!(PricingComponent::fixed(500).effective_paise(), 500);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: PricingConfig = serde_json::from_str(r#"{"commission_pct": 12.5}"#).unwrap();
        assert_eq!(config.commission_pct, 12.5);
        assert_eq!(config.rider_base_pay_paise, 2_000);
    }
}
