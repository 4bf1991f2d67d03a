use serde::{Deserialize, Serialize};

use crate::config::PricingConfig;
use crate::store::VersionedPricing;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RestaurantStats {
    pub monthly_volume: u32,
    pub rating: f64,
    pub is_sponsored: bool,
}

/// Everything the engine needs to price one order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FinancialContext {
    pub distance_km: f64,
    /// Items plus packing, in paise
    pub order_value_paise: i64,
    pub is_peak_hour: bool,
    pub is_weather_bad: bool,
    pub is_member: bool,
    pub restaurant_stats: RestaurantStats,
}

/// Who absorbs the gap between rider payout and customer delivery fee.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubsidySource {
    None,
    Platform,
    Restaurant,
    Membership,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialBreakdown {
    pub customer_delivery_fee: i64,
    pub delivery_cost_internal: i64,
    pub subsidy_amount: i64,
    pub subsidy_source: SubsidySource,
    pub commission_pct: f64,
    pub commission_value: i64,
    pub platform_fee: i64,
    pub ad_revenue: i64,
    pub gross_platform_revenue: i64,
    pub rider_payout: i64,
    pub net_profit: i64,
    /// Advisory only; never blocks an order.
    pub is_profitable: bool,
    pub config_version: u64,
    pub audit_log: Vec<String>,
}

/// Pure pricing: the same context and config always produce the same breakdown.
pub struct EconomicsEngine;

impl EconomicsEngine {
    pub fn calculate(ctx: &FinancialContext, config: &PricingConfig) -> FinancialBreakdown {
        let unit = config.rounding_unit_paise;
        let distance = sanitize_distance(ctx.distance_km);
        let order_value = ctx.order_value_paise.max(0);

        // 1. Customer delivery fee
        let customer_delivery_fee = if ctx.is_member {
            0
        } else {
            let mut fee = config.delivery_fee.effective_paise() as f64
                + (distance - 1.0).max(0.0) * config.per_km_rate_paise as f64;
            if ctx.is_weather_bad {
                fee *= config.weather_multiplier;
            }
            if ctx.is_peak_hour {
                fee *= config.peak_multiplier;
            }
            round_to_unit(fee, unit).min(config.max_delivery_fee_paise)
        };

        // 2. Platform revenue
        let commission_value = (order_value as f64 * config.commission_pct / 100.0).round() as i64;
        let platform_fee = config.platform_fee.effective_paise();
        let ad_revenue = if ctx.restaurant_stats.is_sponsored {
            config.ad_tier_revenue_paise
        } else {
            0
        };
        let gross_platform_revenue = commission_value + platform_fee + ad_revenue;

        // 3. Rider payout
        let mut payout = config.rider_base_pay_paise as f64 + distance * config.rider_per_km_paise as f64;
        if ctx.is_peak_hour {
            payout += config.rider_peak_bonus_paise as f64;
        }
        if ctx.is_weather_bad {
            payout += config.rider_weather_bonus_paise as f64;
        }
        let rider_payout = round_to_unit(payout, unit);

        // 4. Subsidy and profitability
        let subsidy_amount = (rider_payout - customer_delivery_fee).max(0);
        let subsidy_source = match (subsidy_amount, ctx.is_member) {
            (0, _) => SubsidySource::None,
            (_, true) => SubsidySource::Membership,
            (_, false) => SubsidySource::Platform,
        };
        let membership_share = if ctx.is_member {
            config.membership_allocation_paise
        } else {
            0
        };
        let net_profit = gross_platform_revenue + membership_share - subsidy_amount;
        let is_profitable = net_profit >= config.min_net_profit_paise;

        let audit_log = vec![format!(
            "[ECON] Fee:{:.2} | Profit:{:.2}",
            customer_delivery_fee as f64 / 100.0,
            net_profit as f64 / 100.0
        )];

        FinancialBreakdown {
            customer_delivery_fee,
            delivery_cost_internal: rider_payout,
            subsidy_amount,
            subsidy_source,
            commission_pct: config.commission_pct,
            commission_value,
            platform_fee,
            ad_revenue,
            gross_platform_revenue,
            rider_payout,
            net_profit,
            is_profitable,
            config_version: 0,
            audit_log,
        }
    }

    /// Same as [`calculate`](Self::calculate), stamped with the snapshot version.
    pub fn calculate_snapshot(ctx: &FinancialContext, snapshot: &VersionedPricing) -> FinancialBreakdown {
        let mut breakdown = Self::calculate(ctx, &snapshot.config);
        breakdown.config_version = snapshot.version;
        breakdown
    }
}

fn sanitize_distance(km: f64) -> f64 {
    if km.is_finite() && km > 0.0 {
        km
    } else {
        0.0
    }
}

pub(crate) fn round_to_unit(value: f64, unit: i64) -> i64 {
    let unit = unit.max(1) as f64;
    ((value / unit).round() * unit) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PricingComponent;

    fn reference_config() -> PricingConfig {
        PricingConfig {
            delivery_fee: PricingComponent::fixed(2_500),
            per_km_rate_paise: 500,
            platform_fee: PricingComponent::fixed(500),
            commission_pct: 15.0,
            rider_base_pay_paise: 2_000,
            rider_per_km_paise: 600,
            ..Default::default()
        }
    }

    fn context(distance_km: f64, order_value_paise: i64) -> FinancialContext {
        FinancialContext {
            distance_km,
            order_value_paise,
            ..Default::default()
        }
    }

    #[test]
    fn test_reference_order() {
        let b = EconomicsEngine::calculate(&context(4.0, 30_000), &reference_config());

        assert_eq!(b.customer_delivery_fee, 4_000);
        assert_eq!(b.rider_payout, 4_400);
        assert_eq!(b.commission_value, 4_500);
        assert_eq!(b.gross_platform_revenue, 5_000);
        assert_eq!(b.subsidy_amount, 400);
        assert_eq!(b.subsidy_source, SubsidySource::Platform);
        assert_eq!(b.net_profit, 4_600);
        assert!(b.is_profitable);
        assert_eq!(b.audit_log, vec!["[ECON] Fee:40.00 | Profit:46.00".to_string()]);
    }

    #[test]
    fn test_deterministic() {
        let ctx = FinancialContext {
            distance_km: 7.3,
            order_value_paise: 54_990,
            is_peak_hour: true,
            is_weather_bad: true,
            is_member: false,
            restaurant_stats: RestaurantStats { monthly_volume: 900, rating: 4.4, is_sponsored: true },
        };
        let config = PricingConfig::default();
        assert_eq!(EconomicsEngine::calculate(&ctx, &config), EconomicsEngine::calculate(&ctx, &config));
    }

    #[test]
    fn test_fee_is_capped() {
        let ctx = FinancialContext {
            distance_km: 40.0,
            order_value_paise: 10_000,
            is_peak_hour: true,
            is_weather_bad: true,
            ..Default::default()
        };
        let config = PricingConfig::default();
        let b = EconomicsEngine::calculate(&ctx, &config);
        assert_eq!(b.customer_delivery_fee, config.max_delivery_fee_paise);
    }

    #[test]
    fn test_members_pay_no_delivery_fee() {
        let ctx = FinancialContext { is_member: true, ..context(4.0, 30_000) };
        let b = EconomicsEngine::calculate(&ctx, &reference_config());
        assert_eq!(b.customer_delivery_fee, 0);
        assert_eq!(b.subsidy_amount, 4_400);
        assert_eq!(b.subsidy_source, SubsidySource::Membership);
        // 5000 revenue + 1500 membership share - 4400 subsidy
        assert_eq!(b.net_profit, 2_100);
    }

    #[test]
    fn test_surge_multipliers_and_bonuses() {
        let ctx = FinancialContext {
            is_peak_hour: true,
            is_weather_bad: true,
            ..context(4.0, 30_000)
        };
        let b = EconomicsEngine::calculate(&ctx, &reference_config());
        // 40 * 1.5 * 1.2 = 72
        assert_eq!(b.customer_delivery_fee, 7_200);
        // 44 + 10 + 15
        assert_eq!(b.rider_payout, 6_900);
        assert_eq!(b.subsidy_amount, 0);
        assert_eq!(b.subsidy_source, SubsidySource::None);
    }

    #[test]
    fn test_short_trip_charges_base_only() {
        let b = EconomicsEngine::calculate(&context(0.6, 20_000), &reference_config());
        assert_eq!(b.customer_delivery_fee, 2_500);
    }

    #[test]
    fn test_fee_rounds_to_whole_rupee() {
        // 25 + 1.37 * 5 = 31.85 -> 32
        let b = EconomicsEngine::calculate(&context(2.37, 20_000), &reference_config());
        assert_eq!(b.customer_delivery_fee, 3_200);
    }

    #[test]
    fn test_sponsored_restaurant_adds_ad_revenue() {
        let ctx = FinancialContext {
            restaurant_stats: RestaurantStats { is_sponsored: true, ..Default::default() },
            ..context(4.0, 30_000)
        };
        let b = EconomicsEngine::calculate(&ctx, &reference_config());
        assert_eq!(b.ad_revenue, 500);
        assert_eq!(b.gross_platform_revenue, 5_500);
    }

    #[test]
    fn test_bad_inputs_degrade() {
        let config = reference_config();
        for km in [f64::NAN, -3.0, f64::INFINITY] {
            let b = EconomicsEngine::calculate(&context(km, -500), &config);
            assert_eq!(b.customer_delivery_fee, 2_500);
            assert_eq!(b.rider_payout, 2_000);
            assert_eq!(b.commission_value, 0);
        }
    }

    #[test]
    fn test_unprofitable_order_is_flagged_not_rejected() {
        let ctx = FinancialContext { is_weather_bad: false, ..context(12.0, 5_000) };
        let b = EconomicsEngine::calculate(&ctx, &reference_config());
        assert!(b.net_profit < 500);
        assert!(!b.is_profitable);
    }

    #[test]
    fn test_round_to_unit() {
        assert_eq!(round_to_unit(4_449.0, 100), 4_400);
        assert_eq!(round_to_unit(4_450.0, 100), 4_500);
        assert_eq!(round_to_unit(1_234.0, 1), 1_234);
    }
}
