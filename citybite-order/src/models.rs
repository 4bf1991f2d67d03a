use chrono::{DateTime, Utc};
use citybite_core::geo::GeoPoint;
use citybite_core::payment::{PaymentMethod, PaymentStatus};
use citybite_pricing::{FinancialBreakdown, PricingConfig};
use citybite_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub use citybite_shared::OrderStatus;

/// One menu item on an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    pub item_id: String,
    pub name: String,
    pub unit_price_paise: i64,
    pub quantity: u32,
    #[serde(default)]
    pub packing_charge_paise: i64,
}

impl OrderLine {
    /// `None` on overflow.
    pub fn item_total(&self) -> Option<i64> {
        self.unit_price_paise.checked_mul(self.quantity as i64)
    }

    pub fn packing_total(&self) -> Option<i64> {
        self.packing_charge_paise.checked_mul(self.quantity as i64)
    }
}

/// A customer's order from one restaurant. Money fields are fixed at
/// placement; only the state machine changes an order afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub restaurant_id: String,
    pub rider_id: Option<String>,
    pub rider_name: Option<String>,
    pub lines: Vec<OrderLine>,
    pub status: OrderStatus,

    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<Masked<String>>,
    pub refund_id: Option<String>,
    pub refund_reason: Option<String>,
    pub rejection_reason: Option<String>,

    pub item_total_paise: i64,
    pub packing_total_paise: i64,
    pub tax_paise: i64,
    pub delivery_fee_paise: i64,
    pub platform_fee_paise: i64,
    pub total_paise: i64,
    pub commission_paise: i64,
    pub net_restaurant_earnings_paise: i64,
    pub rider_payout_paise: i64,
    pub rider_tip_paise: i64,

    pub financials: FinancialBreakdown,
    pub pricing_version: u64,
    pub pricing_snapshot: Option<PricingConfig>,

    pub distance_km: f64,
    pub delivery_point: Option<GeoPoint>,
    pub driver_position: Option<GeoPoint>,
    pub fraud_flags: BTreeSet<String>,
    pub needs_review: bool,

    pub cooking_instructions: Option<String>,
    pub delivery_instructions: Option<String>,

    pub placed_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub prep_started_at: Option<DateTime<Utc>>,
    pub prep_eta: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_location_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Items plus packing: the base for commission and restaurant earnings.
    pub fn order_value_paise(&self) -> i64 {
        self.item_total_paise + self.packing_total_paise
    }

    pub fn update_status(&mut self, status: OrderStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    /// Moves payment status forward. Backward or sideways moves are refused.
    pub fn advance_payment(&mut self, next: PaymentStatus, now: DateTime<Utc>) -> bool {
        if !self.payment_status.can_advance_to(next) {
            return false;
        }
        self.payment_status = next;
        self.updated_at = now;
        true
    }

    pub fn is_assigned_to(&self, rider_id: &str) -> bool {
        self.rider_id.as_deref() == Some(rider_id)
    }

    pub fn flag_for_review(&mut self, flag: &str) -> bool {
        self.needs_review = true;
        self.fraud_flags.insert(flag.to_string())
    }
}
