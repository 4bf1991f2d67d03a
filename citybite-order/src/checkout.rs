use chrono::{DateTime, Utc};
use citybite_core::geo::{haversine_km, GeoPoint};
use citybite_core::payment::{PaymentMethod, PaymentStatus};
use citybite_pricing::{EconomicsEngine, FinancialContext, RestaurantStats, VersionedPricing};
use citybite_shared::{Audience, NotificationEvent, NotificationKind, OrderStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::directory::{CustomerProfile, MarketConditions};
use crate::machine::{OrderError, SideEffect};
use crate::models::{Order, OrderLine};
use crate::rules::BusinessRules;

/// Restaurant facts the checkout needs. The catalog itself lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantProfile {
    pub id: String,
    pub name: String,
    pub location: Option<GeoPoint>,
    #[serde(default = "default_open")]
    pub is_open: bool,
    #[serde(default)]
    pub stats: RestaurantStats,
}

fn default_open() -> bool {
    true
}

/// What a customer submits at checkout. Everything that affects price beyond
/// the lines themselves is resolved on the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraft {
    pub restaurant_id: String,
    pub lines: Vec<OrderLine>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub delivery_point: Option<GeoPoint>,
    #[serde(default)]
    pub cooking_instructions: Option<String>,
    #[serde(default)]
    pub delivery_instructions: Option<String>,
}

/// A draft joined with the server-held facts it is priced against.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub restaurant: RestaurantProfile,
    pub lines: Vec<OrderLine>,
    pub payment_method: PaymentMethod,
    pub delivery_point: Option<GeoPoint>,
    pub is_peak_hour: bool,
    pub is_weather_bad: bool,
    pub is_member: bool,
    pub cooking_instructions: Option<String>,
    pub delivery_instructions: Option<String>,
}

impl CheckoutRequest {
    pub fn new(
        customer: &CustomerProfile,
        restaurant: RestaurantProfile,
        draft: OrderDraft,
        conditions: MarketConditions,
    ) -> Self {
        Self {
            customer_id: customer.customer_id.clone(),
            restaurant,
            lines: draft.lines,
            payment_method: draft.payment_method,
            delivery_point: draft.delivery_point,
            is_peak_hour: conditions.is_peak_hour,
            is_weather_bad: conditions.is_weather_bad,
            is_member: customer.is_member,
            cooking_instructions: draft.cooking_instructions,
            delivery_instructions: draft.delivery_instructions,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub effects: Vec<SideEffect>,
}

/// Builds a `placed` order. Totals are computed once here and never again.
pub fn place_order(
    request: CheckoutRequest,
    pricing: &VersionedPricing,
    rules: &BusinessRules,
    now: DateTime<Utc>,
) -> Result<PlacedOrder, OrderError> {
    validate(&request, rules)?;

    let distance_km = match (request.restaurant.location, request.delivery_point) {
        (Some(from), Some(to)) => haversine_km(from, to),
        _ => 0.0,
    };

    let (item_total_paise, packing_total_paise) = line_totals(&request.lines)?;
    let order_value_paise = item_total_paise + packing_total_paise;
    if order_value_paise > rules.max_order_value_paise {
        return Err(OrderError::Validation(format!(
            "order value {} exceeds the limit of {}",
            order_value_paise, rules.max_order_value_paise
        )));
    }

    let context = FinancialContext {
        distance_km,
        order_value_paise,
        is_peak_hour: request.is_peak_hour,
        is_weather_bad: request.is_weather_bad,
        is_member: request.is_member,
        restaurant_stats: request.restaurant.stats.clone(),
    };
    let financials = EconomicsEngine::calculate_snapshot(&context, pricing);

    let tax_paise = (item_total_paise as f64 * rules.tax_rate).round() as i64;
    let total_paise = [financials.customer_delivery_fee, financials.platform_fee, tax_paise]
        .into_iter()
        .try_fold(order_value_paise, i64::checked_add)
        .ok_or_else(|| OrderError::Validation("order total is out of range".into()))?;

    let order = Order {
        id: Uuid::new_v4(),
        customer_id: request.customer_id,
        restaurant_id: request.restaurant.id.clone(),
        rider_id: None,
        rider_name: None,
        lines: request.lines,
        status: OrderStatus::Placed,
        payment_method: request.payment_method,
        // UPI moves to PAID only through a verified capture
        payment_status: PaymentStatus::Pending,
        payment_id: None,
        refund_id: None,
        refund_reason: None,
        rejection_reason: None,
        item_total_paise,
        packing_total_paise,
        tax_paise,
        delivery_fee_paise: financials.customer_delivery_fee,
        platform_fee_paise: financials.platform_fee,
        total_paise,
        commission_paise: financials.commission_value,
        net_restaurant_earnings_paise: order_value_paise - financials.commission_value,
        rider_payout_paise: financials.rider_payout,
        rider_tip_paise: 0,
        pricing_version: pricing.version,
        pricing_snapshot: rules.snapshot_pricing.then(|| pricing.config.clone()),
        financials,
        distance_km,
        delivery_point: request.delivery_point,
        driver_position: None,
        fraud_flags: BTreeSet::new(),
        needs_review: false,
        cooking_instructions: request.cooking_instructions,
        delivery_instructions: request.delivery_instructions,
        placed_at: now,
        accepted_at: None,
        prep_started_at: None,
        prep_eta: None,
        delivered_at: None,
        last_location_at: None,
        updated_at: now,
    };

    let new_order = NotificationEvent::new(
        NotificationKind::NewOrder,
        Audience::Restaurant(order.restaurant_id.clone()),
        Some(order.id),
        json!({
            "restaurant_name": request.restaurant.name,
            "total_paise": order.total_paise,
            "payment_method": order.payment_method,
            "items": order.lines.len(),
        }),
        now,
    );

    tracing::info!(
        order_id = %order.id,
        restaurant_id = %order.restaurant_id,
        total_paise = order.total_paise,
        profitable = order.financials.is_profitable,
        "Order placed"
    );

    let effects = vec![
        SideEffect::Notify(new_order),
        SideEffect::ScheduleAutoExpire {
            order_id: order.id,
            after: rules.auto_expire_after(),
        },
    ];

    Ok(PlacedOrder { order, effects })
}

/// Items and packing across all lines, or a validation error on overflow.
fn line_totals(lines: &[OrderLine]) -> Result<(i64, i64), OrderError> {
    let mut items = 0i64;
    let mut packing = 0i64;
    for line in lines {
        let too_large = || OrderError::Validation(format!("amount for {} is out of range", line.item_id));
        items = line.item_total().and_then(|t| items.checked_add(t)).ok_or_else(too_large)?;
        packing = line.packing_total().and_then(|t| packing.checked_add(t)).ok_or_else(too_large)?;
    }
    items.checked_add(packing).ok_or_else(|| OrderError::Validation("order value is out of range".into()))?;
    Ok((items, packing))
}

fn validate(request: &CheckoutRequest, rules: &BusinessRules) -> Result<(), OrderError> {
    if request.lines.is_empty() {
        return Err(OrderError::Validation("order has no items".into()));
    }
    if let Some(line) = request.lines.iter().find(|l| l.quantity == 0) {
        return Err(OrderError::Validation(format!("quantity for {} must be positive", line.item_id)));
    }
    if let Some(line) = request
        .lines
        .iter()
        .find(|l| l.unit_price_paise < 0 || l.packing_charge_paise < 0)
    {
        return Err(OrderError::Validation(format!("price for {} must not be negative", line.item_id)));
    }
    if !request.restaurant.is_open {
        return Err(OrderError::Validation(format!("{} is not accepting orders", request.restaurant.name)));
    }
    if let (Some(area), Some(point)) = (rules.service_area, request.delivery_point) {
        if !area.contains(point) {
            return Err(OrderError::Validation("delivery address is outside the service area".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use citybite_core::geo::ServiceArea;
    use citybite_pricing::{PricingComponent, PricingConfig};

    fn pricing() -> VersionedPricing {
        VersionedPricing {
            version: 7,
            config: PricingConfig {
                delivery_fee: PricingComponent::fixed(2_500),
                per_km_rate_paise: 500,
                platform_fee: PricingComponent::fixed(500),
                ..Default::default()
            },
            updated_at: Utc::now(),
        }
    }

    fn request(method: PaymentMethod) -> CheckoutRequest {
        CheckoutRequest {
            customer_id: "cust-1".into(),
            restaurant: RestaurantProfile {
                id: "rest-1".into(),
                name: "Spice Route".into(),
                location: None,
                is_open: true,
                stats: RestaurantStats::default(),
            },
            lines: vec![
                OrderLine {
                    item_id: "paneer".into(),
                    name: "Paneer Tikka".into(),
                    unit_price_paise: 12_000,
                    quantity: 2,
                    packing_charge_paise: 1_000,
                },
                OrderLine {
                    item_id: "naan".into(),
                    name: "Butter Naan".into(),
                    unit_price_paise: 4_000,
                    quantity: 1,
                    packing_charge_paise: 0,
                },
            ],
            payment_method: method,
            delivery_point: None,
            is_peak_hour: false,
            is_weather_bad: false,
            is_member: false,
            cooking_instructions: Some("less spicy".into()),
            delivery_instructions: None,
        }
    }

    #[test]
    fn test_totals() {
        let placed = place_order(request(PaymentMethod::Cod), &pricing(), &BusinessRules::default(), Utc::now()).unwrap();
        let order = placed.order;

        assert_eq!(order.item_total_paise, 28_000);
        assert_eq!(order.packing_total_paise, 2_000);
        assert_eq!(order.tax_paise, 1_400);
        // distance unknown: base fee only
        assert_eq!(order.delivery_fee_paise, 2_500);
        assert_eq!(order.total_paise, 28_000 + 2_000 + 2_500 + 500 + 1_400);
        assert_eq!(order.commission_paise, 4_500);
        assert_eq!(order.net_restaurant_earnings_paise, 25_500);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.pricing_version, 7);
        assert!(order.pricing_snapshot.is_some());
        assert_eq!(order.status, OrderStatus::Placed);
    }

    #[test]
    fn test_distance_drives_fee() {
        let mut req = request(PaymentMethod::Cod);
        req.restaurant.location = Some(GeoPoint::new(12.9700, 77.5900));
        // ~4.0 km north
        req.delivery_point = Some(GeoPoint::new(13.0060, 77.5900));

        let order = place_order(req, &pricing(), &BusinessRules::default(), Utc::now()).unwrap().order;
        assert!((order.distance_km - 4.0).abs() < 0.05);
        assert_eq!(order.delivery_fee_paise, 4_000);
    }

    #[test]
    fn test_upi_starts_pending_until_captured() {
        let order = place_order(request(PaymentMethod::Upi), &pricing(), &BusinessRules::default(), Utc::now())
            .unwrap()
            .order;
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.payment_id.is_none());
    }

    #[test]
    fn test_draft_fields_cannot_carry_payment_or_membership() {
        let draft: OrderDraft = serde_json::from_value(serde_json::json!({
            "restaurant_id": "rest-1",
            "lines": [{ "item_id": "dosa", "name": "Dosa", "unit_price_paise": 9000, "quantity": 1 }],
            "payment_method": "UPI",
            "payment_id": "pay_SOMEONE_ELSES",
            "is_member": true,
            "is_weather_bad": true
        }))
        .unwrap();
        let restaurant = request(PaymentMethod::Upi).restaurant;
        let req = CheckoutRequest::new(
            &CustomerProfile::new("cust-1"),
            restaurant,
            draft,
            MarketConditions::default(),
        );
        assert!(!req.is_member);
        assert!(!req.is_weather_bad);

        let order = place_order(req, &pricing(), &BusinessRules::default(), Utc::now()).unwrap().order;
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.payment_id.is_none());
        assert_eq!(order.delivery_fee_paise, 2_500);
    }

    #[test]
    fn test_member_flag_comes_from_profile() {
        let draft = OrderDraft {
            restaurant_id: "rest-1".into(),
            lines: request(PaymentMethod::Cod).lines,
            payment_method: PaymentMethod::Cod,
            delivery_point: None,
            cooking_instructions: None,
            delivery_instructions: None,
        };
        let member = CustomerProfile { customer_id: "cust-9".into(), is_member: true };
        let req = CheckoutRequest::new(&member, request(PaymentMethod::Cod).restaurant, draft, MarketConditions::default());
        let order = place_order(req, &pricing(), &BusinessRules::default(), Utc::now()).unwrap().order;
        assert_eq!(order.customer_id, "cust-9");
        assert_eq!(order.delivery_fee_paise, 0);
    }

    #[test]
    fn test_overflowing_amounts_are_rejected() {
        let mut req = request(PaymentMethod::Upi);
        req.lines[0].unit_price_paise = i64::MAX / 2 + 1;
        req.lines[0].quantity = 2;
        let err = place_order(req, &pricing(), &BusinessRules::default(), Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));

        let mut req = request(PaymentMethod::Upi);
        req.lines[0].unit_price_paise = i64::MAX - 10;
        req.lines[0].quantity = 1;
        req.lines[1].unit_price_paise = i64::MAX - 10;
        assert!(matches!(
            place_order(req, &pricing(), &BusinessRules::default(), Utc::now()),
            Err(OrderError::Validation(_))
        ));
    }

    #[test]
    fn test_order_value_limit() {
        let mut req = request(PaymentMethod::Upi);
        req.lines[0].unit_price_paise = 99_999_900;
        let err = place_order(req, &pricing(), &BusinessRules::default(), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("exceeds the limit"));
    }

    #[test]
    fn test_effects_notify_and_schedule_expiry() {
        let placed = place_order(request(PaymentMethod::Cod), &pricing(), &BusinessRules::default(), Utc::now()).unwrap();
        assert!(matches!(
            &placed.effects[0],
            SideEffect::Notify(n) if n.kind == NotificationKind::NewOrder && n.audience == Audience::Restaurant("rest-1".into())
        ));
        assert!(matches!(
            placed.effects[1],
            SideEffect::ScheduleAutoExpire { after, .. } if after.as_secs() == 300
        ));
    }

    #[test]
    fn test_validation() {
        let mut empty = request(PaymentMethod::Cod);
        empty.lines.clear();
        assert!(place_order(empty, &pricing(), &BusinessRules::default(), Utc::now()).is_err());

        let mut zero = request(PaymentMethod::Cod);
        zero.lines[0].quantity = 0;
        assert!(place_order(zero, &pricing(), &BusinessRules::default(), Utc::now()).is_err());

        let mut closed = request(PaymentMethod::Cod);
        closed.restaurant.is_open = false;
        assert!(place_order(closed, &pricing(), &BusinessRules::default(), Utc::now()).is_err());
    }

    #[test]
    fn test_service_area() {
        let rules = BusinessRules {
            service_area: Some(ServiceArea { center: GeoPoint::new(12.97, 77.59), radius_km: 10.0 }),
            ..Default::default()
        };
        let mut far = request(PaymentMethod::Cod);
        far.delivery_point = Some(GeoPoint::new(13.20, 77.70));
        let err = place_order(far, &pricing(), &rules, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("service area"));
    }
}
