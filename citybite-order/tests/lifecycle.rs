use chrono::{Duration as ChronoDuration, Utc};
use citybite_core::notify::RecordingDispatcher;
use citybite_core::payment::{MockPaymentGateway, PaymentMethod, PaymentStatus};
use citybite_core::Actor;
use citybite_order::{
    BusinessRules, MarketConditions, OrderDraft, OrderError, OrderEvent, OrderLine, OrderService, OrderStatus,
    Repositories, RestaurantProfile, ServiceError,
};
use citybite_pricing::{PricingConfig, PricingConfigStore};
use citybite_rider::{Availability, TelemetryData};
use citybite_shared::NotificationKind;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Harness {
    service: OrderService,
    gateway: Arc<MockPaymentGateway>,
    notifications: Arc<RecordingDispatcher>,
}

async fn harness() -> Harness {
    let gateway = Arc::new(MockPaymentGateway::new());
    let notifications = Arc::new(RecordingDispatcher::new());
    let pricing = Arc::new(PricingConfigStore::new(PricingConfig::default()).unwrap());
    // No peak windows so fees do not depend on the wall clock
    let rules = BusinessRules {
        peak_hours: Vec::new(),
        ..Default::default()
    };
    let service = OrderService::new(Repositories::in_memory(), gateway.clone(), notifications.clone(), pricing, rules);
    service
        .register_restaurant(RestaurantProfile {
            id: "rest-1".into(),
            name: "Spice Route".into(),
            location: None,
            is_open: true,
            stats: Default::default(),
        })
        .await
        .unwrap();
    Harness {
        service,
        gateway,
        notifications,
    }
}

fn checkout(method: PaymentMethod) -> OrderDraft {
    OrderDraft {
        restaurant_id: "rest-1".into(),
        lines: vec![OrderLine {
            item_id: "thali".into(),
            name: "Veg Thali".into(),
            unit_price_paise: 15_000,
            quantity: 2,
            packing_charge_paise: 0,
        }],
        payment_method: method,
        delivery_point: None,
        cooking_instructions: None,
        delivery_instructions: None,
    }
}

/// Places an order for `cust-1`; UPI orders are captured through the gateway
/// callback path.
async fn place(h: &Harness, method: PaymentMethod) -> Uuid {
    let order_id = h.service.place_order("cust-1", checkout(method)).await.unwrap().order.id;
    if method == PaymentMethod::Upi {
        let captured = h
            .service
            .apply(
                order_id,
                OrderEvent::CapturePayment {
                    payment_id: "pay_LIFECYCLE01".into(),
                },
                Actor::System,
            )
            .await
            .unwrap();
        assert_eq!(captured.order.payment_status, PaymentStatus::Paid);
    }
    order_id
}

fn restaurant() -> Actor {
    Actor::Restaurant { id: "rest-1".into() }
}

fn rider(id: &str) -> Actor {
    Actor::Rider {
        id: id.into(),
        name: format!("Rider {}", id),
    }
}

fn assign(id: &str) -> OrderEvent {
    OrderEvent::AssignRider {
        rider_id: id.into(),
        rider_name: format!("Rider {}", id),
    }
}

/// Places an order and drives it to `ready_for_pickup`.
async fn ready_order(h: &Harness, method: PaymentMethod) -> Uuid {
    let order_id = place(h, method).await;
    h.service
        .apply(order_id, OrderEvent::Accept { prep_time_minutes: 15 }, restaurant())
        .await
        .unwrap();
    h.service.apply(order_id, OrderEvent::MarkReady, restaurant()).await.unwrap();
    order_id
}

async fn out_for_delivery(h: &Harness, method: PaymentMethod, rider_id: &str) -> Uuid {
    let order_id = ready_order(h, method).await;
    for event in [assign(rider_id), OrderEvent::ArriveAtRestaurant, OrderEvent::PickUp] {
        h.service.apply(order_id, event, rider(rider_id)).await.unwrap();
    }
    order_id
}

async fn wait_for_status(h: &Harness, order_id: Uuid, status: OrderStatus) -> citybite_order::Order {
    let mut order = h.service.order(order_id).await.unwrap();
    for _ in 0..20 {
        if order.status == status {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        order = h.service.order(order_id).await.unwrap();
    }
    order
}

#[tokio::test]
async fn test_full_lifecycle_credits_everyone_once() {
    let h = harness().await;
    let order_id = out_for_delivery(&h, PaymentMethod::Upi, "rd-1").await;
    h.service
        .apply(order_id, OrderEvent::ArriveAtCustomer, rider("rd-1"))
        .await
        .unwrap();

    let delivered = h
        .service
        .apply(order_id, OrderEvent::Deliver { tip_paise: 2_000 }, rider("rd-1"))
        .await
        .unwrap();
    assert!(delivered.changed);
    assert_eq!(delivered.order.status, OrderStatus::Delivered);

    // Second deliver is a no-op
    let again = h
        .service
        .apply(order_id, OrderEvent::Deliver { tip_paise: 2_000 }, rider("rd-1"))
        .await
        .unwrap();
    assert!(!again.changed);

    let order = h.service.order(order_id).await.unwrap();
    let wallet = h.service.wallet("rest-1", Utc::now()).await.unwrap();
    assert_eq!(wallet.pending_balance_paise, order.net_restaurant_earnings_paise);
    assert_eq!(wallet.gross_earnings_paise, order.net_restaurant_earnings_paise);

    let rd = h.service.rider("rd-1").await.unwrap();
    assert_eq!(rd.wallet_balance_paise, order.rider_payout_paise + 2_000);
    assert_eq!(rd.total_deliveries, 1);
    assert_eq!(rd.availability, Availability::Idle);
    assert_eq!(rd.active_order_id, None);

    let kinds = h.notifications.kinds();
    for kind in [
        NotificationKind::NewOrder,
        NotificationKind::OrderAccepted,
        NotificationKind::OrderPreparing,
        NotificationKind::NewDeliveryJob,
        NotificationKind::OutForDelivery,
        NotificationKind::Delivered,
    ] {
        assert!(kinds.contains(&kind), "missing {:?}", kind);
    }
    assert_eq!(kinds.iter().filter(|k| **k == NotificationKind::Delivered).count(), 1);
    assert_eq!(h.gateway.refund_calls(), 0);
}

#[tokio::test]
async fn test_cod_delivery_tracks_cash() {
    let h = harness().await;
    let order_id = out_for_delivery(&h, PaymentMethod::Cod, "rd-2").await;
    let applied = h
        .service
        .apply(order_id, OrderEvent::Deliver { tip_paise: 0 }, rider("rd-2"))
        .await
        .unwrap();
    assert_eq!(applied.order.payment_status, PaymentStatus::Paid);

    let rd = h.service.rider("rd-2").await.unwrap();
    assert_eq!(rd.cod_balance_paise, applied.order.total_paise);

    h.service.rider_deposit_cod("rd-2", applied.order.total_paise).await.unwrap();
    assert_eq!(h.service.rider("rd-2").await.unwrap().cod_balance_paise, 0);
}

#[tokio::test]
async fn test_concurrent_assignment_has_one_winner() {
    let h = harness().await;
    let order_id = ready_order(&h, PaymentMethod::Upi).await;

    let mut tasks = Vec::new();
    for i in 0..6 {
        let service = h.service.clone();
        let id = format!("rd-{}", i);
        tasks.push(tokio::spawn(async move {
            service.apply(order_id, assign(&id), rider(&id)).await
        }));
    }

    let mut winners = 0;
    let mut losers = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => winners += 1,
            Err(ServiceError::Order(OrderError::AlreadyAssigned { .. })) => losers += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(losers, 5);

    let order = h.service.order(order_id).await.unwrap();
    let holder = order.rider_id.unwrap();
    let engaged = h.service.rider(&holder).await.unwrap();
    assert_eq!(engaged.active_order_id, Some(order_id));
}

#[tokio::test(start_paused = true)]
async fn test_unaccepted_order_auto_expires_and_refunds() {
    let h = harness().await;
    let order_id = place(&h, PaymentMethod::Upi).await;
    assert_eq!(h.service.pending_timers(), 1);

    tokio::time::sleep(Duration::from_secs(301)).await;
    let order = wait_for_status(&h, order_id, OrderStatus::Rejected).await;

    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.rejection_reason.as_deref(), Some("auto-timeout"));
    assert_eq!(order.payment_status, PaymentStatus::RefundInitiated);
    assert_eq!(h.gateway.refunds(), vec![("pay_LIFECYCLE01".to_string(), order.total_paise)]);
    assert_eq!(h.service.pending_timers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_accept_cancels_expiry() {
    let h = harness().await;
    let order_id = place(&h, PaymentMethod::Upi).await;
    h.service
        .apply(order_id, OrderEvent::Accept { prep_time_minutes: 10 }, restaurant())
        .await
        .unwrap();
    assert_eq!(h.service.pending_timers(), 0);

    tokio::time::sleep(Duration::from_secs(400)).await;

    let order = h.service.order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Preparing);
    assert_eq!(h.gateway.refund_calls(), 0);
}

#[tokio::test]
async fn test_late_auto_expire_is_noop() {
    let h = harness().await;
    let order_id = ready_order(&h, PaymentMethod::Upi).await;

    let applied = h.service.apply(order_id, OrderEvent::AutoExpire, Actor::System).await.unwrap();
    assert!(!applied.changed);
    assert_eq!(applied.order.status, OrderStatus::ReadyForPickup);
}

#[tokio::test]
async fn test_sweep_expires_stale_orders() {
    let h = harness().await;
    let order_id = h.service.place_order("cust-1", checkout(PaymentMethod::Cod)).await.unwrap().order.id;

    assert_eq!(h.service.expire_stale_orders(Utc::now()).await.unwrap(), 0);

    let later = Utc::now() + ChronoDuration::seconds(301);
    assert_eq!(h.service.expire_stale_orders(later).await.unwrap(), 1);
    assert_eq!(h.service.order(order_id).await.unwrap().status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_telemetry_flags_active_order() {
    let h = harness().await;
    let order_id = out_for_delivery(&h, PaymentMethod::Upi, "rd-7").await;
    let t0 = Utc::now();

    let first = h
        .service
        .record_telemetry(
            "rd-7",
            TelemetryData {
                lat: 12.9700,
                lng: 77.5900,
                accuracy_m: 10.0,
                speed_kmh: None,
                timestamp: t0,
            },
        )
        .await
        .unwrap();
    assert!(first.analysis.flag.is_none());
    assert_eq!(first.active_order_id, Some(order_id));

    // ~11 km in 30 seconds
    let second = h
        .service
        .record_telemetry(
            "rd-7",
            TelemetryData {
                lat: 13.0700,
                lng: 77.5900,
                accuracy_m: 10.0,
                speed_kmh: None,
                timestamp: t0 + ChronoDuration::seconds(30),
            },
        )
        .await
        .unwrap();
    assert!(second.analysis.flag.is_some());
    assert!(second.suspicion_score > 0);

    let order = h.service.order(order_id).await.unwrap();
    assert!(order.needs_review);
    assert!(!order.fraud_flags.is_empty());
    assert!(order.driver_position.is_some());
    assert!(h.notifications.kinds().contains(&NotificationKind::FraudAlert));

    let reset = h.service.reset_suspicion("rd-7").await.unwrap();
    assert_eq!(reset.suspicion_score, 0);
}

#[tokio::test]
async fn test_settlement_sweep_and_withdrawal() {
    let h = harness().await;
    let order_id = out_for_delivery(&h, PaymentMethod::Upi, "rd-3").await;
    h.service
        .apply(order_id, OrderEvent::Deliver { tip_paise: 0 }, rider("rd-3"))
        .await
        .unwrap();
    let earnings = h.service.order(order_id).await.unwrap().net_restaurant_earnings_paise;

    let now = Utc::now();
    let report = h.service.sweep_settlements(now).await.unwrap();
    assert_eq!(report.settled, 0);

    let report = h.service.sweep_settlements(now + ChronoDuration::hours(25)).await.unwrap();
    assert_eq!(report.settled, 1);
    assert_eq!(report.total_moved_paise, earnings);

    let again = h.service.sweep_settlements(now + ChronoDuration::hours(26)).await.unwrap();
    assert_eq!(again.settled, 0);

    let later = now + ChronoDuration::hours(26);
    h.service.withdraw_restaurant("rest-1", earnings, later).await.unwrap();
    let wallet = h.service.wallet("rest-1", later).await.unwrap();
    assert_eq!(wallet.withdrawable_balance_paise, 0);
    assert!(wallet.is_balanced());

    let err = h.service.withdraw_restaurant("rest-1", 1, later).await.unwrap_err();
    assert!(matches!(err, ServiceError::Wallet(_)));
}

#[tokio::test]
async fn test_pricing_change_does_not_touch_placed_orders() {
    let h = harness().await;
    let before = h.service.place_order("cust-1", checkout(PaymentMethod::Cod)).await.unwrap().order;

    let mut config = PricingConfig::default();
    config.platform_fee.amount_paise = 900;
    let next = h.service.update_pricing(config).unwrap();
    assert_eq!(next.version, 2);

    let stored = h.service.order(before.id).await.unwrap();
    assert_eq!(stored.total_paise, before.total_paise);
    assert_eq!(stored.pricing_version, 1);

    let after = h.service.place_order("cust-1", checkout(PaymentMethod::Cod)).await.unwrap().order;
    assert_eq!(after.pricing_version, 2);
    assert_eq!(after.platform_fee_paise, 900);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let h = harness().await;
    let err = h
        .service
        .apply(Uuid::new_v4(), OrderEvent::MarkReady, restaurant())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Order(OrderError::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn test_uncaptured_upi_order_expires_without_refund() {
    let h = harness().await;
    let placed = h.service.place_order("cust-1", checkout(PaymentMethod::Upi)).await.unwrap();
    assert_eq!(placed.order.payment_status, PaymentStatus::Pending);
    assert!(placed.order.payment_id.is_none());

    tokio::time::sleep(Duration::from_secs(301)).await;
    let order = wait_for_status(&h, placed.order.id, OrderStatus::Rejected).await;

    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(h.gateway.refund_calls(), 0);
}

#[tokio::test]
async fn test_checkout_prices_with_server_side_facts() {
    let h = harness().await;
    let regular = h.service.place_order("cust-1", checkout(PaymentMethod::Cod)).await.unwrap().order;
    assert!(regular.delivery_fee_paise > 0);

    h.service.set_membership("cust-gold", true).await.unwrap();
    let member = h.service.place_order("cust-gold", checkout(PaymentMethod::Cod)).await.unwrap().order;
    assert_eq!(member.delivery_fee_paise, 0);
    assert_eq!(member.customer_id, "cust-gold");

    h.service.set_conditions(MarketConditions {
        is_peak_hour: false,
        is_weather_bad: true,
    });
    let stormy = h.service.place_order("cust-1", checkout(PaymentMethod::Cod)).await.unwrap().order;
    assert!(stormy.delivery_fee_paise > regular.delivery_fee_paise);
}

#[tokio::test]
async fn test_checkout_requires_registered_open_restaurant() {
    let h = harness().await;
    let mut draft = checkout(PaymentMethod::Cod);
    draft.restaurant_id = "rest-unknown".into();
    let err = h.service.place_order("cust-1", draft).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let mut closed = h.service.restaurant("rest-1").await.unwrap();
    closed.is_open = false;
    h.service.register_restaurant(closed).await.unwrap();
    let err = h
        .service
        .place_order("cust-1", checkout(PaymentMethod::Cod))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Order(OrderError::Validation(_))));
}
