use chrono::{DateTime, Duration, Utc};
use citybite_core::geo::GeoPoint;
use citybite_core::payment::{PaymentGateway, PaymentMethod, PaymentStatus};
use citybite_core::{Actor, Role};
use citybite_rider::FraudFlag;
use citybite_shared::pii::Masked;
use citybite_shared::{Audience, NotificationEvent, NotificationKind};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Order, OrderStatus};

const AUTO_TIMEOUT_REASON: &str = "auto-timeout";

/// Everything that can happen to an order after placement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Accept { prep_time_minutes: u32 },
    Reject { reason: String },
    AutoExpire,
    MarkReady,
    AssignRider { rider_id: String, rider_name: String },
    ArriveAtRestaurant,
    PickUp,
    ArriveAtCustomer,
    Deliver {
        #[serde(default)]
        tip_paise: i64,
    },
    CapturePayment { payment_id: String },
    TrackLocation {
        position: GeoPoint,
        at: DateTime<Utc>,
        #[serde(default)]
        flag: Option<FraudFlag>,
    },
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Accept { .. } => "accept",
            OrderEvent::Reject { .. } => "reject",
            OrderEvent::AutoExpire => "auto_expire",
            OrderEvent::MarkReady => "mark_ready",
            OrderEvent::AssignRider { .. } => "assign_rider",
            OrderEvent::ArriveAtRestaurant => "arrive_at_restaurant",
            OrderEvent::PickUp => "pick_up",
            OrderEvent::ArriveAtCustomer => "arrive_at_customer",
            OrderEvent::Deliver { .. } => "deliver",
            OrderEvent::CapturePayment { .. } => "capture_payment",
            OrderEvent::TrackLocation { .. } => "track_location",
        }
    }
}

/// Work the caller must carry out after persisting the new order state.
#[derive(Debug, Clone)]
pub enum SideEffect {
    Notify(NotificationEvent),
    CreditRestaurant {
        restaurant_id: String,
        order_id: Uuid,
        amount_paise: i64,
    },
    CreditRider {
        rider_id: String,
        order_id: Uuid,
        payout_paise: i64,
        tip_paise: i64,
        cod_collected_paise: i64,
    },
    RiderEngaged {
        rider_id: String,
        rider_name: String,
        order_id: Uuid,
    },
    RiderReleased {
        rider_id: String,
        order_id: Uuid,
    },
    ScheduleAutoExpire {
        order_id: Uuid,
        after: std::time::Duration,
    },
    CancelAutoExpire {
        order_id: Uuid,
    },
    /// Refund attempt failed; needs operator follow-up, never retried.
    RefundFailed {
        order_id: Uuid,
        reason: String,
    },
}

impl SideEffect {
    pub fn name(&self) -> &'static str {
        match self {
            SideEffect::Notify(_) => "notify",
            SideEffect::CreditRestaurant { .. } => "credit_restaurant",
            SideEffect::CreditRider { .. } => "credit_rider",
            SideEffect::RiderEngaged { .. } => "rider_engaged",
            SideEffect::RiderReleased { .. } => "rider_released",
            SideEffect::ScheduleAutoExpire { .. } => "schedule_auto_expire",
            SideEffect::CancelAutoExpire { .. } => "cancel_auto_expire",
            SideEffect::RefundFailed { .. } => "refund_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub order: Order,
    pub effects: Vec<SideEffect>,
    /// `false` for idempotent no-ops (repeat deliver, stale timer).
    pub changed: bool,
}

impl Transition {
    fn unchanged(order: &Order) -> Self {
        Self {
            order: order.clone(),
            effects: Vec::new(),
            changed: false,
        }
    }

    fn advanced(order: Order, effects: Vec<SideEffect>) -> Self {
        Self {
            order,
            effects,
            changed: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {event} is not allowed from {from}")]
    InvalidTransition { from: OrderStatus, event: &'static str },

    #[error("{role} is not allowed to {event} this order")]
    AuthorizationDenied { role: Role, event: &'static str },

    #[error("Order {order_id} is already assigned to rider {rider_id}")]
    AlreadyAssigned { order_id: Uuid, rider_id: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Owns the legal status transitions of an order.
///
/// `transition` never mutates its input: it returns the next order together
/// with the side effects to run once that order is persisted. On error the
/// caller's order is untouched. The only external call made here is the
/// refund on rejection of a paid order.
pub struct OrderStateMachine {
    gateway: Arc<dyn PaymentGateway>,
}

impl OrderStateMachine {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    pub async fn transition(
        &self,
        order: &Order,
        event: OrderEvent,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Transition, OrderError> {
        let name = event.name();

        match event {
            OrderEvent::Accept { prep_time_minutes } => {
                require_restaurant(order, actor, name)?;
                require_status(order, &[OrderStatus::Placed], name)?;
                if prep_time_minutes == 0 {
                    return Err(OrderError::Validation("prep time must be positive".into()));
                }

                let mut next = order.clone();
                next.update_status(OrderStatus::Preparing, now);
                next.accepted_at = Some(now);
                next.prep_started_at = Some(now);
                next.prep_eta = Some(now + Duration::minutes(prep_time_minutes as i64));

                let effects = vec![
                    SideEffect::CancelAutoExpire { order_id: order.id },
                    notify_customer(order, NotificationKind::OrderAccepted, json!({ "status": "accepted" }), now),
                    notify_customer(
                        order,
                        NotificationKind::OrderPreparing,
                        json!({ "prep_time_minutes": prep_time_minutes, "prep_eta": next.prep_eta }),
                        now,
                    ),
                ];
                Ok(Transition::advanced(next, effects))
            }

            OrderEvent::Reject { reason } => {
                require_restaurant(order, actor, name)?;
                self.reject(order, reason, now, false).await
            }

            OrderEvent::AutoExpire => {
                if actor.role() != Role::System {
                    return Err(denied(actor, name));
                }
                if order.status != OrderStatus::Placed {
                    return Ok(Transition::unchanged(order));
                }
                self.reject(order, AUTO_TIMEOUT_REASON.to_string(), now, true).await
            }

            OrderEvent::MarkReady => {
                require_restaurant(order, actor, name)?;
                require_status(order, &[OrderStatus::Preparing], name)?;

                let mut next = order.clone();
                next.update_status(OrderStatus::ReadyForPickup, now);

                let job = NotificationEvent::new(
                    NotificationKind::NewDeliveryJob,
                    Audience::Riders,
                    Some(order.id),
                    json!({
                        "restaurant_id": order.restaurant_id,
                        "distance_km": order.distance_km,
                        "payout_paise": order.rider_payout_paise,
                    }),
                    now,
                );
                Ok(Transition::advanced(next, vec![SideEffect::Notify(job)]))
            }

            OrderEvent::AssignRider { rider_id, rider_name } => {
                if !(actor.is_rider(&rider_id) || matches!(actor, Actor::Operator { .. })) {
                    return Err(denied(actor, name));
                }
                if let Some(current) = &order.rider_id {
                    if *current == rider_id {
                        return Ok(Transition::unchanged(order));
                    }
                    return Err(OrderError::AlreadyAssigned {
                        order_id: order.id,
                        rider_id: current.clone(),
                    });
                }
                require_status(order, &[OrderStatus::ReadyForPickup], name)?;

                let mut next = order.clone();
                next.rider_id = Some(rider_id.clone());
                next.rider_name = Some(rider_name.clone());
                next.update_status(OrderStatus::RiderAssigned, now);

                let effects = vec![SideEffect::RiderEngaged {
                    rider_id,
                    rider_name,
                    order_id: order.id,
                }];
                Ok(Transition::advanced(next, effects))
            }

            OrderEvent::ArriveAtRestaurant => {
                self.advance_delivery(order, actor, name, OrderStatus::RiderAssigned, OrderStatus::RiderAtRestaurant, now)
            }

            OrderEvent::PickUp => {
                let mut transition =
                    self.advance_delivery(order, actor, name, OrderStatus::RiderAtRestaurant, OrderStatus::OutForDelivery, now)?;
                transition.effects.push(notify_customer(
                    order,
                    NotificationKind::OutForDelivery,
                    json!({ "rider_name": order.rider_name }),
                    now,
                ));
                Ok(transition)
            }

            OrderEvent::ArriveAtCustomer => {
                self.advance_delivery(order, actor, name, OrderStatus::OutForDelivery, OrderStatus::ArrivedAtCustomer, now)
            }

            OrderEvent::Deliver { tip_paise } => self.deliver(order, actor, tip_paise, now),

            OrderEvent::CapturePayment { payment_id } => {
                if !actor.is_privileged() {
                    return Err(denied(actor, name));
                }
                self.capture(order, payment_id, now).await
            }

            OrderEvent::TrackLocation { position, at, flag } => {
                require_assigned_rider(order, actor, name)?;
                if order.status.is_terminal() {
                    return Err(invalid(order, name));
                }

                let mut next = order.clone();
                next.driver_position = Some(position);
                next.last_location_at = Some(at);
                if let Some(flag) = flag {
                    next.flag_for_review(flag.as_str());
                }
                next.updated_at = now;
                Ok(Transition::advanced(next, Vec::new()))
            }
        }
    }

    fn advance_delivery(
        &self,
        order: &Order,
        actor: &Actor,
        name: &'static str,
        from: OrderStatus,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, OrderError> {
        require_assigned_rider(order, actor, name)?;
        require_status(order, &[from], name)?;

        let mut next = order.clone();
        next.update_status(to, now);
        Ok(Transition::advanced(next, Vec::new()))
    }

    fn deliver(&self, order: &Order, actor: &Actor, tip_paise: i64, now: DateTime<Utc>) -> Result<Transition, OrderError> {
        let name = "deliver";
        require_assigned_rider(order, actor, name)?;

        // Exactly-once: a repeated deliver is a successful no-op.
        if order.status == OrderStatus::Delivered {
            return Ok(Transition::unchanged(order));
        }
        require_status(order, &[OrderStatus::OutForDelivery, OrderStatus::ArrivedAtCustomer], name)?;
        if tip_paise < 0 {
            return Err(OrderError::Validation("tip must not be negative".into()));
        }

        let mut next = order.clone();
        next.update_status(OrderStatus::Delivered, now);
        next.delivered_at = Some(now);
        next.rider_tip_paise = tip_paise;

        let cod_collected_paise = match order.payment_method {
            PaymentMethod::Cod => {
                next.advance_payment(PaymentStatus::Paid, now);
                order.total_paise
            }
            PaymentMethod::Upi => 0,
        };

        let mut effects = vec![SideEffect::CreditRestaurant {
            restaurant_id: order.restaurant_id.clone(),
            order_id: order.id,
            amount_paise: order.net_restaurant_earnings_paise,
        }];
        if let Some(rider_id) = &order.rider_id {
            effects.push(SideEffect::CreditRider {
                rider_id: rider_id.clone(),
                order_id: order.id,
                payout_paise: order.rider_payout_paise,
                tip_paise,
                cod_collected_paise,
            });
        }
        effects.push(notify_customer(
            order,
            NotificationKind::Delivered,
            json!({ "total_paise": order.total_paise }),
            now,
        ));

        Ok(Transition::advanced(next, effects))
    }

    async fn reject(
        &self,
        order: &Order,
        reason: String,
        now: DateTime<Utc>,
        from_timer: bool,
    ) -> Result<Transition, OrderError> {
        // Refund already under way: never call the gateway twice.
        if order.payment_status == PaymentStatus::RefundInitiated {
            return Ok(Transition::unchanged(order));
        }
        if order.status.is_terminal() {
            return Err(invalid(order, if from_timer { "auto_expire" } else { "reject" }));
        }

        let mut next = order.clone();
        let mut effects = Vec::new();

        if order.status == OrderStatus::Placed && !from_timer {
            effects.push(SideEffect::CancelAutoExpire { order_id: order.id });
        }
        if let Some(rider_id) = &order.rider_id {
            effects.push(SideEffect::RiderReleased {
                rider_id: rider_id.clone(),
                order_id: order.id,
            });
        }

        next.rejection_reason = Some(reason.clone());
        match order.payment_method {
            PaymentMethod::Cod => next.update_status(OrderStatus::Cancelled, now),
            PaymentMethod::Upi => {
                next.update_status(OrderStatus::Rejected, now);
                if order.payment_status == PaymentStatus::Paid {
                    self.refund(&mut next, &reason, now, &mut effects).await;
                }
            }
        }

        effects.push(notify_customer(
            order,
            NotificationKind::OrderRejected,
            json!({ "reason": reason, "status": next.status }),
            now,
        ));

        tracing::info!(order_id = %order.id, status = %next.status, reason = %reason, "Order rejected");
        Ok(Transition::advanced(next, effects))
    }

    async fn refund(&self, next: &mut Order, reason: &str, now: DateTime<Utc>, effects: &mut Vec<SideEffect>) {
        let outcome = match next.payment_id.as_ref() {
            Some(payment_id) => self
                .gateway
                .refund(payment_id.expose(), next.total_paise)
                .await
                .map_err(|e| e.to_string()),
            None => Err("order has no payment reference".to_string()),
        };

        next.refund_reason = Some(reason.to_string());
        match outcome {
            Ok(receipt) => {
                next.advance_payment(PaymentStatus::RefundInitiated, now);
                tracing::info!(order_id = %next.id, refund_id = %receipt.id, "Refund initiated");
                effects.push(notify_customer(
                    next,
                    NotificationKind::RefundInitiated,
                    json!({
                        "refund_id": receipt.id,
                        "amount_paise": receipt.amount_paise,
                        "reason": reason,
                    }),
                    now,
                ));
                next.refund_id = Some(receipt.id);
            }
            Err(failure) => {
                next.advance_payment(PaymentStatus::RefundFailed, now);
                tracing::error!(order_id = %next.id, error = %failure, "Refund failed");
                effects.push(SideEffect::Notify(NotificationEvent::new(
                    NotificationKind::RefundFailed,
                    Audience::Operators,
                    Some(next.id),
                    json!({ "amount_paise": next.total_paise, "error": failure }),
                    now,
                )));
                effects.push(SideEffect::RefundFailed {
                    order_id: next.id,
                    reason: failure,
                });
            }
        }
    }

    async fn capture(&self, order: &Order, payment_id: String, now: DateTime<Utc>) -> Result<Transition, OrderError> {
        if order.payment_method == PaymentMethod::Cod {
            return Err(invalid(order, "capture_payment"));
        }

        match order.payment_status {
            PaymentStatus::Pending => {}
            PaymentStatus::Paid if order.payment_id.as_ref().map(|p| p.expose()) == Some(payment_id.as_str()) => {
                return Ok(Transition::unchanged(order));
            }
            PaymentStatus::Paid => return Err(invalid(order, "capture_payment")),
            PaymentStatus::RefundInitiated | PaymentStatus::RefundFailed => {
                return Ok(Transition::unchanged(order));
            }
        }

        let mut next = order.clone();
        next.payment_id = Some(Masked(payment_id));
        next.advance_payment(PaymentStatus::Paid, now);

        let mut effects = Vec::new();
        // Money arrived for an order that was already turned down.
        if order.status == OrderStatus::Rejected {
            let reason = order
                .rejection_reason
                .clone()
                .unwrap_or_else(|| "order rejected before payment capture".to_string());
            self.refund(&mut next, &reason, now, &mut effects).await;
        }

        tracing::info!(order_id = %order.id, payment_status = ?next.payment_status, "Payment captured");
        Ok(Transition::advanced(next, effects))
    }
}

fn notify_customer(order: &Order, kind: NotificationKind, payload: serde_json::Value, now: DateTime<Utc>) -> SideEffect {
    SideEffect::Notify(NotificationEvent::new(
        kind,
        Audience::Customer(order.customer_id.clone()),
        Some(order.id),
        payload,
        now,
    ))
}

fn denied(actor: &Actor, event: &'static str) -> OrderError {
    OrderError::AuthorizationDenied { role: actor.role(), event }
}

fn invalid(order: &Order, event: &'static str) -> OrderError {
    OrderError::InvalidTransition { from: order.status, event }
}

fn require_status(order: &Order, allowed: &[OrderStatus], event: &'static str) -> Result<(), OrderError> {
    if allowed.contains(&order.status) {
        Ok(())
    } else {
        Err(invalid(order, event))
    }
}

fn require_restaurant(order: &Order, actor: &Actor, event: &'static str) -> Result<(), OrderError> {
    if actor.is_restaurant(&order.restaurant_id) {
        Ok(())
    } else {
        Err(denied(actor, event))
    }
}

fn require_assigned_rider(order: &Order, actor: &Actor, event: &'static str) -> Result<(), OrderError> {
    match (actor, &order.rider_id) {
        (Actor::Rider { id, .. }, Some(assigned)) if id == assigned => Ok(()),
        _ => Err(denied(actor, event)),
    }
}
