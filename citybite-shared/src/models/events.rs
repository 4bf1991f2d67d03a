use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Abstract notification types handed to the dispatcher. Delivery mechanics
/// (push, SMS, sockets) belong to the dispatcher, not to the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewOrder,
    NewDeliveryJob,
    OrderAccepted,
    OrderPreparing,
    OutForDelivery,
    Delivered,
    RefundInitiated,
    OrderRejected,
    RefundFailed,
    FraudAlert,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewOrder => "new_order",
            Self::NewDeliveryJob => "new_delivery_job",
            Self::OrderAccepted => "order_accepted",
            Self::OrderPreparing => "order_preparing",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::RefundInitiated => "refund_initiated",
            Self::OrderRejected => "order_rejected",
            Self::RefundFailed => "refund_failed",
            Self::FraudAlert => "fraud_alert",
        }
    }
}

/// Who should receive a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Audience {
    Customer(String),
    Restaurant(String),
    Rider(String),
    /// Every available rider (job broadcast).
    Riders,
    Operators,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub audience: Audience,
    pub order_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub timestamp: i64,
}

impl NotificationEvent {
    pub fn new(
        kind: NotificationKind,
        audience: Audience,
        order_id: Option<Uuid>,
        payload: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            audience,
            order_id,
            payload,
            timestamp: at.timestamp_millis(),
        }
    }

    /// Kafka/SSE routing key: the order when there is one, else the kind.
    pub fn routing_key(&self) -> String {
        match self.order_id {
            Some(id) => id.to_string(),
            None => self.kind.as_str().to_string(),
        }
    }
}
