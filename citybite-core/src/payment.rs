use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Upi,
    Cod,
}

/// Payment progress on an order. Moves forward only:
/// PENDING -> PAID -> REFUND_INITIATED | REFUND_FAILED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    RefundInitiated,
    RefundFailed,
}

impl PaymentStatus {
    pub fn can_advance_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Paid, RefundInitiated) | (Paid, RefundFailed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundReceipt {
    pub id: String,
    pub status: String,
    pub amount_paise: i64,
    pub currency: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Refund declined by gateway: {0}")]
    Declined(String),
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Refund a captured payment. One attempt per call; callers never retry.
    async fn refund(&self, payment_id: &str, amount_paise: i64) -> Result<RefundReceipt, GatewayError>;
}

/// In-process gateway used by tests and local runs. Records every refund call
/// and can be switched into a failing mode.
#[derive(Default)]
pub struct MockPaymentGateway {
    failing: AtomicBool,
    calls: AtomicUsize,
    refunds: Mutex<Vec<(String, i64)>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let gateway = Self::default();
        gateway.set_failing(true);
        gateway
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn refund_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn refunds(&self) -> Vec<(String, i64)> {
        match self.refunds.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn refund(&self, payment_id: &str, amount_paise: i64) -> Result<RefundReceipt, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Mock gateway refund of {} paise requested", amount_paise);

        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Declined("simulated gateway failure".to_string()));
        }

        match self.refunds.lock() {
            Ok(mut guard) => guard.push((payment_id.to_string(), amount_paise)),
            Err(poisoned) => poisoned.into_inner().push((payment_id.to_string(), amount_paise)),
        }

        Ok(RefundReceipt {
            id: format!("ref_{}", Uuid::new_v4().simple()),
            status: "processed".to_string(),
            amount_paise,
            currency: "INR".to_string(),
            processed_at: Utc::now(),
        })
    }
}
