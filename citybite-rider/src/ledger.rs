use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Availability, RiderState, TransactionSource, WalletTransaction};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },
}

impl RiderState {
    pub fn has_credit_for(&self, order_id: Uuid) -> bool {
        self.wallet_history
            .iter()
            .any(|t| t.order_id == Some(order_id) && t.source == TransactionSource::OrderPayout)
    }

    /// Credit a completed delivery. Returns `false` when this order was
    /// already credited, leaving the state untouched.
    pub fn credit_delivery(
        &mut self,
        order_id: Uuid,
        payout_paise: i64,
        tip_paise: i64,
        cod_collected_paise: i64,
        at: DateTime<Utc>,
    ) -> bool {
        if self.has_credit_for(order_id) {
            return false;
        }

        let payout = payout_paise.max(0);
        let tip = tip_paise.max(0);

        self.wallet_balance_paise += payout + tip;
        self.cod_balance_paise += cod_collected_paise.max(0);
        self.total_deliveries += 1;

        self.wallet_history.push(WalletTransaction {
            id: Uuid::new_v4(),
            order_id: Some(order_id),
            source: TransactionSource::OrderPayout,
            amount_paise: payout,
            description: format!("Delivery payout for order {}", order_id),
            at,
        });
        if tip > 0 {
            self.wallet_history.push(WalletTransaction {
                id: Uuid::new_v4(),
                order_id: Some(order_id),
                source: TransactionSource::Tip,
                amount_paise: tip,
                description: format!("Customer tip for order {}", order_id),
                at,
            });
        }

        self.release(order_id);
        true
    }

    pub fn deposit_cod(&mut self, amount_paise: i64, at: DateTime<Utc>) -> Result<WalletTransaction, LedgerError> {
        if amount_paise <= 0 {
            return Err(LedgerError::InvalidAmount(amount_paise));
        }
        if amount_paise > self.cod_balance_paise {
            return Err(LedgerError::InsufficientBalance {
                requested: amount_paise,
                available: self.cod_balance_paise,
            });
        }

        self.cod_balance_paise -= amount_paise;
        let tx = WalletTransaction {
            id: Uuid::new_v4(),
            order_id: None,
            source: TransactionSource::CodDeposit,
            amount_paise: -amount_paise,
            description: "COD cash deposited".to_string(),
            at,
        };
        self.wallet_history.push(tx.clone());
        Ok(tx)
    }

    pub fn withdraw(&mut self, amount_paise: i64, at: DateTime<Utc>) -> Result<WalletTransaction, LedgerError> {
        if amount_paise <= 0 {
            return Err(LedgerError::InvalidAmount(amount_paise));
        }
        if amount_paise > self.wallet_balance_paise {
            return Err(LedgerError::InsufficientBalance {
                requested: amount_paise,
                available: self.wallet_balance_paise,
            });
        }

        self.wallet_balance_paise -= amount_paise;
        let tx = WalletTransaction {
            id: Uuid::new_v4(),
            order_id: None,
            source: TransactionSource::Withdrawal,
            amount_paise: -amount_paise,
            description: "Payout to bank account".to_string(),
            at,
        };
        self.wallet_history.push(tx.clone());
        Ok(tx)
    }

    pub fn engage(&mut self, order_id: Uuid, name: Option<String>) {
        self.active_order_id = Some(order_id);
        self.availability = Availability::OnDelivery;
        if name.is_some() {
            self.name = name;
        }
    }

    /// Frees the rider only if they are still on this order.
    pub fn release(&mut self, order_id: Uuid) {
        if self.active_order_id == Some(order_id) {
            self.active_order_id = None;
            self.availability = Availability::Idle;
        }
    }
}
