use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WalletError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("Insufficient withdrawable balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub amount_paise: i64,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
}

/// Restaurant earnings. Credits land in `pending`, settlement moves them to
/// `withdrawable`, withdrawals draw from `withdrawable` only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestaurantWallet {
    pub restaurant_id: String,
    pub gross_earnings_paise: i64,
    pub pending_balance_paise: i64,
    pub withdrawable_balance_paise: i64,
    pub last_settlement_at: DateTime<Utc>,
    pub credited_orders: BTreeSet<Uuid>,
    pub withdrawals: Vec<WithdrawalRequest>,
}

impl RestaurantWallet {
    pub fn new(restaurant_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            restaurant_id: restaurant_id.into(),
            gross_earnings_paise: 0,
            pending_balance_paise: 0,
            withdrawable_balance_paise: 0,
            last_settlement_at: now,
            credited_orders: BTreeSet::new(),
            withdrawals: Vec::new(),
        }
    }

    /// Credit one delivered order. Returns `false` if that order was credited before.
    pub fn credit(&mut self, order_id: Uuid, amount_paise: i64) -> bool {
        if !self.credited_orders.insert(order_id) {
            return false;
        }
        let amount = amount_paise.max(0);
        self.gross_earnings_paise += amount;
        self.pending_balance_paise += amount;
        true
    }

    pub fn withdraw(&mut self, amount_paise: i64, now: DateTime<Utc>) -> Result<WithdrawalRequest, WalletError> {
        if amount_paise <= 0 {
            return Err(WalletError::InvalidAmount(amount_paise));
        }
        if amount_paise > self.withdrawable_balance_paise {
            return Err(WalletError::InsufficientBalance {
                requested: amount_paise,
                available: self.withdrawable_balance_paise,
            });
        }

        self.withdrawable_balance_paise -= amount_paise;
        let request = WithdrawalRequest {
            id: Uuid::new_v4(),
            amount_paise,
            status: WithdrawalStatus::Pending,
            requested_at: now,
        };
        self.withdrawals.push(request.clone());
        Ok(request)
    }

    pub fn withdrawn_paise(&self) -> i64 {
        self.withdrawals.iter().map(|w| w.amount_paise).sum()
    }

    /// Every credited paisa is pending, withdrawable or withdrawn.
    pub fn is_balanced(&self) -> bool {
        self.pending_balance_paise >= 0
            && self.withdrawable_balance_paise >= 0
            && self.pending_balance_paise + self.withdrawable_balance_paise + self.withdrawn_paise()
                == self.gross_earnings_paise
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    IntervalNotElapsed { next_due: DateTime<Utc> },
    NothingPending,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    Settled { amount_paise: i64 },
    Skipped(SkipReason),
}

/// Time-gated move of pending earnings into withdrawable balance.
#[derive(Debug, Clone)]
pub struct WalletSettlement {
    interval: Duration,
}

impl WalletSettlement {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Idempotent within an interval: a second call before the next interval
    /// elapses is a silent skip.
    pub fn settle(&self, wallet: &mut RestaurantWallet, now: DateTime<Utc>) -> SettlementOutcome {
        let next_due = wallet.last_settlement_at + self.interval;
        if now < next_due {
            return SettlementOutcome::Skipped(SkipReason::IntervalNotElapsed { next_due });
        }
        if wallet.pending_balance_paise <= 0 {
            return SettlementOutcome::Skipped(SkipReason::NothingPending);
        }

        let amount_paise = wallet.pending_balance_paise;
        wallet.withdrawable_balance_paise += amount_paise;
        wallet.pending_balance_paise = 0;
        wallet.last_settlement_at = now;

        tracing::info!(restaurant_id = %wallet.restaurant_id, amount_paise, "Wallet settled");
        SettlementOutcome::Settled { amount_paise }
    }
}

impl Default for WalletSettlement {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_with_pending(pending: i64, last_settled: DateTime<Utc>) -> RestaurantWallet {
        let mut wallet = RestaurantWallet::new("rest-1", last_settled);
        wallet.credit(Uuid::new_v4(), pending);
        wallet
    }

    #[test]
    fn test_settles_after_interval() {
        let now = Utc::now();
        let mut wallet = wallet_with_pending(50_000, now - Duration::hours(25));
        let withdrawable_before = wallet.withdrawable_balance_paise;

        let outcome = WalletSettlement::default().settle(&mut wallet, now);

        assert_eq!(outcome, SettlementOutcome::Settled { amount_paise: 50_000 });
        assert_eq!(wallet.pending_balance_paise, 0);
        assert_eq!(wallet.withdrawable_balance_paise, withdrawable_before + 50_000);
        assert_eq!(wallet.last_settlement_at, now);
        assert!(wallet.is_balanced());
    }

    #[test]
    fn test_second_settle_within_interval_is_noop() {
        let now = Utc::now();
        let settlement = WalletSettlement::default();
        let mut wallet = wallet_with_pending(50_000, now - Duration::hours(25));
        settlement.settle(&mut wallet, now);

        wallet.credit(Uuid::new_v4(), 10_000);
        let snapshot = wallet.clone();
        let outcome = settlement.settle(&mut wallet, now + Duration::hours(1));

        assert!(matches!(outcome, SettlementOutcome::Skipped(SkipReason::IntervalNotElapsed { .. })));
        assert_eq!(wallet, snapshot);
    }

    #[test]
    fn test_nothing_pending_keeps_timestamp() {
        let now = Utc::now();
        let last = now - Duration::hours(30);
        let mut wallet = RestaurantWallet::new("rest-1", last);

        let outcome = WalletSettlement::default().settle(&mut wallet, now);
        assert_eq!(outcome, SettlementOutcome::Skipped(SkipReason::NothingPending));
        assert_eq!(wallet.last_settlement_at, last);
    }

    #[test]
    fn test_exactly_at_interval_settles() {
        let now = Utc::now();
        let mut wallet = wallet_with_pending(100, now - Duration::hours(24));
        assert!(matches!(
            WalletSettlement::default().settle(&mut wallet, now),
            SettlementOutcome::Settled { .. }
        ));
    }

    #[test]
    fn test_credit_is_idempotent_per_order() {
        let mut wallet = RestaurantWallet::new("rest-1", Utc::now());
        let order_id = Uuid::new_v4();
        assert!(wallet.credit(order_id, 25_500));
        assert!(!wallet.credit(order_id, 25_500));
        assert_eq!(wallet.gross_earnings_paise, 25_500);
        assert_eq!(wallet.pending_balance_paise, 25_500);
    }

    #[test]
    fn test_withdraw_only_from_withdrawable() {
        let now = Utc::now();
        let mut wallet = wallet_with_pending(50_000, now - Duration::hours(25));
        assert_eq!(
            wallet.withdraw(10_000, now),
            Err(WalletError::InsufficientBalance { requested: 10_000, available: 0 })
        );

        WalletSettlement::default().settle(&mut wallet, now);
        let request = wallet.withdraw(20_000, now).unwrap();
        assert_eq!(request.status, WithdrawalStatus::Pending);
        assert_eq!(wallet.withdrawable_balance_paise, 30_000);
        assert!(wallet.is_balanced());

        assert_eq!(wallet.withdraw(-5, now), Err(WalletError::InvalidAmount(-5)));
    }
}
