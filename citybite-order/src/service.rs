use chrono::{DateTime, Utc};
use citybite_core::locks::KeyedLocks;
use citybite_core::notify::NotificationDispatcher;
use citybite_core::payment::PaymentGateway;
use citybite_core::{Actor, CoreError, InMemoryRepository, Repository};
use citybite_pricing::{PricingConfig, PricingConfigStore, PricingError, VersionedPricing};
use citybite_rider::{FraudAnalysis, FraudGuard, LedgerError, RiderState, TelemetryData, WalletTransaction};
use citybite_shared::{Audience, NotificationEvent, NotificationKind};
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::actor::{Envelope, Mailboxes};
use crate::checkout::{self, CheckoutRequest, OrderDraft, RestaurantProfile};
use crate::directory::{CustomerProfile, MarketConditions};
use crate::expiry::ExpiryTimers;
use crate::machine::{OrderError, OrderEvent, OrderStateMachine, SideEffect};
use crate::models::{Order, OrderStatus};
use crate::rules::BusinessRules;
use crate::wallet::{RestaurantWallet, SettlementOutcome, WalletError, WalletSettlement, WithdrawalRequest};

const MAILBOX_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Storage(#[from] CoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Concurrent update on {0}, retry")]
    Conflict(String),

    #[error("Order {0} mailbox is unavailable")]
    MailboxClosed(Uuid),
}

/// Storage for the aggregates the service owns plus the restaurant and
/// customer profiles checkout prices against.
#[derive(Clone)]
pub struct Repositories {
    pub orders: Arc<dyn Repository<Order>>,
    pub wallets: Arc<dyn Repository<RestaurantWallet>>,
    pub riders: Arc<dyn Repository<RiderState>>,
    pub restaurants: Arc<dyn Repository<RestaurantProfile>>,
    pub customers: Arc<dyn Repository<CustomerProfile>>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(InMemoryRepository::<Order>::new()),
            wallets: Arc::new(InMemoryRepository::<RestaurantWallet>::new()),
            riders: Arc::new(InMemoryRepository::<RiderState>::new()),
            restaurants: Arc::new(InMemoryRepository::<RestaurantProfile>::new()),
            customers: Arc::new(InMemoryRepository::<CustomerProfile>::new()),
        }
    }
}

/// Result of one accepted event (or order placement).
#[derive(Debug, Clone)]
pub struct Applied {
    pub order: Order,
    pub version: u64,
    /// `false` when the event was an idempotent no-op.
    pub changed: bool,
    pub effects: Vec<SideEffect>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryReport {
    pub rider_id: String,
    pub analysis: FraudAnalysis,
    pub suspicion_score: u32,
    pub active_order_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub settled: usize,
    pub skipped: usize,
    pub total_moved_paise: i64,
}

pub(crate) struct Inner {
    me: Weak<Inner>,
    repositories: Repositories,
    machine: OrderStateMachine,
    fraud_guard: FraudGuard,
    settlement: WalletSettlement,
    dispatcher: Arc<dyn NotificationDispatcher>,
    pricing: Arc<PricingConfigStore>,
    rules: BusinessRules,
    conditions: RwLock<MarketConditions>,
    pub(crate) mailboxes: Mailboxes,
    pub(crate) timers: ExpiryTimers,
    wallet_locks: KeyedLocks,
    rider_locks: KeyedLocks,
}

/// Runs orders, rider ledgers and restaurant wallets on top of the
/// repositories. Cheap to clone; all clones share one runtime.
#[derive(Clone)]
pub struct OrderService {
    inner: Arc<Inner>,
}

impl OrderService {
    pub fn new(
        repositories: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        pricing: Arc<PricingConfigStore>,
        rules: BusinessRules,
    ) -> Self {
        Self::with_fraud_guard(repositories, gateway, dispatcher, pricing, rules, FraudGuard::default())
    }

    pub fn with_fraud_guard(
        repositories: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        pricing: Arc<PricingConfigStore>,
        rules: BusinessRules,
        fraud_guard: FraudGuard,
    ) -> Self {
        let settlement = WalletSettlement::new(rules.settlement_interval());
        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            repositories,
            machine: OrderStateMachine::new(gateway),
            fraud_guard,
            settlement,
            dispatcher,
            pricing,
            rules,
            conditions: RwLock::new(MarketConditions::default()),
            mailboxes: Mailboxes::default(),
            timers: ExpiryTimers::default(),
            wallet_locks: KeyedLocks::new(),
            rider_locks: KeyedLocks::new(),
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Prices a customer's draft against the registered restaurant, the
    /// customer's membership and current demand, then stores it as `placed`.
    pub async fn place_order(&self, customer_id: &str, draft: OrderDraft) -> Result<Applied, ServiceError> {
        let now = Utc::now();
        let restaurant = self.restaurant(&draft.restaurant_id).await?;
        let customer = self.customer(customer_id).await?;
        let mut conditions = self.conditions();
        conditions.is_peak_hour |= self.inner.rules.is_peak_at(now);

        let request = CheckoutRequest::new(&customer, restaurant, draft, conditions);
        let pricing = self.inner.pricing.get();
        let placed = checkout::place_order(request, &pricing, &self.inner.rules, now)?;

        let key = placed.order.id.to_string();
        let version = self.inner.repositories.orders.put(&key, &placed.order, None).await?;
        self.inner.run_effects(&placed.effects).await;

        Ok(Applied {
            order: placed.order,
            version,
            changed: true,
            effects: placed.effects,
        })
    }

    /// Sends one event through the order's mailbox and waits for the outcome.
    pub async fn apply(&self, order_id: Uuid, event: OrderEvent, actor: Actor) -> Result<Applied, ServiceError> {
        for _ in 0..MAILBOX_ATTEMPTS {
            let tx = self.inner.mailboxes.sender_for(order_id, &self.inner.me);
            let (respond_to, response) = oneshot::channel();
            let envelope = Envelope {
                event: event.clone(),
                actor: actor.clone(),
                respond_to,
            };
            // A mailbox that retired between lookup and send drops the
            // envelope; the next attempt starts a fresh one.
            if tx.send(envelope).await.is_err() {
                continue;
            }
            if let Ok(result) = response.await {
                return result;
            }
        }
        Err(ServiceError::MailboxClosed(order_id))
    }

    pub async fn order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let key = order_id.to_string();
        self.inner
            .repositories
            .orders
            .get(&key)
            .await?
            .map(|v| v.value)
            .ok_or_else(|| OrderError::NotFound(key).into())
    }

    /// Fires `AutoExpire` for placed orders whose window has passed. Covers
    /// timers lost to a restart.
    pub async fn expire_stale_orders(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let window = chrono::Duration::seconds(self.inner.rules.auto_expire_seconds as i64);
        let mut expired = 0;

        for key in self.inner.repositories.orders.keys().await? {
            let Some(stored) = self.inner.repositories.orders.get(&key).await? else {
                continue;
            };
            let order = stored.value;
            if order.status != OrderStatus::Placed || now - order.placed_at < window {
                continue;
            }
            match self.apply(order.id, OrderEvent::AutoExpire, Actor::System).await {
                Ok(applied) if applied.changed => expired += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!(order_id = %order.id, error = %e, "Stale order expiry failed"),
            }
        }

        if expired > 0 {
            tracing::info!(expired, "Expired stale orders");
        }
        Ok(expired)
    }

    /// Re-arms auto-expire timers for placed orders, e.g. after a restart.
    pub async fn resume_timers(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let window = chrono::Duration::seconds(self.inner.rules.auto_expire_seconds as i64);
        let mut armed = 0;

        for key in self.inner.repositories.orders.keys().await? {
            let Some(stored) = self.inner.repositories.orders.get(&key).await? else {
                continue;
            };
            if stored.value.status != OrderStatus::Placed {
                continue;
            }
            let remaining = (stored.value.placed_at + window - now).to_std().unwrap_or_default();
            self.inner.timers.schedule(self.inner.me.clone(), stored.value.id, remaining);
            armed += 1;
        }
        Ok(armed)
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.timers.pending()
    }

    pub fn live_mailboxes(&self) -> usize {
        self.inner.mailboxes.live()
    }

    // ========================================================================
    // Riders
    // ========================================================================

    pub async fn record_telemetry(&self, rider_id: &str, sample: TelemetryData) -> Result<TelemetryReport, ServiceError> {
        let (analysis, rider) = {
            let _guard = self.inner.rider_locks.lock(rider_id).await;
            let stored = self.inner.repositories.riders.get(rider_id).await?;
            let (mut rider, version) = match stored {
                Some(v) => (v.value, Some(v.version)),
                None => (RiderState::new(rider_id), None),
            };

            let current_status = match rider.active_order_id {
                Some(order_id) => self
                    .inner
                    .repositories
                    .orders
                    .get(&order_id.to_string())
                    .await?
                    .map(|v| v.value.status),
                None => None,
            };

            let analysis = self.inner.fraud_guard.analyze(&rider, &sample, current_status);
            rider.record_sample(sample.clone(), &analysis);
            self.inner.repositories.riders.put(rider_id, &rider, version).await?;
            (analysis, rider)
        };

        if let Some(flag) = analysis.flag {
            tracing::warn!(
                rider_id,
                flag = flag.as_str(),
                suspicion_score = rider.suspicion_score,
                "Fraud flag raised"
            );
            let alert = NotificationEvent::new(
                NotificationKind::FraudAlert,
                Audience::Operators,
                rider.active_order_id,
                json!({
                    "rider_id": rider_id,
                    "flag": flag,
                    "evidence": analysis.evidence,
                    "suspicion_score": rider.suspicion_score,
                }),
                Utc::now(),
            );
            self.inner.dispatch(alert).await;
        }

        // The rider lock is released before touching the order: order effects
        // take the same lock.
        if let Some(order_id) = rider.active_order_id {
            let event = OrderEvent::TrackLocation {
                position: sample.position(),
                at: sample.timestamp,
                flag: analysis.flag,
            };
            let actor = Actor::Rider {
                id: rider_id.to_string(),
                name: rider.name.clone().unwrap_or_default(),
            };
            if let Err(e) = self.apply(order_id, event, actor).await {
                tracing::debug!(%order_id, rider_id, error = %e, "Location not applied to order");
            }
        }

        Ok(TelemetryReport {
            rider_id: rider_id.to_string(),
            suspicion_score: rider.suspicion_score,
            active_order_id: rider.active_order_id,
            analysis,
        })
    }

    pub async fn rider(&self, rider_id: &str) -> Result<RiderState, ServiceError> {
        self.inner
            .repositories
            .riders
            .get(rider_id)
            .await?
            .map(|v| v.value)
            .ok_or_else(|| ServiceError::NotFound(format!("rider {}", rider_id)))
    }

    pub async fn reset_suspicion(&self, rider_id: &str) -> Result<RiderState, ServiceError> {
        let (rider, _) = self
            .inner
            .update_rider(rider_id, false, |rider| {
                rider.reset_suspicion();
                Ok(())
            })
            .await?;
        tracing::info!(rider_id, "Suspicion score reset");
        Ok(rider)
    }

    pub async fn rider_withdraw(&self, rider_id: &str, amount_paise: i64) -> Result<WalletTransaction, ServiceError> {
        let now = Utc::now();
        let (_, tx) = self
            .inner
            .update_rider(rider_id, false, |rider| Ok(rider.withdraw(amount_paise, now)?))
            .await?;
        Ok(tx)
    }

    pub async fn rider_deposit_cod(&self, rider_id: &str, amount_paise: i64) -> Result<WalletTransaction, ServiceError> {
        let now = Utc::now();
        let (_, tx) = self
            .inner
            .update_rider(rider_id, false, |rider| Ok(rider.deposit_cod(amount_paise, now)?))
            .await?;
        Ok(tx)
    }

    // ========================================================================
    // Restaurant wallets
    // ========================================================================

    /// Current wallet, settled first if the interval has elapsed.
    pub async fn wallet(&self, restaurant_id: &str, now: DateTime<Utc>) -> Result<RestaurantWallet, ServiceError> {
        if self.inner.repositories.wallets.get(restaurant_id).await?.is_none() {
            return Ok(RestaurantWallet::new(restaurant_id, now));
        }
        let (wallet, _) = self.settle_wallet(restaurant_id, now).await?;
        Ok(wallet)
    }

    pub async fn settle_wallet(
        &self,
        restaurant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(RestaurantWallet, SettlementOutcome), ServiceError> {
        let settlement = &self.inner.settlement;
        self.inner
            .update_wallet(restaurant_id, now, |wallet| Ok(settlement.settle(wallet, now)))
            .await
    }

    pub async fn withdraw_restaurant(
        &self,
        restaurant_id: &str,
        amount_paise: i64,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalRequest, ServiceError> {
        let settlement = &self.inner.settlement;
        let (_, request) = self
            .inner
            .update_wallet(restaurant_id, now, |wallet| {
                settlement.settle(wallet, now);
                Ok(wallet.withdraw(amount_paise, now)?)
            })
            .await?;
        tracing::info!(restaurant_id, amount_paise, "Restaurant withdrawal requested");
        Ok(request)
    }

    pub async fn sweep_settlements(&self, now: DateTime<Utc>) -> Result<SweepReport, ServiceError> {
        let mut report = SweepReport::default();
        for restaurant_id in self.inner.repositories.wallets.keys().await? {
            match self.settle_wallet(&restaurant_id, now).await {
                Ok((_, SettlementOutcome::Settled { amount_paise })) => {
                    report.settled += 1;
                    report.total_moved_paise += amount_paise;
                }
                Ok((_, SettlementOutcome::Skipped(_))) => report.skipped += 1,
                Err(e) => {
                    report.skipped += 1;
                    tracing::error!(restaurant_id, error = %e, "Settlement failed");
                }
            }
        }
        if report.settled > 0 {
            tracing::info!(
                settled = report.settled,
                total_moved_paise = report.total_moved_paise,
                "Settlement sweep finished"
            );
        }
        Ok(report)
    }

    // ========================================================================
    // Restaurants, customers and demand
    // ========================================================================

    /// Creates or replaces a restaurant's profile.
    pub async fn register_restaurant(&self, profile: RestaurantProfile) -> Result<RestaurantProfile, ServiceError> {
        let repo = &self.inner.repositories.restaurants;
        let version = repo.get(&profile.id).await?.map(|v| v.version);
        match repo.put(&profile.id, &profile, version).await {
            Ok(_) => {}
            Err(CoreError::VersionConflict { .. }) => {
                return Err(ServiceError::Conflict(format!("restaurant {}", profile.id)));
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(restaurant_id = %profile.id, is_open = profile.is_open, "Restaurant profile saved");
        Ok(profile)
    }

    pub async fn restaurant(&self, restaurant_id: &str) -> Result<RestaurantProfile, ServiceError> {
        self.inner
            .repositories
            .restaurants
            .get(restaurant_id)
            .await?
            .map(|v| v.value)
            .ok_or_else(|| ServiceError::NotFound(format!("restaurant {}", restaurant_id)))
    }

    /// Unknown customers are non-members.
    pub async fn customer(&self, customer_id: &str) -> Result<CustomerProfile, ServiceError> {
        Ok(self
            .inner
            .repositories
            .customers
            .get(customer_id)
            .await?
            .map(|v| v.value)
            .unwrap_or_else(|| CustomerProfile::new(customer_id)))
    }

    pub async fn set_membership(&self, customer_id: &str, is_member: bool) -> Result<CustomerProfile, ServiceError> {
        let repo = &self.inner.repositories.customers;
        let stored = repo.get(customer_id).await?;
        let version = stored.as_ref().map(|v| v.version);
        let mut profile = stored.map(|v| v.value).unwrap_or_else(|| CustomerProfile::new(customer_id));
        profile.is_member = is_member;
        match repo.put(customer_id, &profile, version).await {
            Ok(_) => {}
            Err(CoreError::VersionConflict { .. }) => {
                return Err(ServiceError::Conflict(format!("customer {}", customer_id)));
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(customer_id, is_member, "Membership updated");
        Ok(profile)
    }

    pub fn conditions(&self) -> MarketConditions {
        match self.inner.conditions.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_conditions(&self, next: MarketConditions) {
        match self.inner.conditions.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        tracing::info!(is_peak_hour = next.is_peak_hour, is_weather_bad = next.is_weather_bad, "Market conditions set");
    }

    // ========================================================================
    // Pricing
    // ========================================================================

    pub fn pricing(&self) -> Arc<VersionedPricing> {
        self.inner.pricing.get()
    }

    /// Swaps the live pricing config. Orders already placed keep the numbers
    /// they were placed with.
    pub fn update_pricing(&self, config: PricingConfig) -> Result<Arc<VersionedPricing>, ServiceError> {
        Ok(self.inner.pricing.set(config)?)
    }

    pub fn rules(&self) -> &BusinessRules {
        &self.inner.rules
    }
}

impl Inner {
    pub(crate) async fn handle_event(
        &self,
        order_id: Uuid,
        event: OrderEvent,
        actor: &Actor,
    ) -> Result<Applied, ServiceError> {
        let key = order_id.to_string();
        let current = self
            .repositories
            .orders
            .get(&key)
            .await?
            .ok_or_else(|| OrderError::NotFound(key.clone()))?;

        let event_name = event.name();
        let assigning = matches!(event, OrderEvent::AssignRider { .. });
        let transition = self.machine.transition(&current.value, event, actor, Utc::now()).await?;

        if !transition.changed {
            tracing::debug!(%order_id, event = event_name, "Event was a no-op");
            return Ok(Applied {
                order: transition.order,
                version: current.version,
                changed: false,
                effects: Vec::new(),
            });
        }

        let version = match self.repositories.orders.put(&key, &transition.order, Some(current.version)).await {
            Ok(version) => version,
            Err(CoreError::VersionConflict { .. }) => return Err(self.conflict(order_id, assigning).await),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            %order_id,
            event = event_name,
            from = %current.value.status,
            to = %transition.order.status,
            "Order event applied"
        );

        self.run_effects(&transition.effects).await;

        Ok(Applied {
            order: transition.order,
            version,
            changed: true,
            effects: transition.effects,
        })
    }

    /// Another writer got there first (only possible across processes).
    async fn conflict(&self, order_id: Uuid, assigning: bool) -> ServiceError {
        if assigning {
            if let Ok(Some(latest)) = self.repositories.orders.get(&order_id.to_string()).await {
                if let Some(rider_id) = latest.value.rider_id {
                    return OrderError::AlreadyAssigned { order_id, rider_id }.into();
                }
            }
        }
        ServiceError::Conflict(format!("order {}", order_id))
    }

    /// Effects run after the order is persisted. A failing effect is logged
    /// and does not undo the transition.
    pub(crate) async fn run_effects(&self, effects: &[SideEffect]) {
        for effect in effects {
            if let Err(e) = self.run_effect(effect).await {
                tracing::error!(effect = effect.name(), error = %e, "Side effect failed");
            }
        }
    }

    async fn run_effect(&self, effect: &SideEffect) -> Result<(), ServiceError> {
        match effect {
            SideEffect::Notify(event) => {
                self.dispatch(event.clone()).await;
            }
            SideEffect::CreditRestaurant {
                restaurant_id,
                order_id,
                amount_paise,
            } => {
                let (order_id, amount_paise) = (*order_id, *amount_paise);
                let (_, credited) = self
                    .update_wallet(restaurant_id, Utc::now(), |wallet| Ok(wallet.credit(order_id, amount_paise)))
                    .await?;
                if credited {
                    tracing::info!(restaurant_id = %restaurant_id, %order_id, amount_paise, "Restaurant credited");
                }
            }
            SideEffect::CreditRider {
                rider_id,
                order_id,
                payout_paise,
                tip_paise,
                cod_collected_paise,
            } => {
                let order_id = *order_id;
                let (payout, tip, cod) = (*payout_paise, *tip_paise, *cod_collected_paise);
                let now = Utc::now();
                let (_, credited) = self
                    .update_rider(rider_id, true, |rider| Ok(rider.credit_delivery(order_id, payout, tip, cod, now)))
                    .await?;
                if credited {
                    tracing::info!(rider_id = %rider_id, %order_id, payout, tip, "Rider credited");
                }
            }
            SideEffect::RiderEngaged {
                rider_id,
                rider_name,
                order_id,
            } => {
                let order_id = *order_id;
                let name = Some(rider_name.clone()).filter(|n| !n.is_empty());
                self.update_rider(rider_id, true, |rider| {
                    rider.engage(order_id, name);
                    Ok(())
                })
                .await?;
            }
            SideEffect::RiderReleased { rider_id, order_id } => {
                let order_id = *order_id;
                self.update_rider(rider_id, true, |rider| {
                    rider.release(order_id);
                    Ok(())
                })
                .await?;
            }
            SideEffect::ScheduleAutoExpire { order_id, after } => {
                self.timers.schedule(self.me.clone(), *order_id, *after);
            }
            SideEffect::CancelAutoExpire { order_id } => {
                self.timers.cancel(*order_id);
            }
            SideEffect::RefundFailed { order_id, reason } => {
                tracing::error!(%order_id, reason = %reason, "Refund failed, operator action required");
            }
        }
        Ok(())
    }

    async fn dispatch(&self, event: NotificationEvent) {
        let kind = event.kind;
        if let Err(e) = self.dispatcher.dispatch(event).await {
            tracing::error!(kind = kind.as_str(), error = %e, "Notification dispatch failed");
        }
    }

    /// Read-modify-write of one wallet under its lock. Nothing is written
    /// when `f` fails or leaves the wallet unchanged.
    async fn update_wallet<R, F>(
        &self,
        restaurant_id: &str,
        now: DateTime<Utc>,
        f: F,
    ) -> Result<(RestaurantWallet, R), ServiceError>
    where
        F: FnOnce(&mut RestaurantWallet) -> Result<R, ServiceError> + Send,
        R: Send,
    {
        let _guard = self.wallet_locks.lock(restaurant_id).await;
        let (mut wallet, version) = match self.repositories.wallets.get(restaurant_id).await? {
            Some(v) => (v.value, Some(v.version)),
            None => (RestaurantWallet::new(restaurant_id, now), None),
        };
        let before = wallet.clone();

        let out = f(&mut wallet)?;
        if wallet != before || version.is_none() {
            self.repositories.wallets.put(restaurant_id, &wallet, version).await?;
        }
        Ok((wallet, out))
    }

    /// Same as `update_wallet` for rider state. `create` allows a first write
    /// for a rider never seen before.
    async fn update_rider<R, F>(&self, rider_id: &str, create: bool, f: F) -> Result<(RiderState, R), ServiceError>
    where
        F: FnOnce(&mut RiderState) -> Result<R, ServiceError> + Send,
        R: Send,
    {
        let _guard = self.rider_locks.lock(rider_id).await;
        let (mut rider, version) = match self.repositories.riders.get(rider_id).await? {
            Some(v) => (v.value, Some(v.version)),
            None if create => (RiderState::new(rider_id), None),
            None => return Err(ServiceError::NotFound(format!("rider {}", rider_id))),
        };
        let before = rider.clone();

        let out = f(&mut rider)?;
        if rider != before || version.is_none() {
            self.repositories.riders.put(rider_id, &rider, version).await?;
        }
        Ok((rider, out))
    }
}
