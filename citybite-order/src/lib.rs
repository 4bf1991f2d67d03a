pub mod actor;
pub mod checkout;
pub mod directory;
pub mod expiry;
pub mod machine;
pub mod models;
pub mod rules;
pub mod service;
pub mod wallet;

pub use checkout::{CheckoutRequest, OrderDraft, PlacedOrder, RestaurantProfile};
pub use directory::{CustomerProfile, MarketConditions};
pub use machine::{OrderError, OrderEvent, OrderStateMachine, SideEffect, Transition};
pub use models::{Order, OrderLine, OrderStatus};
pub use rules::{BusinessRules, PeakWindow};
pub use service::{Applied, OrderService, Repositories, ServiceError, SweepReport, TelemetryReport};
pub use wallet::{RestaurantWallet, SettlementOutcome, SkipReason, WalletError, WalletSettlement};
