pub mod config;
pub mod economics;
pub mod store;

pub use config::{ComponentKind, PricingComponent, PricingConfig};
pub use economics::{EconomicsEngine, FinancialBreakdown, FinancialContext, RestaurantStats, SubsidySource};
pub use store::{PricingConfigStore, VersionedPricing};

#[derive(Debug, Clone, thiserror::Error)]
pub enum PricingError {
    #[error("Invalid pricing config: {0}")]
    InvalidConfig(String),
}
