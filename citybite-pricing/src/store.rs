use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::config::PricingConfig;
use crate::PricingError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionedPricing {
    pub version: u64,
    pub config: PricingConfig,
    pub updated_at: DateTime<Utc>,
}

/// Copy-on-write holder for the live pricing config.
///
/// Readers clone an `Arc` snapshot and never wait on writers for longer than
/// the pointer swap. A write only affects calculations started after it.
pub struct PricingConfigStore {
    current: RwLock<Arc<VersionedPricing>>,
}

impl PricingConfigStore {
    pub fn new(initial: PricingConfig) -> Result<Self, PricingError> {
        initial.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(VersionedPricing {
                version: 1,
                config: initial,
                updated_at: Utc::now(),
            })),
        })
    }

    pub fn get(&self) -> Arc<VersionedPricing> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, config: PricingConfig) -> Result<Arc<VersionedPricing>, PricingError> {
        config.validate()?;

        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = Arc::new(VersionedPricing {
            version: guard.version + 1,
            config,
            updated_at: Utc::now(),
        });
        *guard = next.clone();

        tracing::info!(version = next.version, "Pricing config updated");
        Ok(next)
    }
}

impl Default for PricingConfigStore {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(VersionedPricing {
                version: 1,
                config: PricingConfig::default(),
                updated_at: Utc::now(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economics::{EconomicsEngine, FinancialContext};

    #[test]
    fn test_set_bumps_version() {
        let store = PricingConfigStore::default();
        assert_eq!(store.get().version, 1);

        let updated = store
            .set(PricingConfig { commission_pct: 18.0, ..Default::default() })
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(store.get().config.commission_pct, 18.0);
    }

    #[test]
    fn test_invalid_config_keeps_current() {
        let store = PricingConfigStore::default();
        let result = store.set(PricingConfig { rounding_unit_paise: 0, ..Default::default() });
        assert!(result.is_err());
        assert_eq!(store.get().version, 1);
    }

    #[test]
    fn test_snapshot_is_not_retroactive() {
        let store = PricingConfigStore::default();
        let snapshot = store.get();
        store.set(PricingConfig { commission_pct: 20.0, ..Default::default() }).unwrap();

        let ctx = FinancialContext { distance_km: 2.0, order_value_paise: 10_000, ..Default::default() };
        let before = EconomicsEngine::calculate_snapshot(&ctx, &snapshot);
        let after = EconomicsEngine::calculate_snapshot(&ctx, &store.get());

        assert_eq!(before.commission_value, 1_500);
        assert_eq!(before.config_version, 1);
        assert_eq!(after.commission_value, 2_000);
        assert_eq!(after.config_version, 2);
    }
}
