pub mod fraud;
pub mod ledger;
pub mod models;

pub use fraud::{Evidence, FraudAnalysis, FraudFlag, FraudGuard, FraudThresholds};
pub use ledger::LedgerError;
pub use models::{Availability, RiderState, TelemetryData, TransactionSource, WalletTransaction};
