pub mod app_config;
#[cfg(feature = "kafka")]
pub mod events;
pub mod redis_repo;

pub use app_config::{Config, StorageBackend};
#[cfg(feature = "kafka")]
pub use events::KafkaDispatcher;
pub use redis_repo::{RedisRepository, RedisStore};
