use async_trait::async_trait;
use citybite_core::{CoreError, CoreResult, Repository, Versioned};
use citybite_order::{CustomerProfile, Order, RestaurantProfile, RestaurantWallet};
use citybite_rider::RiderState;
use redis::aio::MultiplexedConnection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;

// KEYS[1] = record hash, KEYS[2] = index set
// ARGV[1] = expected version ("" = must not exist), ARGV[2] = json, ARGV[3] = id
// Returns the new version, or -1 when the stored version differs.
const COMPARE_AND_SET: &str = r#"
    local current = redis.call("HGET", KEYS[1], "v")
    if ARGV[1] == "" then
        if current then
            return -1
        end
    elseif current ~= ARGV[1] then
        return -1
    end
    local next = (tonumber(current) or 0) + 1
    redis.call("HSET", KEYS[1], "v", next, "data", ARGV[2])
    redis.call("SADD", KEYS[2], ARGV[3])
    return next
"#;

/// Shared connection for every Redis-backed repository.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    cas: Arc<redis::Script>,
}

impl RedisStore {
    pub async fn connect(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis");
        Ok(Self {
            conn,
            cas: Arc::new(redis::Script::new(COMPARE_AND_SET)),
        })
    }

    pub fn repository<T>(&self, prefix: &str) -> RedisRepository<T> {
        RedisRepository {
            store: self.clone(),
            prefix: prefix.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn orders(&self) -> RedisRepository<Order> {
        self.repository("order")
    }

    pub fn wallets(&self) -> RedisRepository<RestaurantWallet> {
        self.repository("wallet")
    }

    pub fn riders(&self) -> RedisRepository<RiderState> {
        self.repository("rider")
    }

    pub fn restaurants(&self) -> RedisRepository<RestaurantProfile> {
        self.repository("restaurant")
    }

    pub fn customers(&self) -> RedisRepository<CustomerProfile> {
        self.repository("customer")
    }
}

/// One aggregate type stored as JSON in `{prefix}:{id}` hashes (`v`, `data`)
/// with ids listed in `{prefix}:index`.
pub struct RedisRepository<T> {
    store: RedisStore,
    prefix: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RedisRepository<T> {
    fn record_key(&self, id: &str) -> String {
        format!("{}:{}", self.prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}:index", self.prefix)
    }
}

fn storage_error(e: redis::RedisError) -> CoreError {
    CoreError::StorageError(e.to_string())
}

#[async_trait]
impl<T> Repository<T> for RedisRepository<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> CoreResult<Option<Versioned<T>>> {
        let mut conn = self.store.conn.clone();
        let (version, data): (Option<u64>, Option<String>) = redis::cmd("HMGET")
            .arg(self.record_key(key))
            .arg("v")
            .arg("data")
            .query_async(&mut conn)
            .await
            .map_err(storage_error)?;

        match (version, data) {
            (Some(version), Some(data)) => Ok(Some(Versioned {
                value: serde_json::from_str(&data)?,
                version,
            })),
            _ => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &T, expected: Option<u64>) -> CoreResult<u64> {
        let data = serde_json::to_string(value)?;
        let expected_arg = expected.map(|v| v.to_string()).unwrap_or_default();

        let mut conn = self.store.conn.clone();
        let result: i64 = self
            .store
            .cas
            .key(self.record_key(key))
            .key(self.index_key())
            .arg(expected_arg)
            .arg(data)
            .arg(key)
            .invoke_async(&mut conn)
            .await
            .map_err(storage_error)?;

        if result < 0 {
            let found = self.get(key).await?.map(|v| v.version);
            return Err(CoreError::VersionConflict {
                key: key.to_string(),
                expected,
                found,
            });
        }
        Ok(result as u64)
    }

    async fn keys(&self) -> CoreResult<Vec<String>> {
        let mut conn = self.store.conn.clone();
        let mut keys: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.index_key())
            .query_async(&mut conn)
            .await
            .map_err(storage_error)?;
        keys.sort();
        Ok(keys)
    }
}
