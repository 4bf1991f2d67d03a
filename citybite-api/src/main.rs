use anyhow::Context;
use chrono::Utc;
use citybite_api::metrics::Metrics;
use citybite_api::{app, worker, AppState, AuthConfig};
use citybite_core::notify::{BroadcastDispatcher, FanoutDispatcher, LogDispatcher, NotificationDispatcher};
use citybite_core::payment::MockPaymentGateway;
use citybite_order::{OrderService, Repositories};
use citybite_pricing::PricingConfigStore;
use citybite_rider::FraudGuard;
use citybite_store::{Config, RedisStore, StorageBackend};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "citybite_api=debug,citybite_order=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting CityBite API on port {}", config.server.port);

    // Storage
    let repositories = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; state is lost on restart");
            Repositories::in_memory()
        }
        StorageBackend::Redis => {
            let store = RedisStore::connect(&config.redis.url)
                .await
                .context("Failed to connect to Redis")?;
            Repositories {
                orders: Arc::new(store.orders()),
                wallets: Arc::new(store.wallets()),
                riders: Arc::new(store.riders()),
                restaurants: Arc::new(store.restaurants()),
                customers: Arc::new(store.customers()),
            }
        }
    };

    // Notifications: log + SSE broadcast (+ Kafka)
    let broadcast = BroadcastDispatcher::new(256);
    #[allow(unused_mut)]
    let mut targets: Vec<Arc<dyn NotificationDispatcher>> = vec![Arc::new(LogDispatcher), Arc::new(broadcast.clone())];
    #[cfg(feature = "kafka")]
    {
        let kafka = citybite_store::KafkaDispatcher::new(&config.kafka.brokers, &config.kafka.topic)
            .context("Failed to create Kafka producer")?;
        targets.push(Arc::new(kafka));
    }
    let dispatcher = Arc::new(FanoutDispatcher::new(targets));

    // No real gateway is wired in yet; refunds are simulated and logged.
    let gateway = Arc::new(MockPaymentGateway::new());

    let pricing = Arc::new(PricingConfigStore::new(config.pricing.clone()).context("Invalid pricing config")?);

    let service = OrderService::with_fraud_guard(
        repositories,
        gateway,
        dispatcher,
        pricing,
        config.business_rules.clone(),
        FraudGuard::new(config.fraud.clone()),
    );

    for profile in config.restaurants.iter().cloned() {
        service
            .register_restaurant(profile)
            .await
            .context("Failed to register restaurant")?;
    }

    let resumed = service.resume_timers(Utc::now()).await.context("Failed to resume timers")?;
    tracing::info!("Re-armed {} auto-expire timers", resumed);

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    let sweep_every = Duration::from_secs(config.business_rules.sweep_interval_seconds.max(1));
    worker::start_settlement_worker(service.clone(), metrics.clone(), sweep_every);
    worker::start_expiry_worker(service.clone(), sweep_every);

    let app_state = AppState {
        service,
        notifications: broadcast,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
            webhook_secret: config.auth.webhook_secret.clone(),
        },
        metrics,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
