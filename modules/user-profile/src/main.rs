use event_bus::{BackgroundTask, BrokerConfig, EventConsumer, InMemoryBus, NatsConsumer};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user_profile_rs::config::{BusType, Config};
use user_profile_rs::processor::UserCreatedProcessor;
use user_profile_rs::relay::InboundRelay;
use user_profile_rs::storage::Storage;
use user_profile_rs::{db, routes};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,user_profile_rs=debug,event_bus=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cfg = Config::from_env()?;

    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        bus_type = ?cfg.bus_type,
        topic = %cfg.events_topic,
        group = %cfg.consumer_group,
        "Starting user-profile"
    );

    // DB + migrations (fail-fast)
    let pool = db::init_pool(&cfg.database_url).await?;
    db::run_migrations(&pool).await?;

    // Event bus (fail-fast on bad broker config)
    let broker = BrokerConfig::new(BrokerConfig::parse_brokers(&cfg.nats_url), cfg.events_topic.clone());
    let consumer: Arc<dyn EventConsumer> = match cfg.bus_type {
        BusType::Nats => {
            tracing::info!(brokers = ?broker.brokers, "Connecting to NATS");
            Arc::new(NatsConsumer::connect(&broker, &cfg.consumer_group, &cfg.consumer).await?)
        }
        BusType::InMemory => {
            tracing::warn!("Using process-local in-memory event bus; no other service will publish to it");
            Arc::new(InMemoryBus::new().consumer(&broker, &cfg.consumer_group)?)
        }
    };

    let storage = Arc::new(Storage::new(pool.clone()));
    let processor = Arc::new(UserCreatedProcessor::new(storage.clone()));

    let mut relay = InboundRelay::new(consumer, processor, cfg.retry.clone());
    if cfg.retry.max_attempts > 0 {
        relay = relay.with_dead_letters(storage.clone());
    }

    let shutdown = CancellationToken::new();
    let relay_task = BackgroundTask::spawn("inbound-relay", &shutdown, move |cancel| async move {
        let mut relay = relay;
        relay.run(cancel).await;
    });

    let app = routes::health::router(pool.clone())
        .merge(routes::users::router(storage))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                }
                _ = signal.cancelled() => {}
            }
        })
        .await;

    // Stop background work before releasing the pool it uses
    shutdown.cancel();
    relay_task.shutdown().await;
    pool.close().await;

    served?;
    tracing::info!("user-profile stopped");
    Ok(())
}
