use auth_rs::config::{BusType, Config};
use auth_rs::events::drainer::OutboxDrainer;
use auth_rs::storage::Storage;
use auth_rs::{db, routes};
use event_bus::{BackgroundTask, BrokerConfig, EventProducer, InMemoryBus, NatsProducer};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,auth_rs=debug,event_bus=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cfg = Config::from_env()?;

    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        bus_type = ?cfg.bus_type,
        topic = %cfg.events_topic,
        "Starting identity-auth"
    );

    // DB + migrations (fail-fast)
    let pool = db::init_pool(&cfg.database_url).await?;
    db::run_migrations(&pool).await?;

    // Event bus (fail-fast on bad broker config)
    let broker = BrokerConfig::new(BrokerConfig::parse_brokers(&cfg.nats_url), cfg.events_topic.clone());
    let producer: Arc<dyn EventProducer> = match cfg.bus_type {
        BusType::Nats => {
            tracing::info!(brokers = ?broker.brokers, "Connecting to NATS");
            Arc::new(NatsProducer::connect(&broker).await?)
        }
        BusType::InMemory => {
            tracing::warn!("Using process-local in-memory event bus; no other service will receive events");
            Arc::new(InMemoryBus::new().producer(&broker)?)
        }
    };

    let storage = Storage::new(pool.clone());
    let shutdown = CancellationToken::new();

    let drainer = OutboxDrainer::new(Arc::new(storage), producer);
    let period = cfg.outbox_poll_interval;
    let drainer_task = BackgroundTask::spawn("outbox-drainer", &shutdown, move |cancel| async move {
        drainer.run(period, cancel).await;
    });

    let app = routes::health::router(pool.clone()).layer(TraceLayer::new_for_http());

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
    drainer_task.shutdown().await;
    pool.close().await;

    served?;
    tracing::info!("identity-auth stopped");
    Ok(())
}
