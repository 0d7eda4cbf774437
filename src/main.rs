use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use evently_server::cache::{CacheInvalidator, NoopCache, RedisCache};
use evently_server::clock::SystemClock;
use evently_server::config::Config;
use evently_server::notifications::{ChannelQueue, LogNotifier, NotificationWorker};
use evently_server::routes::create_routes;
use evently_server::state::AppState;
use evently_server::store::{MemoryStore, PgStore, Store};

const DEFAULT_LOG_FILTER: &str = "evently_server=info,tower_http=info";

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(tiers = %config.pricing.describe(), "Pricing table loaded");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            let store = PgStore::connect(
                database_url,
                config.database_max_connections,
                config.seat_lock_timeout,
            )
            .await
            .expect("Failed to connect to database");

            tracing::info!("Successfully connected to database");

            sqlx::migrate!()
                .run(store.pool())
                .await
                .expect("Failed to run migrations");

            tracing::info!("Migrations run successfully");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using the in-memory store");
            Arc::new(MemoryStore::new(config.seat_lock_timeout))
        }
    };

    let cache: Arc<dyn CacheInvalidator> = match &config.redis_url {
        Some(redis_url) => match RedisCache::connect(redis_url).await {
            Ok(cache) => {
                tracing::info!("Connected to Redis");
                Arc::new(cache)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, cache invalidation disabled");
                Arc::new(NoopCache)
            }
        },
        None => Arc::new(NoopCache),
    };

    let (queue, jobs) = ChannelQueue::new(config.notification_queue_capacity);
    let worker = NotificationWorker::new(
        Arc::clone(&store),
        Arc::new(LogNotifier),
        config.notification_timeout,
    );
    tokio::spawn(worker.run(jobs));

    let state = AppState::new(&config, store, cache, Arc::new(queue), Arc::new(SystemClock));
    let app = create_routes(state, &config.cors_allowed_origins);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    tracing::info!("🚀 Server running at http://{}", addr);

    axum::serve(listener, app).await.expect("Server failed");
}
