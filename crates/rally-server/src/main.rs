mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use rally_api::AppStateInner;
use rally_cache::memory::{MemoryCache, MemoryPresence, run_sweep_loop};
use rally_cache::redis::{self, RedisCache, RedisPresence};
use rally_cache::{Cache, KeyValueCache, PresenceSet};
use rally_db::Database;
use rally_engine::Engine;
use rally_gateway::{Dispatcher, DispatcherConfig};

use crate::config::{Config, DEV_JWT_SECRET};

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rally=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.jwt_secret == DEV_JWT_SECRET {
        warn!("RALLY_JWT_SECRET not set, using the development secret");
    }

    let db = Arc::new(Database::open(&config.db_path)?);

    let (store, presence): (Arc<dyn KeyValueCache>, Arc<dyn PresenceSet>) =
        match &config.redis_url {
            Some(url) => {
                let pool = redis::connect(url).await?;
                (
                    Arc::new(RedisCache::new(pool.clone())),
                    Arc::new(RedisPresence::new(pool)),
                )
            }
            None => {
                info!("RALLY_REDIS_URL not set, using in-process cache and presence");
                let memory = Arc::new(MemoryCache::new());
                tokio::spawn(run_sweep_loop(memory.clone(), CACHE_SWEEP_INTERVAL));
                (memory, Arc::new(MemoryPresence::new()))
            }
        };

    let dispatcher = Dispatcher::new(
        presence,
        DispatcherConfig {
            send_timeout: config.send_timeout,
            channel_capacity: config.channel_capacity,
        },
    );
    let engine = Engine::new(db, Cache::new(store, config.cache_ttl), dispatcher);
    tokio::spawn(engine.presence_fanout());

    let state = Arc::new(AppStateInner {
        engine,
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = rally_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Rally server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
