use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinema_booking::{
    cache::CacheService,
    config::{Config, LedgerMode},
    controllers,
    database::Database,
    ledger::{HttpSeatLedger, SeatLedger},
    redis_client::RedisClient,
    services::{
        auth::{AuthVerifier, CachingAuthVerifier, HttpAuthVerifier},
        circuit_breaker::CircuitBreaker,
        reconciler::CompensationReconciler,
    },
    store::{BookingStore, CompensationOutbox},
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let env_filter = tracing_subscriber::EnvFilter::new(&config.app.rust_log);
    if config.app.is_production() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting cinema booking service");

    let db = Database::connect(&config.database).await?;
    info!("Database connected");
    db.run_migrations().await?;

    // Redis опционален: без него просто нет кеша
    let cache = match &config.redis.url {
        Some(url) => match RedisClient::connect(url).await {
            Ok(redis) => {
                info!("Redis connected");
                Some(CacheService::new(redis))
            }
            Err(e) => {
                warn!("Redis unavailable, running without cache: {:?}", e);
                None
            }
        },
        None => None,
    };

    let breaker = &config.circuit_breaker;
    let ledger: Arc<dyn SeatLedger> = match config.ledger.mode {
        LedgerMode::Local => Arc::new(db.seat_ledger()),
        LedgerMode::Remote => Arc::new(HttpSeatLedger::new(
            &config.ledger.cinema_service_url,
            config.saga.step_timeout(),
            Arc::new(CircuitBreaker::new(
                "cinema-service",
                breaker.failure_threshold,
                breaker.timeout_seconds,
            )),
        )?),
    };
    info!(mode = ?config.ledger.mode, "Seat ledger ready");

    let store: Arc<dyn BookingStore> = Arc::new(db.booking_store());
    let outbox: Arc<dyn CompensationOutbox> = Arc::new(db.compensation_outbox());

    let http_auth: Arc<dyn AuthVerifier> = Arc::new(HttpAuthVerifier::new(
        &config.auth.service_url,
        config.auth.timeout(),
        Arc::new(CircuitBreaker::new(
            "auth-service",
            breaker.failure_threshold,
            breaker.timeout_seconds,
        )),
    )?);
    let auth: Arc<dyn AuthVerifier> = match &cache {
        Some(cache) => Arc::new(CachingAuthVerifier::new(
            http_auth,
            cache.clone(),
            config.auth.cache_ttl_seconds,
        )),
        None => http_auth,
    };

    // --- Фоновые задачи ---

    // Повтор неудавшихся компенсаций
    let mut reconciler = CompensationReconciler::new(ledger.clone(), outbox.clone(), config.reconciler.batch_size);
    if let Some(cache) = &cache {
        reconciler = reconciler.with_cache(cache.clone());
    }
    let reconcile_interval = Duration::from_secs(config.reconciler.interval_seconds);
    task::spawn(reconciler.run(reconcile_interval));

    // --- Web server ---

    let addr = format!("{}:{}", config.app.host, config.app.port);
    let app_state = Arc::new(AppState::new(config, ledger, store, outbox, auth, cache));
    let app = controllers::app(app_state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
