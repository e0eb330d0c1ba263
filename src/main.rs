use std::sync::Arc;

use stocky::config::Config;
use stocky::services::{
    AggregationService, MemoryRewardStore, PriceSource, RewardService, RewardStore,
    SimulatedPriceSource, SqliteRewardStore,
};
use stocky::AppState;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(Config::from_env());

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.default_log_filter().into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!(
        environment = %config.environment,
        "Starting Stocky server on {}:{}", config.host, config.port
    );

    let store: Arc<dyn RewardStore> = match &config.database_path {
        Some(path) => {
            info!("Using SQLite reward store at {}", path);
            Arc::new(SqliteRewardStore::new(path)?)
        }
        None => {
            warn!("DATABASE_PATH not set, rewards are kept in memory and lost on restart");
            Arc::new(MemoryRewardStore::new())
        }
    };

    let prices: Arc<dyn PriceSource> = Arc::new(SimulatedPriceSource::new(config.price_ttl));

    let state = AppState {
        config: config.clone(),
        rewards: RewardService::new(store.clone(), prices.clone()),
        aggregation: AggregationService::new(store, prices),
    };

    let app = stocky::app(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Stocky server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
