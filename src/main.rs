// src/main.rs
use env_logger::Builder;
use log::{error, info, LevelFilter};
use portfolio_tracker::api::{self, ApiContext, MarketDataApi};
use portfolio_tracker::config::{Config, StorageBackend};
use portfolio_tracker::db::{MemoryRepository, Repository, ScyllaRepository};
use portfolio_tracker::market::lookup::LookupService;
use portfolio_tracker::market::scheduler::{run_schedule, IngestJob};
use portfolio_tracker::market::scrape::{DocumentSource, HttpSource};
use portfolio_tracker::market::snapshot::SnapshotStore;
use portfolio_tracker::market_client::{MarketDataClient, MarketDataPort};
use portfolio_tracker::models::{Index, Stock};
use portfolio_tracker::portfolio::PortfolioService;
use portfolio_tracker::watchlist::WatchlistService;
use std::sync::Arc;
use tokio::task;
use tokio::time::Duration;

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(30);

fn start_market_data(config: &Config) -> Result<MarketDataApi, Box<dyn std::error::Error>> {
    let source: Arc<dyn DocumentSource> = Arc::new(HttpSource::new(SCRAPE_TIMEOUT)?);
    let stocks = Arc::new(SnapshotStore::<Stock>::new());
    let indexes = Arc::new(SnapshotStore::<Index>::new());

    let stock_job = IngestJob::new(config.stock_data_url.clone(), source.clone(), stocks.clone());
    let index_job = IngestJob::new(config.index_data_url.clone(), source, indexes.clone());
    task::spawn(run_schedule(stock_job, config.schedule.clone()));
    task::spawn(run_schedule(index_job, config.schedule.clone()));

    Ok(MarketDataApi {
        stocks: LookupService::new(stocks),
        indexes: LookupService::new(indexes),
    })
}

async fn open_repository(storage: &StorageBackend) -> Result<Arc<dyn Repository>, Box<dyn std::error::Error>> {
    match storage {
        StorageBackend::Memory => {
            info!("Using in-memory storage, data is lost on restart.");
            Ok(Arc::new(MemoryRepository::new()))
        }
        StorageBackend::Scylla { uri } => Ok(Arc::new(ScyllaRepository::connect(uri).await?)),
    }
}

async fn build_context(config: &Config) -> Result<ApiContext, Box<dyn std::error::Error>> {
    let mut ctx = ApiContext::default();
    if config.role.runs_market_data() {
        ctx.market_data = Some(start_market_data(config)?);
    }

    if config.role.runs_portfolio() || config.role.runs_watchlist() {
        let repo = open_repository(&config.storage).await?;
        let market: Arc<dyn MarketDataPort> = Arc::new(MarketDataClient::new(
            &config.market_data_base_url,
            config.market_data_timeout,
        )?);
        info!("Market data service at {}", config.market_data_base_url);

        if config.role.runs_portfolio() {
            ctx.portfolio = Some(PortfolioService::new(repo.clone(), market.clone()));
        }
        if config.role.runs_watchlist() {
            ctx.watchlist = Some(WatchlistService::new(
                repo,
                market,
                config.sample_stocks.clone(),
                config.sample_indexes.clone(),
            ));
        }
    }
    Ok(ctx)
}

#[tokio::main]
async fn main() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };
    info!("Starting the portfolio tracker with role '{}'...", config.role);

    let ctx = match build_context(&config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Failed to start services: {}", e);
            return;
        }
    };

    info!("Server running on http://{}", config.bind_addr);
    warp::serve(api::app(ctx)).run(config.bind_addr).await;
}
