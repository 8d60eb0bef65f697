#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use portfolio_tracker::api::{ApiContext, MarketDataApi};
use portfolio_tracker::db::MemoryRepository;
use portfolio_tracker::market::lookup::LookupService;
use portfolio_tracker::market::snapshot::{MarketSnapshot, SnapshotStore};
use portfolio_tracker::market_client::{ClientError, MarketDataPort};
use portfolio_tracker::models::{Index, Stock};
use portfolio_tracker::portfolio::PortfolioService;
use portfolio_tracker::watchlist::WatchlistService;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Stand-in for the remote market data service.
pub struct FakeMarket {
    pub stocks: Vec<Stock>,
    pub indexes: Vec<Index>,
}

impl FakeMarket {
    pub fn new() -> Self {
        FakeMarket {
            stocks: vec![stock("THYAO", dec!(150)), stock("GARAN", dec!(98.10))],
            indexes: vec![index("XU100", dec!(9812.44)), index("XU030", dec!(10520.10))],
        }
    }
}

fn matching<R: Clone>(
    records: &[R],
    symbols: &[String],
    symbol_of: fn(&R) -> &str,
) -> Result<HashMap<String, R>, ClientError> {
    let found: HashMap<String, R> = records
        .iter()
        .filter(|r| symbols.iter().any(|s| s == symbol_of(r)))
        .map(|r| (symbol_of(r).to_string(), r.clone()))
        .collect();
    if found.is_empty() {
        return Err(ClientError::InvalidSymbols(symbols.join(",")));
    }
    Ok(found)
}

#[async_trait]
impl MarketDataPort for FakeMarket {
    async fn stock_symbols(&self) -> Result<Vec<String>, ClientError> {
        Ok(self.stocks.iter().map(|s| s.symbol.clone()).collect())
    }

    async fn index_symbols(&self) -> Result<BTreeMap<String, String>, ClientError> {
        Ok(self
            .indexes
            .iter()
            .map(|i| (i.symbol.clone(), i.name.clone()))
            .collect())
    }

    async fn stock_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Stock>, ClientError> {
        matching(&self.stocks, symbols, |s: &Stock| s.symbol.as_str())
    }

    async fn index_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Index>, ClientError> {
        matching(&self.indexes, symbols, |i: &Index| i.symbol.as_str())
    }
}

pub fn stock(symbol: &str, price: Decimal) -> Stock {
    Stock {
        symbol: symbol.to_string(),
        latest_price: price,
        daily_change_pct: dec!(1.25),
        daily_change_in_tl: dec!(1.85),
        trading_volume_tl: dec!(1250000),
        trade_volume_count: dec!(3412),
    }
}

pub fn index(symbol: &str, value: Decimal) -> Index {
    Index {
        symbol: symbol.to_string(),
        name: format!("BIST {}", &symbol[2..]),
        latest_value: value,
        daily_change_pct: dec!(0.85),
        weekly_change_pct: dec!(-1.10),
        monthly_change_pct: dec!(4.05),
        yearly_change_pct: dec!(38.70),
    }
}

#[derive(Serialize)]
struct Claims {
    sub: String,
    exp: usize,
}

pub fn bearer(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: 10000000000,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret("test_secret".as_ref()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

pub fn body(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

/// Lookup endpoints backed by snapshots holding the given records.
pub fn market_data(stocks: Vec<Stock>, indexes: Vec<Index>) -> ApiContext {
    let stock_store = Arc::new(SnapshotStore::new());
    if !stocks.is_empty() {
        stock_store.replace(MarketSnapshot::from_records(stocks, Utc::now()));
    }
    let index_store = Arc::new(SnapshotStore::new());
    if !indexes.is_empty() {
        index_store.replace(MarketSnapshot::from_records(indexes, Utc::now()));
    }
    ApiContext {
        market_data: Some(MarketDataApi {
            stocks: LookupService::new(stock_store),
            indexes: LookupService::new(index_store),
        }),
        ..ApiContext::default()
    }
}

/// Portfolio and watchlist routes over in-memory storage and the fake market.
pub fn user_services() -> ApiContext {
    let repo = Arc::new(MemoryRepository::new());
    let market: Arc<dyn MarketDataPort> = Arc::new(FakeMarket::new());
    ApiContext {
        market_data: None,
        portfolio: Some(PortfolioService::new(repo.clone(), market.clone())),
        watchlist: Some(WatchlistService::new(
            repo,
            market,
            vec!["THYAO".to_string(), "GARAN".to_string()],
            vec!["XU100".to_string()],
        )),
    }
}
