// src/market_client.rs
//! Port to the market data lookup service, used by the portfolio and
//! watchlist services.
use crate::models::{ApiResponse, Index, MarketKind, Stock};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

pub const STOCK_SYMBOLS_PATH: &str = "/market-data/api/v1/stocks/symbols";
pub const INDEX_SYMBOLS_PATH: &str = "/market-data/api/v1/indexes/symbols";
pub const STOCKS_PATH: &str = "/market-data/api/v1/stocks";
pub const INDEXES_PATH: &str = "/market-data/api/v1/indexes";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("market data service did not answer in time")]
    Timeout,

    #[error("market data service unreachable: {0}")]
    Unreachable(String),

    #[error("{0}")]
    InvalidSymbols(String),

    #[error("market data service responded {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("unexpected market data response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Unreachable(err.to_string())
        }
    }
}

#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn stock_symbols(&self) -> Result<Vec<String>, ClientError>;

    /// Index symbol to display name.
    async fn index_symbols(&self) -> Result<BTreeMap<String, String>, ClientError>;

    /// Only symbols the service knows appear in the map.
    async fn stock_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Stock>, ClientError>;

    async fn index_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Index>, ClientError>;

    async fn known_symbols(&self, kind: MarketKind) -> Result<HashSet<String>, ClientError> {
        match kind {
            MarketKind::Stocks => Ok(self.stock_symbols().await?.into_iter().collect()),
            MarketKind::Indexes => Ok(self.index_symbols().await?.into_keys().collect()),
        }
    }
}

/// `MarketDataPort` over HTTP. Every request is bounded by the client timeout
/// and is not retried.
#[derive(Clone)]
pub struct MarketDataClient {
    client: Client,
    base_url: String,
}

impl MarketDataClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(MarketDataClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        symbols: Option<&[String]>,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(symbols) = symbols {
            request = request.query(&[("symbols", symbols.join(","))]);
        }
        debug!("GET {}", url);
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        decode_body(status, &body)
    }

    async fn quotes<T: DeserializeOwned>(
        &self,
        path: &str,
        symbols: &[String],
        symbol_of: fn(&T) -> &str,
    ) -> Result<HashMap<String, T>, ClientError> {
        let records: Vec<T> = self
            .get(path, Some(symbols))
            .await
            .map_err(|e| match e {
                ClientError::InvalidSymbols(_) => ClientError::InvalidSymbols(symbols.join(",")),
                other => other,
            })?;
        Ok(records
            .into_iter()
            .map(|r| (symbol_of(&r).to_string(), r))
            .collect())
    }
}

fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, ClientError> {
    if status.is_success() {
        let envelope: ApiResponse<T> =
            serde_json::from_str(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        return envelope
            .data
            .ok_or_else(|| ClientError::Decode("response carries no data".to_string()));
    }

    let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(body)
        .map(|envelope| envelope.message)
        .unwrap_or_else(|_| body.to_string());
    if status == StatusCode::BAD_REQUEST {
        return Err(ClientError::InvalidSymbols(message));
    }
    error!("Market data service responded HTTP {}: {}", status, message);
    Err(ClientError::Upstream {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl MarketDataPort for MarketDataClient {
    async fn stock_symbols(&self) -> Result<Vec<String>, ClientError> {
        self.get(STOCK_SYMBOLS_PATH, None).await
    }

    async fn index_symbols(&self) -> Result<BTreeMap<String, String>, ClientError> {
        self.get(INDEX_SYMBOLS_PATH, None).await
    }

    async fn stock_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Stock>, ClientError> {
        self.quotes(STOCKS_PATH, symbols, |s: &Stock| s.symbol.as_str())
            .await
    }

    async fn index_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Index>, ClientError> {
        self.quotes(INDEXES_PATH, symbols, |i: &Index| i.symbol.as_str())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn partial_content_is_decoded_as_data() {
        let body = r#"{
            "timestamp": "2024-03-04T10:00:00Z",
            "success": true,
            "status": 206,
            "message": "Partial data received. Missing symbols are 'C'",
            "data": [{"stockSymbol": "A", "latestPrice": "10.5", "dailyChangePct": 1,
                      "dailyChangeInTL": "0.1", "tradingVolumeTL": "100", "tradeVolumeCount": "3"}],
            "errors": [{"status": 206, "message": "Partial data received. Missing symbols are 'C'", "path": "/x"}],
            "path": "/x"
        }"#;
        let stocks: Vec<Stock> = decode_body(StatusCode::PARTIAL_CONTENT, body).unwrap();
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks[0].latest_price, dec!(10.5));
        assert_eq!(stocks[0].daily_change_pct, dec!(1));
    }

    #[test]
    fn bad_request_maps_to_invalid_symbols() {
        let body = r#"{"timestamp": "2024-03-04T10:00:00Z", "success": false, "status": 400,
            "message": "Symbols are not valid. Given symbols are 'X,Y'", "data": null, "errors": [], "path": "/x"}"#;
        let err = decode_body::<Vec<Stock>>(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert!(matches!(err, ClientError::InvalidSymbols(ref m) if m.contains("X,Y")));
    }

    #[test]
    fn server_error_keeps_raw_body_when_not_an_envelope() {
        let err = decode_body::<Vec<Stock>>(StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        assert!(matches!(
            err,
            ClientError::Upstream { status: 502, ref message } if message == "upstream down"
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = MarketDataClient::new("http://market:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "http://market:8080");
    }
}
