// src/watchlist.rs
use crate::db::Repository;
use crate::enrichment::{enrich_watchlist, quote_sort_fields};
use crate::error::AppError;
use crate::market::MarketRecord;
use crate::market_client::{ClientError, MarketDataPort};
use crate::models::{MarketKind, SymbolResult, WatchlistEntry, WatchlistQuote};
use crate::paging::{sort_and_page, Page, PageRequest};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const ALREADY_EXISTS: &str = "Already exists.";
const ALREADY_ABSENT: &str = "Already not existing in the watchlist.";

/// Unknown symbols in a quote request leave the whole map empty.
fn tolerate_unknown<R: MarketRecord>(
    result: Result<HashMap<String, R>, ClientError>,
) -> Result<HashMap<String, R>, AppError> {
    match result {
        Ok(market) => Ok(market),
        Err(ClientError::InvalidSymbols(given)) => {
            warn!("No {} market data for '{}'", R::KIND, given);
            Ok(HashMap::new())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Clone)]
pub struct WatchlistService {
    repo: Arc<dyn Repository>,
    market: Arc<dyn MarketDataPort>,
    sample_stocks: Vec<String>,
    sample_indexes: Vec<String>,
}

impl WatchlistService {
    pub fn new(
        repo: Arc<dyn Repository>,
        market: Arc<dyn MarketDataPort>,
        sample_stocks: Vec<String>,
        sample_indexes: Vec<String>,
    ) -> Self {
        WatchlistService {
            repo,
            market,
            sample_stocks,
            sample_indexes,
        }
    }

    /// One result per requested symbol, in request order.
    pub async fn add(
        &self,
        user_id: &str,
        kind: MarketKind,
        symbols: &[String],
    ) -> Result<Vec<SymbolResult>, AppError> {
        let known = self.market.known_symbols(kind).await?;
        let mut existing: HashSet<String> =
            self.repo.watchlist(user_id, kind).await?.into_iter().collect();

        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let result = if !known.contains(symbol) {
                SymbolResult::failed(
                    kind,
                    symbol,
                    format!("'{}' is not valid {} symbol.", symbol, kind.noun()),
                )
            } else if existing.contains(symbol) {
                SymbolResult::with_note(kind, symbol, ALREADY_EXISTS)
            } else {
                let entry = WatchlistEntry {
                    user_id: user_id.to_string(),
                    kind,
                    symbol: symbol.clone(),
                };
                match self.repo.add_to_watchlist(&entry).await {
                    Ok(()) => {
                        existing.insert(symbol.clone());
                        SymbolResult::success(kind, symbol)
                    }
                    Err(e) => {
                        error!("Failed to add '{}' to {} watchlist: {}", symbol, kind, e);
                        SymbolResult::failed(kind, symbol, e.to_string())
                    }
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    pub async fn remove(
        &self,
        user_id: &str,
        kind: MarketKind,
        symbols: &[String],
    ) -> Result<Vec<SymbolResult>, AppError> {
        let existing: HashSet<String> =
            self.repo.watchlist(user_id, kind).await?.into_iter().collect();

        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if !existing.contains(symbol) {
                results.push(SymbolResult::with_note(kind, symbol, ALREADY_ABSENT));
                continue;
            }
            let entry = WatchlistEntry {
                user_id: user_id.to_string(),
                kind,
                symbol: symbol.clone(),
            };
            let result = match self.repo.remove_from_watchlist(&entry).await {
                Ok(()) => SymbolResult::success(kind, symbol),
                Err(e) => {
                    error!("Failed to remove '{}' from {} watchlist: {}", symbol, kind, e);
                    SymbolResult::failed(kind, symbol, e.to_string())
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    pub async fn list(
        &self,
        user_id: &str,
        kind: MarketKind,
        request: &PageRequest,
    ) -> Result<Page<WatchlistQuote>, AppError> {
        let symbols = self.repo.watchlist(user_id, kind).await?;
        if symbols.is_empty() {
            let resource = match kind {
                MarketKind::Stocks => "Watchlist stocks",
                MarketKind::Indexes => "Watchlist indexes",
            };
            return Err(AppError::not_found(resource, "userId", user_id));
        }
        let quotes = self.quotes(kind, &symbols).await?;
        info!("{} watchlist of user '{}' holds {} symbols", kind, user_id, quotes.len());
        Ok(sort_and_page(quotes, request, quote_sort_fields(kind))?)
    }

    /// Quotes for the configured sample symbols, no user needed.
    pub async fn sample(
        &self,
        kind: MarketKind,
        request: &PageRequest,
    ) -> Result<Page<WatchlistQuote>, AppError> {
        let symbols = match kind {
            MarketKind::Stocks => &self.sample_stocks,
            MarketKind::Indexes => &self.sample_indexes,
        };
        let quotes = if symbols.is_empty() {
            Vec::new()
        } else {
            self.quotes(kind, symbols).await?
        };
        Ok(sort_and_page(quotes, request, quote_sort_fields(kind))?)
    }

    async fn quotes(
        &self,
        kind: MarketKind,
        symbols: &[String],
    ) -> Result<Vec<WatchlistQuote>, AppError> {
        match kind {
            MarketKind::Stocks => {
                let market = tolerate_unknown(self.market.stock_quotes(symbols).await)?;
                Ok(enrich_watchlist(symbols, &market))
            }
            MarketKind::Indexes => {
                let market = tolerate_unknown(self.market.index_quotes(symbols).await)?;
                Ok(enrich_watchlist(symbols, &market))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRepository;
    use crate::models::{Index, ResultStatus, Stock};
    use crate::paging::Sort;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    struct IndexMarket;

    #[async_trait]
    impl MarketDataPort for IndexMarket {
        async fn stock_symbols(&self) -> Result<Vec<String>, ClientError> {
            Ok(vec!["THYAO".to_string()])
        }

        async fn index_symbols(&self) -> Result<BTreeMap<String, String>, ClientError> {
            Ok([("XU100", "BIST 100"), ("XU030", "BIST 30"), ("XBANK", "BIST BANKA")]
                .into_iter()
                .map(|(s, n)| (s.to_string(), n.to_string()))
                .collect())
        }

        async fn stock_quotes(
            &self,
            symbols: &[String],
        ) -> Result<HashMap<String, Stock>, ClientError> {
            Err(ClientError::InvalidSymbols(symbols.join(",")))
        }

        async fn index_quotes(
            &self,
            symbols: &[String],
        ) -> Result<HashMap<String, Index>, ClientError> {
            // XBANK is known but has no published row
            Ok(symbols
                .iter()
                .filter(|s| s.as_str() != "XBANK")
                .map(|s| {
                    let index = Index {
                        symbol: s.clone(),
                        name: s.clone(),
                        latest_value: if s == "XU100" { dec!(9800) } else { dec!(10500) },
                        daily_change_pct: dec!(0.5),
                        weekly_change_pct: dec!(0),
                        monthly_change_pct: dec!(0),
                        yearly_change_pct: dec!(0),
                    };
                    (s.clone(), index)
                })
                .collect())
        }
    }

    fn service() -> WatchlistService {
        WatchlistService::new(
            Arc::new(MemoryRepository::new()),
            Arc::new(IndexMarket),
            vec!["THYAO".to_string()],
            vec!["XU100".to_string(), "XU030".to_string()],
        )
    }

    fn owned(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn add_reports_each_symbol() {
        let service = service();
        let results = service
            .add("alice", MarketKind::Indexes, &owned(&["XU100", "NOPE", "XU100"]))
            .await
            .unwrap();
        assert_eq!(results[0].status, ResultStatus::Success);
        assert_eq!(results[0].error, None);
        assert_eq!(results[1].status, ResultStatus::Failed);
        assert_eq!(
            results[1].error.as_deref(),
            Some("'NOPE' is not valid index symbol.")
        );
        assert_eq!(results[2].status, ResultStatus::Success);
        assert_eq!(results[2].error.as_deref(), Some(ALREADY_EXISTS));
    }

    #[tokio::test]
    async fn remove_of_absent_symbol_succeeds_with_note() {
        let service = service();
        service.add("alice", MarketKind::Indexes, &owned(&["XU100"])).await.unwrap();
        let results = service
            .remove("alice", MarketKind::Indexes, &owned(&["XU100", "XU030"]))
            .await
            .unwrap();
        assert_eq!(results[0].error, None);
        assert_eq!(results[1].status, ResultStatus::Success);
        assert_eq!(results[1].error.as_deref(), Some(ALREADY_ABSENT));
    }

    #[tokio::test]
    async fn list_keeps_symbols_without_market_data() {
        let service = service();
        service
            .add("alice", MarketKind::Indexes, &owned(&["XU100", "XBANK"]))
            .await
            .unwrap();
        let request = PageRequest::new(0, 5, Sort::by("indexSymbol", true));
        let page = service.list("alice", MarketKind::Indexes, &request).await.unwrap();
        assert_eq!(page.total_elements, 2);
        assert_eq!(page.content[0].symbol, "XU100");
        assert_eq!(page.content[1].symbol, "XBANK");
        assert_eq!(page.content[1].latest_value, None);
    }

    #[tokio::test]
    async fn empty_watchlist_is_not_found() {
        let request = PageRequest::new(0, 5, Sort::by("stockSymbol", true));
        let err = service()
            .list("bob", MarketKind::Stocks, &request)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Watchlist stocks not found with userId : 'bob'");
    }

    #[tokio::test]
    async fn sample_uses_configured_symbols() {
        let request = PageRequest::new(-1, 5, Sort::by("latestValue", true));
        let page = service().sample(MarketKind::Indexes, &request).await.unwrap();
        let symbols: Vec<&str> = page.content.iter().map(|q| q.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["XU030", "XU100"]);

        // unknown stock symbols degrade to unpriced rows
        let request = PageRequest::new(0, 5, Sort::by("stockSymbol", true));
        let page = service().sample(MarketKind::Stocks, &request).await.unwrap();
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.content[0].latest_value, None);
    }
}
