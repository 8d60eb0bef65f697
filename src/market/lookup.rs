// src/market/lookup.rs
use super::snapshot::SnapshotStore;
use super::MarketRecord;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no market data has been published yet")]
    NoMarketData,

    #[error("none of the given symbols '{0}' is known")]
    InvalidSymbols(String),
}

/// Result of a symbol query: the records found, in request order, and the
/// requested symbols that had no record.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<R> {
    pub found: Vec<R>,
    pub missing: Vec<String>,
}

impl<R: MarketRecord> Lookup<R> {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn into_map(self) -> HashMap<String, R> {
        self.found
            .into_iter()
            .map(|r| (r.symbol().to_string(), r))
            .collect()
    }
}

/// Read side of one market kind. Cheap to clone, safe to share across
/// request handlers.
pub struct LookupService<R> {
    store: Arc<SnapshotStore<R>>,
}

impl<R> Clone for LookupService<R> {
    fn clone(&self) -> Self {
        LookupService {
            store: Arc::clone(&self.store),
        }
    }
}

impl<R: MarketRecord> LookupService<R> {
    pub fn new(store: Arc<SnapshotStore<R>>) -> Self {
        LookupService { store }
    }

    pub fn all_symbols(&self) -> Result<Vec<String>, LookupError> {
        let snapshot = self.store.get();
        if snapshot.is_empty() {
            return Err(LookupError::NoMarketData);
        }
        let mut symbols: Vec<String> = snapshot.records().map(|r| r.symbol().to_string()).collect();
        symbols.sort();
        Ok(symbols)
    }

    /// Symbol to display name; records without a name map to an empty string.
    pub fn symbol_names(&self) -> Result<BTreeMap<String, String>, LookupError> {
        let snapshot = self.store.get();
        if snapshot.is_empty() {
            return Err(LookupError::NoMarketData);
        }
        Ok(snapshot
            .records()
            .map(|r| {
                (
                    r.symbol().to_string(),
                    r.display_name().unwrap_or_default().to_string(),
                )
            })
            .collect())
    }

    /// Exact, case sensitive matching. Fails only when nothing matched; a
    /// partial match is returned with the gaps listed in `missing`.
    pub fn data_for(&self, symbols: &[String]) -> Result<Lookup<R>, LookupError> {
        let snapshot = self.store.get();
        if snapshot.is_empty() {
            return Err(LookupError::NoMarketData);
        }

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for symbol in symbols.iter().filter(|s| seen.insert(s.as_str())) {
            match snapshot.get(symbol) {
                Some(record) => found.push(record.clone()),
                None => missing.push(symbol.clone()),
            }
        }

        if found.is_empty() {
            return Err(LookupError::InvalidSymbols(symbols.join(",")));
        }
        Ok(Lookup { found, missing })
    }
}
