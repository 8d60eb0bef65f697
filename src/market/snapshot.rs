// src/market/snapshot.rs
use super::MarketRecord;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// One guard-approved batch, keyed by symbol. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct MarketSnapshot<R> {
    records: HashMap<String, R>,
    published_at: Option<DateTime<Utc>>,
}

impl<R: MarketRecord> MarketSnapshot<R> {
    pub fn empty() -> Self {
        MarketSnapshot {
            records: HashMap::new(),
            published_at: None,
        }
    }

    /// Later rows win when a symbol appears twice.
    pub fn from_records(records: Vec<R>, published_at: DateTime<Utc>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.symbol().to_string(), r))
            .collect();
        MarketSnapshot {
            records,
            published_at: Some(published_at),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&R> {
        self.records.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.records.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &R> {
        self.records.values()
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }
}

/// Latest snapshot for one market kind.
///
/// ```text
/// Reader ──► get() ──► Arc<Snapshot> ──► read (never blocked)
/// Writer ──► build whole batch ──► replace() ──► atomic swap
/// ```
pub struct SnapshotStore<R> {
    current: ArcSwap<MarketSnapshot<R>>,
}

impl<R: MarketRecord> SnapshotStore<R> {
    pub fn new() -> Self {
        SnapshotStore {
            current: ArcSwap::from_pointee(MarketSnapshot::empty()),
        }
    }

    /// The latest approved snapshot, or an empty one if none was published yet.
    pub fn get(&self) -> Arc<MarketSnapshot<R>> {
        self.current.load_full()
    }

    /// Readers see either the previous or the new snapshot, never a mix.
    pub fn replace(&self, snapshot: MarketSnapshot<R>) {
        self.current.store(Arc::new(snapshot));
    }
}

impl<R: MarketRecord> Default for SnapshotStore<R> {
    fn default() -> Self {
        SnapshotStore::new()
    }
}
